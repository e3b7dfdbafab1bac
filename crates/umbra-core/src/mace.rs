//! MACE: the block-chained, BLAKE3-keyed authenticated cipher used to
//! wrap every payload that crosses the handshake boundary.
//!
//! A message is PKCS#7 padded out to a whole number of 64-byte blocks.
//! For chaining purposes the padded buffer is then divided into chunks
//! of 32 bytes if its total length is exactly 64, otherwise chunks of
//! 64 bytes — so a single padded block is always split into (at least)
//! two chaining chunks. Each of `rounds = 2 * difficulty + 3` rounds
//! sweeps the chunks right-to-left on encrypt: chunk `i`'s new value is
//! a keystream (keyed on chunk `i - 2`'s pre-round value) XORed with
//! chunk `i - 1`'s pre-round value, and the final chunk is seeded from
//! the first chunk's original value. Decrypt undoes rounds in reverse
//! order, sweeping left-to-right so that each step can read the
//! already-recovered previous chunk before anything downstream is
//! touched.
//!
//! Four variants share this core:
//! - `Plain` — chaining only, no extra keying material, no tag.
//! - `Mixin` — an extra caller-supplied secret is folded into the key
//!   schedule (domain-separated from the base key).
//! - `Aead` — appends a 16-byte tag over the ciphertext and difficulty,
//!   checked in constant time.
//! - `MixinAead` — both of the above.
//!
//! Decrypt never short-circuits on a bad tag or a bad padding byte: it
//! always walks every chunk and always returns a plaintext buffer, with
//! authenticity reported separately through [`DecryptOutput::valid`].
//! Branching early here would make failed and successful decrypts take
//! measurably different amounts of time.

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::CoreError;
use crate::primitives::{random_bytes, sum};

/// Padding granularity: every padded message is a positive multiple of
/// this many bytes.
pub const PAD_BLOCK: usize = 64;

/// Length of the random per-message salt carried in the wire pack.
pub const SALT_SIZE: usize = 12;

/// Length of the AEAD tag carried in the wire pack for `Aead` and
/// `MixinAead` variants.
pub const TAG_SIZE: usize = 16;

const KEY_SCHEDULE_PREFIX: &str = "@UMBRAv0.0.0-@STDMACE-@MACEv1.0.0-";

/// Which of the four MACE variants is in play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Plain,
    Mixin,
    Aead,
    MixinAead,
}

impl Variant {
    fn has_mixin(self) -> bool {
        matches!(self, Variant::Mixin | Variant::MixinAead)
    }

    fn has_aead(self) -> bool {
        matches!(self, Variant::Aead | Variant::MixinAead)
    }

    /// `full_context` per the variant matrix in §4.2: plain and AEAD
    /// leave `context` untouched; MIXIN and MIXIN+AEAD prefix it.
    fn full_context(self, context: &str) -> String {
        match self {
            Variant::Plain => context.to_string(),
            Variant::Mixin => format!("@MIXIN-{context}"),
            Variant::Aead => format!("@AEAD-{context}"),
            Variant::MixinAead => format!("@MIXIN-@AEAD-{context}"),
        }
    }
}

/// `rounds = 2 * difficulty + 3`.
pub fn rounds_for_difficulty(difficulty: u16) -> u32 {
    2 * difficulty as u32 + 3
}

/// The result of a successful encrypt call: a single wire-format pack
/// of `salt || tag? || ciphertext`.
#[derive(Debug, Clone)]
pub struct EncryptOutput {
    pub pack: Vec<u8>,
}

/// The result of a decrypt call. `valid` is `false` whenever the pack
/// was malformed, the tag didn't match, or the padding didn't validate;
/// `plaintext` is still populated (truncated at the first instance of
/// the failure) so that callers who branch on `valid` don't get a
/// different code path shape for free.
#[derive(Debug, Clone)]
pub struct DecryptOutput {
    pub plaintext: Vec<u8>,
    pub valid: bool,
}

fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad_len = PAD_BLOCK - (data.len() % PAD_BLOCK);
    let mut out = Vec::with_capacity(data.len() + pad_len);
    out.extend_from_slice(data);
    out.resize(out.len() + pad_len, pad_len as u8);
    out
}

fn pkcs7_unpad(data: &[u8]) -> (Vec<u8>, bool) {
    if data.is_empty() || data.len() % PAD_BLOCK != 0 {
        return (data.to_vec(), false);
    }
    let pad_len = *data.last().expect("checked non-empty above") as usize;
    if pad_len == 0 || pad_len > PAD_BLOCK || pad_len > data.len() {
        return (data.to_vec(), false);
    }
    let body_len = data.len() - pad_len;
    let tail_ok = data[body_len..].iter().all(|&b| b == pad_len as u8);
    (data[..body_len].to_vec(), tail_ok)
}

/// Chunk-size rule (§4.2): a padded buffer of exactly one block uses
/// half-size chunks so chaining still has at least two chunks to work
/// with; every larger buffer uses full 64-byte chunks.
fn chain_chunk_size(padded_len: usize) -> usize {
    if padded_len == PAD_BLOCK {
        32
    } else {
        64
    }
}

fn get_chunk(buf: &[u8], index: usize, chunk_size: usize) -> &[u8] {
    &buf[index * chunk_size..(index + 1) * chunk_size]
}

fn set_chunk(buf: &mut [u8], index: usize, chunk_size: usize, value: &[u8]) {
    buf[index * chunk_size..(index + 1) * chunk_size].copy_from_slice(value);
}

/// Derive the 32-byte chain key (`safe_key`) for a call: BLAKE3
/// derive-key under `"@UMBRAv0.0.0-@STDMACE-@MACEv1.0.0-" ‖ full_context`,
/// absorbing `key` (plus `BLAKE3-512(mixin)` for mixin variants) and the
/// per-message salt.
fn derive_chain_key(key: &[u8], salt: &[u8; SALT_SIZE], mixin: Option<&[u8]>, variant: Variant, context: &str) -> [u8; 32] {
    let full_context = variant.full_context(context);
    let derive_ctx = format!("{KEY_SCHEDULE_PREFIX}{full_context}");
    let mut hasher = blake3::Hasher::new_derive_key(&derive_ctx);
    hasher.update(key);
    if let (true, Some(m)) = (variant.has_mixin(), mixin) {
        hasher.update(&sum(m));
    }
    hasher.update(salt);
    let mut out = [0u8; 32];
    hasher.finalize_xof().fill(&mut out);
    out
}

/// `pad_material`: a fresh keyed-BLAKE3 hash under `chain_key`, over
/// `prev2 ‖ BE16(round) ‖ BE32(chunk)`, truncated to `chunk_size` bytes.
fn pad_material(chain_key: &[u8; 32], prev2: &[u8], round: u32, chunk: u32, chunk_size: usize) -> Vec<u8> {
    let mut hasher = blake3::Hasher::new_keyed(chain_key);
    hasher.update(prev2);
    hasher.update(&(round as u16).to_be_bytes());
    hasher.update(&chunk.to_be_bytes());
    let mut out = vec![0u8; chunk_size];
    hasher.finalize_xof().fill(&mut out);
    out
}

fn xor_in_place(dst: &mut [u8], mask: &[u8]) {
    for (d, m) in dst.iter_mut().zip(mask) {
        *d ^= m;
    }
}

/// One forward chaining round (§4.2 "Core encrypt"): right-to-left over
/// chunks `n-1 .. 1`, each keyed on the pre-round value two chunks back
/// (or the saved last chunk, for the first two positions), XORed into
/// the pre-round value one chunk back. `buf[0]` is finally overwritten
/// with the round's original last chunk.
fn forward_round(buf: &mut [u8], chain_key: &[u8; 32], round: u32, n: usize, chunk_size: usize) {
    let last = get_chunk(buf, n - 1, chunk_size).to_vec();
    for chunk in (1..n).rev() {
        let prev2 = if chunk >= 2 {
            get_chunk(buf, chunk - 2, chunk_size).to_vec()
        } else {
            last.clone()
        };
        let mask = pad_material(chain_key, &prev2, round, chunk as u32, chunk_size);
        let mut new_val = get_chunk(buf, chunk - 1, chunk_size).to_vec();
        xor_in_place(&mut new_val, &mask);
        set_chunk(buf, chunk, chunk_size, &new_val);
    }
    set_chunk(buf, 0, chunk_size, &last);
}

/// Undo one forward round (§4.2 "Core decrypt"): left-to-right over
/// chunks `0 .. n-2`, recovering chunk `i` from the already-recovered
/// chunk `i-1` (or the saved first chunk) and the still-encrypted chunk
/// `i+1`. `buf[n-1]` is finally restored from the round's original
/// first chunk.
fn inverse_round(buf: &mut [u8], chain_key: &[u8; 32], round: u32, n: usize, chunk_size: usize) {
    let first = get_chunk(buf, 0, chunk_size).to_vec();
    for chunk in 0..n - 1 {
        let prev = if chunk >= 1 {
            get_chunk(buf, chunk - 1, chunk_size).to_vec()
        } else {
            first.clone()
        };
        let mask = pad_material(chain_key, &prev, round, (chunk + 1) as u32, chunk_size);
        let mut new_val = get_chunk(buf, chunk + 1, chunk_size).to_vec();
        xor_in_place(&mut new_val, &mask);
        set_chunk(buf, chunk, chunk_size, &new_val);
    }
    set_chunk(buf, n - 1, chunk_size, &first);
}

fn encrypt_core(padded: &[u8], chain_key: &[u8; 32], rounds: u32) -> Vec<u8> {
    let mut buf = padded.to_vec();
    let chunk_size = chain_chunk_size(buf.len());
    let n = buf.len() / chunk_size;
    for round in 0..rounds {
        forward_round(&mut buf, chain_key, round, n, chunk_size);
    }
    buf
}

fn decrypt_core(ciphertext: &[u8], chain_key: &[u8; 32], rounds: u32) -> Vec<u8> {
    let mut buf = ciphertext.to_vec();
    let chunk_size = chain_chunk_size(buf.len());
    let n = buf.len() / chunk_size;
    for round in (0..rounds).rev() {
        inverse_round(&mut buf, chain_key, round, n, chunk_size);
    }
    buf
}

/// Tag computation (§4.2, AEAD variants): reset the chain-keyed hasher,
/// absorb `ciphertext`, then `BE16(difficulty)`, then `mixin` (MIXIN+AEAD
/// only), extract 16 bytes.
fn compute_tag(chain_key: &[u8; 32], ciphertext: &[u8], difficulty: u16, mixin: Option<&[u8]>, variant: Variant) -> [u8; TAG_SIZE] {
    let mut hasher = blake3::Hasher::new_keyed(chain_key);
    hasher.update(ciphertext);
    hasher.update(&difficulty.to_be_bytes());
    if let (Variant::MixinAead, Some(m)) = (variant, mixin) {
        hasher.update(m);
    }
    let mut out = [0u8; TAG_SIZE];
    hasher.finalize_xof().fill(&mut out);
    out
}

/// Salt used when `deterministic` is set: fixes the one source of
/// per-call randomness so the same inputs always produce the same pack.
const DETERMINISTIC_SALT: [u8; SALT_SIZE] = [0u8; SALT_SIZE];

/// Encrypt `plaintext` under `key` (and `difficulty`'s round count),
/// returning a wire-format pack of `salt || tag? || ciphertext`.
///
/// `mixin` must be `Some` for `Variant::Mixin`/`Variant::MixinAead` and
/// is ignored otherwise. `deterministic` disables salt randomization:
/// every call with the same `(key, plaintext, context, mixin)` then
/// produces a byte-identical pack. Non-deterministic callers should
/// pass `false` so repeated encryptions of the same payload don't
/// reveal that they're the same payload.
pub fn encrypt(
    key: &[u8],
    plaintext: &[u8],
    difficulty: u16,
    variant: Variant,
    context: &str,
    mixin: Option<&[u8]>,
    deterministic: bool,
) -> Result<EncryptOutput, CoreError> {
    let salt: [u8; SALT_SIZE] = if deterministic {
        DETERMINISTIC_SALT
    } else {
        random_bytes()?
    };
    let mut chain_key = derive_chain_key(key, &salt, mixin, variant, context);
    let padded = pkcs7_pad(plaintext);
    let rounds = rounds_for_difficulty(difficulty);
    let ciphertext = encrypt_core(&padded, &chain_key, rounds);

    let mut pack = Vec::with_capacity(SALT_SIZE + TAG_SIZE + ciphertext.len());
    pack.extend_from_slice(&salt);
    if variant.has_aead() {
        let tag = compute_tag(&chain_key, &ciphertext, difficulty, mixin, variant);
        pack.extend_from_slice(&tag);
    }
    pack.extend_from_slice(&ciphertext);
    chain_key.zeroize();
    Ok(EncryptOutput { pack })
}

/// Decrypt a `salt || tag? || ciphertext` pack produced by [`encrypt`].
///
/// Always returns a plaintext buffer. `valid` is `false` if the pack was
/// too short, the ciphertext length wasn't a block multiple, the AEAD
/// tag didn't match, or the padding failed to validate — callers must
/// check `valid` before trusting `plaintext`.
pub fn decrypt(
    key: &[u8],
    pack: &[u8],
    difficulty: u16,
    variant: Variant,
    context: &str,
    mixin: Option<&[u8]>,
) -> DecryptOutput {
    let header_len = SALT_SIZE + if variant.has_aead() { TAG_SIZE } else { 0 };
    if pack.len() < header_len || (pack.len() - header_len) == 0 || (pack.len() - header_len) % PAD_BLOCK != 0 {
        return DecryptOutput {
            plaintext: Vec::new(),
            valid: false,
        };
    }

    let salt: [u8; SALT_SIZE] = pack[..SALT_SIZE].try_into().expect("length checked above");
    let (tag_bytes, ciphertext) = if variant.has_aead() {
        (
            Some(&pack[SALT_SIZE..SALT_SIZE + TAG_SIZE]),
            &pack[SALT_SIZE + TAG_SIZE..],
        )
    } else {
        (None, &pack[SALT_SIZE..])
    };

    let mut chain_key = derive_chain_key(key, &salt, mixin, variant, context);

    let tag_ok = match tag_bytes {
        Some(given) => {
            let expected = compute_tag(&chain_key, ciphertext, difficulty, mixin, variant);
            expected.ct_eq(given).into()
        }
        None => true,
    };

    let rounds = rounds_for_difficulty(difficulty);
    let padded = decrypt_core(ciphertext, &chain_key, rounds);
    chain_key.zeroize();
    let (plaintext, pad_ok) = pkcs7_unpad(&padded);

    DecryptOutput {
        plaintext,
        valid: tag_ok && pad_ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn roundtrip_plain_single_byte() {
        let out = encrypt(KEY, b"x", 1, Variant::Plain, "T", None, false).unwrap();
        let dec = decrypt(KEY, &out.pack, 1, Variant::Plain, "T", None);
        assert!(dec.valid);
        assert_eq!(dec.plaintext, b"x");
    }

    #[test]
    fn roundtrip_empty_message() {
        let out = encrypt(KEY, b"", 2, Variant::Plain, "ctx", None, false).unwrap();
        let dec = decrypt(KEY, &out.pack, 2, Variant::Plain, "ctx", None);
        assert!(dec.valid);
        assert_eq!(dec.plaintext, b"");
    }

    #[test]
    fn roundtrip_multi_chunk_message() {
        let msg = vec![0xABu8; 200];
        let out = encrypt(KEY, &msg, 4, Variant::Plain, "ctx", None, false).unwrap();
        let dec = decrypt(KEY, &out.pack, 4, Variant::Plain, "ctx", None);
        assert!(dec.valid);
        assert_eq!(dec.plaintext, msg);
    }

    #[test]
    fn roundtrip_exact_single_block_uses_half_chunks() {
        // 62 bytes pads to exactly one 64-byte block -> chunk_size 32.
        let msg = vec![0x11u8; 62];
        let out = encrypt(KEY, &msg, 5, Variant::Plain, "ctx", None, false).unwrap();
        let dec = decrypt(KEY, &out.pack, 5, Variant::Plain, "ctx", None);
        assert!(dec.valid);
        assert_eq!(dec.plaintext, msg);
    }

    #[test]
    fn aead_roundtrip_and_tamper_detection() {
        let msg = vec![0u8; 1024];
        let out = encrypt(KEY, &msg, 2, Variant::Aead, "ctx", None, false).unwrap();
        let dec = decrypt(KEY, &out.pack, 2, Variant::Aead, "ctx", None);
        assert!(dec.valid);
        assert_eq!(dec.plaintext, msg);

        let mut tampered = out.pack.clone();
        let tag_start = SALT_SIZE;
        tampered[tag_start] ^= 0x01;
        let dec_bad = decrypt(KEY, &tampered, 2, Variant::Aead, "ctx", None);
        assert!(!dec_bad.valid);
    }

    #[test]
    fn mixin_key_separation() {
        let msg = b"same key, different mixin";
        let out_a = encrypt(KEY, msg, 2, Variant::Mixin, "ctx", Some(b"mixin-a"), false).unwrap();
        let dec_wrong_mixin = decrypt(KEY, &out_a.pack, 2, Variant::Mixin, "ctx", Some(b"mixin-b"));
        assert!(
            dec_wrong_mixin.plaintext != msg,
            "decrypting under the wrong mixin must not reproduce the original plaintext"
        );

        let dec_right_mixin = decrypt(KEY, &out_a.pack, 2, Variant::Mixin, "ctx", Some(b"mixin-a"));
        assert!(dec_right_mixin.valid);
        assert_eq!(dec_right_mixin.plaintext, msg);
    }

    #[test]
    fn mixin_aead_roundtrip() {
        let msg = b"both mixin and tag";
        let out = encrypt(KEY, msg, 2, Variant::MixinAead, "ctx", Some(b"context-secret"), false).unwrap();
        let dec = decrypt(KEY, &out.pack, 2, Variant::MixinAead, "ctx", Some(b"context-secret"));
        assert!(dec.valid);
        assert_eq!(dec.plaintext, msg);

        let dec_wrong = decrypt(KEY, &out.pack, 2, Variant::MixinAead, "ctx", Some(b"wrong-secret"));
        assert!(!dec_wrong.valid);
    }

    #[test]
    fn context_separates_ciphertexts() {
        let out = encrypt(KEY, b"payload", 1, Variant::Plain, "A", None, false).unwrap();
        let dec = decrypt(KEY, &out.pack, 1, Variant::Plain, "B", None);
        assert_ne!(dec.plaintext, b"payload");
    }

    #[test]
    fn encrypt_is_nondeterministic_across_calls() {
        let out1 = encrypt(KEY, b"same message", 1, Variant::Plain, "ctx", None, false).unwrap();
        let out2 = encrypt(KEY, b"same message", 1, Variant::Plain, "ctx", None, false).unwrap();
        assert_ne!(out1.pack, out2.pack, "random salt must vary the pack each call");
    }

    #[test]
    fn deterministic_flag_pins_the_pack() {
        let out1 = encrypt(KEY, b"same message", 1, Variant::Plain, "ctx", None, true).unwrap();
        let out2 = encrypt(KEY, b"same message", 1, Variant::Plain, "ctx", None, true).unwrap();
        assert_eq!(out1.pack, out2.pack);

        let dec = decrypt(KEY, &out1.pack, 1, Variant::Plain, "ctx", None);
        assert!(dec.valid);
        assert_eq!(dec.plaintext, b"same message");
    }

    #[test]
    fn rounds_formula_matches_difficulty() {
        assert_eq!(rounds_for_difficulty(0), 3);
        assert_eq!(rounds_for_difficulty(1), 5);
        assert_eq!(rounds_for_difficulty(10), 23);
    }

    #[test]
    fn decrypt_rejects_truncated_pack_without_panicking() {
        let dec = decrypt(KEY, &[0u8; 4], 1, Variant::Aead, "ctx", None);
        assert!(!dec.valid);
        assert!(dec.plaintext.is_empty());
    }

    #[test]
    fn wrong_key_fails_padding_or_tag_check() {
        let out = encrypt(KEY, b"secret payload", 2, Variant::Aead, "ctx", None, false).unwrap();
        let dec = decrypt(b"a different key entirely", &out.pack, 2, Variant::Aead, "ctx", None);
        assert!(!dec.valid);
    }

    #[test]
    fn difficulty_bit_flip_invalidates_aead_tag() {
        let out = encrypt(KEY, b"payload", 3, Variant::Aead, "ctx", None, false).unwrap();
        let dec = decrypt(KEY, &out.pack, 4, Variant::Aead, "ctx", None);
        assert!(!dec.valid);
    }
}
