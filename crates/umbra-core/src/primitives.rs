//! BLAKE3-backed primitives shared by the rest of the core.
//!
//! A single backing hash function provides three domain-separated
//! operations (`sum`, `kdf`, `mac`), plus a thin CSPRNG wrapper. Everything
//! else in this crate — MACE's key schedule, the Ed25519/X25519 key
//! derivation in [`crate::keys`] — is built on top of these three.

use rand_core::RngCore;

use crate::error::CoreError;

/// Raw BLAKE3-512: a 64-byte digest of `data`.
pub fn sum(data: &[u8]) -> [u8; 64] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(data);
    let mut out = [0u8; 64];
    hasher.finalize_xof().fill(&mut out);
    out
}

/// BLAKE3 in derive-key mode, domain-separated by `context`.
///
/// Absorbs `raw_key` and extracts `out_len` bytes. Used both directly (the
/// shared-key derivation in the handshake) and as the basis for [`mac`].
pub fn kdf(raw_key: &[u8], context: &str, out_len: usize) -> Vec<u8> {
    let ctx = format!("@UMBRA-STDKDF-{context}");
    let mut hasher = blake3::Hasher::new_derive_key(&ctx);
    hasher.update(raw_key);
    let mut out = vec![0u8; out_len];
    hasher.finalize_xof().fill(&mut out);
    out
}

/// BLAKE3 keyed MAC, domain-separated by `context`.
///
/// `key` is first run through derive-key mode to produce a 32-byte keyed
/// hasher key, which then absorbs `data` to produce a 32-byte tag. Two
/// calls with different `context` strings under the same `key` are
/// unrelated — this is what gives MACE's key schedule (§4.2) its
/// per-variant domain separation.
pub fn mac(key: &[u8], data: &[u8], context: &str) -> [u8; 32] {
    let ctx = format!("@UMBRA-@STDMAC-{context}");
    let mut key_hasher = blake3::Hasher::new_derive_key(&ctx);
    key_hasher.update(key);
    let mut safe_key = [0u8; 32];
    key_hasher.finalize_xof().fill(&mut safe_key);

    let mut hasher = blake3::Hasher::new_keyed(&safe_key);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Fill a fixed-size buffer from the OS CSPRNG.
///
/// All salts, nonces, challenges, souls, and session identifiers in this
/// codebase come from here. A read failure fails loudly rather than
/// silently falling back to a weaker source.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], CoreError> {
    let mut buf = [0u8; N];
    rand::rngs::OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|_| CoreError::EntropyFailure)?;
    Ok(buf)
}

/// Fill a heap-allocated buffer of `len` bytes from the OS CSPRNG.
/// Used where the length isn't known until runtime, e.g. a PoW
/// challenge sized off the current rate-limiter difficulty.
pub fn random_vec(len: usize) -> Result<Vec<u8>, CoreError> {
    let mut buf = vec![0u8; len];
    rand::rngs::OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|_| CoreError::EntropyFailure)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_is_deterministic_and_64_bytes() {
        let a = sum(b"hello");
        let b = sum(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, sum(b"hellp"));
    }

    #[test]
    fn kdf_context_separates_output() {
        let a = kdf(b"key-material", "A", 32);
        let b = kdf(b"key-material", "B", 32);
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn kdf_supports_arbitrary_output_length() {
        let short = kdf(b"k", "ctx", 16);
        let long = kdf(b"k", "ctx", 96);
        assert_eq!(short.len(), 16);
        assert_eq!(long.len(), 96);
        assert_eq!(&long[..16], &short[..]);
    }

    #[test]
    fn mac_is_keyed_and_context_separated() {
        let m1 = mac(b"key1", b"data", "ctx");
        let m2 = mac(b"key2", b"data", "ctx");
        let m3 = mac(b"key1", b"data", "other-ctx");
        assert_ne!(m1, m2);
        assert_ne!(m1, m3);
    }

    #[test]
    fn random_bytes_are_not_all_zero() {
        let buf: [u8; 32] = random_bytes().unwrap();
        assert!(buf.iter().any(|&b| b != 0));
    }

    #[test]
    fn random_vec_honors_requested_length() {
        let buf = random_vec(5).unwrap();
        assert_eq!(buf.len(), 5);
    }
}
