//! Stateless key derivation from a 32-byte "soul" seed.
//!
//! Both the Ed25519 signing key and the X25519 private scalar are derived
//! from the same soul via [`crate::primitives::kdf`] under distinct
//! domain-separation contexts. The soul itself is never transmitted; only
//! the derived public keys and signatures cross the wire.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use x25519_dalek::{PublicKey as X25519PublicKey, SharedSecret, StaticSecret};
use zeroize::Zeroize;

use crate::primitives::kdf;

const ED25519_CONTEXT: &str = "@ED25519-PRIVATEKEY-DERIVATION";
const X25519_CONTEXT: &str = "@X25519-PRIVATEKEY-DERIVATION";
const SESSION_SHARED_KEY_CONTEXT: &str = "@SESSION-SHARED-KEY";

/// A 32-byte secret seed. Source of both the Ed25519 and X25519 private
/// key material for one handshake attempt (client) or one issued session
/// (server).
pub type Soul = [u8; 32];

fn ed25519_seed(soul: &Soul) -> [u8; 32] {
    kdf(soul, ED25519_CONTEXT, 32)
        .try_into()
        .expect("kdf with out_len=32 always yields 32 bytes")
}

/// Derive the Ed25519 signing key for this soul.
pub fn ed25519_signing_key(soul: &Soul) -> SigningKey {
    let mut seed = ed25519_seed(soul);
    let signing_key = SigningKey::from_bytes(&seed);
    seed.zeroize();
    signing_key
}

/// Derive the Ed25519 public key for this soul.
pub fn ed25519_public_key(soul: &Soul) -> VerifyingKey {
    ed25519_signing_key(soul).verifying_key()
}

/// Sign `msg` under the Ed25519 key derived from `soul`.
pub fn sign(soul: &Soul, msg: &[u8]) -> Signature {
    ed25519_signing_key(soul).sign(msg)
}

/// Verify `sig` over `msg` under the given Ed25519 public key bytes.
///
/// Returns `false` on any malformed input rather than propagating an
/// error — signature verification is a yes/no gate in this protocol (§8
/// "Signature gate"), never a recoverable error.
pub fn verify(pubkey_bytes: &[u8], msg: &[u8], sig_bytes: &[u8]) -> bool {
    let Ok(pubkey_arr): Result<[u8; 32], _> = pubkey_bytes.try_into() else {
        return false;
    };
    let Ok(sig_arr): Result<[u8; 64], _> = sig_bytes.try_into() else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&pubkey_arr) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_arr);
    verifying_key.verify(msg, &signature).is_ok()
}

fn x25519_scalar(soul: &Soul) -> [u8; 32] {
    kdf(soul, X25519_CONTEXT, 32)
        .try_into()
        .expect("kdf with out_len=32 always yields 32 bytes")
}

/// Derive the X25519 private scalar for this soul.
pub fn x25519_static_secret(soul: &Soul) -> StaticSecret {
    let mut scalar = x25519_scalar(soul);
    let secret = StaticSecret::from(scalar);
    scalar.zeroize();
    secret
}

/// Derive the X25519 public key for this soul.
pub fn x25519_public_key(soul: &Soul) -> X25519PublicKey {
    X25519PublicKey::from(&x25519_static_secret(soul))
}

/// Compute the X25519 shared secret between this soul and a peer's public
/// key.
pub fn compute_shared_secret(soul: &Soul, peer_public: &X25519PublicKey) -> SharedSecret {
    x25519_static_secret(soul).diffie_hellman(peer_public)
}

/// Run the raw X25519 shared secret through the `@SESSION-SHARED-KEY` KDF
/// to obtain the 32-byte symmetric key that seals the handshake response
/// payload.
pub fn session_shared_key(shared_secret: &SharedSecret) -> [u8; 32] {
    kdf(shared_secret.as_bytes(), SESSION_SHARED_KEY_CONTEXT, 32)
        .try_into()
        .expect("kdf with out_len=32 always yields 32 bytes")
}
