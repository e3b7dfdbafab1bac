//! Client-side key material (C7 counterpart to the server's soul
//! handling). The soul is the only long-lived secret the client holds
//! before a session exists, so it gets the teacher's usual
//! zeroize-on-drop treatment rather than living as a bare array.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use zeroize::ZeroizeOnDrop;

use umbra_core::keys::{self, Soul};
use umbra_core::primitives;
use umbra_core::CoreError;

/// A freshly generated client identity: a soul plus its two derived
/// public keys, ready to hand to [`crate::introduce::request_body`].
#[derive(ZeroizeOnDrop)]
pub struct SessionKeypair {
    soul: Soul,
    #[zeroize(skip)]
    ed25519_pubkey_b64: String,
    #[zeroize(skip)]
    x25519_pubkey_b64: String,
}

impl SessionKeypair {
    /// Generate a new soul from the OS CSPRNG and derive its public
    /// keys.
    pub fn generate() -> Result<Self, CoreError> {
        let soul: Soul = primitives::random_bytes()?;
        Ok(Self::from_soul(soul))
    }

    /// Build from an existing soul (used by tests and by callers who
    /// manage their own entropy source).
    pub fn from_soul(soul: Soul) -> Self {
        let ed_pub = keys::ed25519_public_key(&soul);
        let x_pub = keys::x25519_public_key(&soul);
        Self {
            soul,
            ed25519_pubkey_b64: URL_SAFE_NO_PAD.encode(ed_pub.to_bytes()),
            x25519_pubkey_b64: URL_SAFE_NO_PAD.encode(x_pub.as_bytes()),
        }
    }

    pub fn ed25519_pubkey_b64(&self) -> &str {
        &self.ed25519_pubkey_b64
    }

    pub fn x25519_pubkey_b64(&self) -> &str {
        &self.x25519_pubkey_b64
    }

    /// Sign `msg` with this identity's Ed25519 key.
    pub fn sign(&self, msg: &[u8]) -> [u8; 64] {
        keys::sign(&self.soul, msg).to_bytes()
    }

    pub(crate) fn soul(&self) -> &Soul {
        &self.soul
    }
}
