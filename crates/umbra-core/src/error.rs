use thiserror::Error;

/// Errors raised by the cryptographic core.
///
/// These are reserved for preconditions the core refuses to operate on at
/// all (malformed ciphertext length, CSPRNG failure) — never for
/// authentication failure. A MACE AEAD tag mismatch is reported through
/// [`crate::mace::DecryptOutput::valid`], not through this type; see §7/§9
/// of the design notes for why that distinction is load-bearing.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Ciphertext was empty, or its length was not a positive multiple of
    /// 64 bytes. Also reused for a PKCS#7 padding byte that fails
    /// validation on unpad — the caller gets a truncated plaintext back
    /// alongside this error and must not treat the plaintext as authentic.
    #[error("invalid padding or ciphertext length")]
    InvalidPadding,

    #[error("failed to read system entropy")]
    EntropyFailure,

    /// Argon2id rejected its own parameters (e.g. a challenge length
    /// outside its supported salt range). This is a configuration bug,
    /// not an attacker-controlled condition.
    #[error("argon2id parameter error: {0}")]
    Argon2Params(String),
}
