use thiserror::Error;

/// Errors raised by the client-side handshake primitives.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("malformed base64url field: {0}")]
    BadEncoding(&'static str),

    #[error("server public key or signature had the wrong length")]
    BadWireLength,

    #[error("server signature over the session pack did not verify")]
    ServerSignatureInvalid,

    #[error("session pack failed to authenticate (tag or padding mismatch)")]
    PackNotAuthentic,

    #[error("PoW challenge of {0} bytes exceeds the solver's configured limit")]
    ChallengeTooLarge(usize),

    #[error("no PoW solution found within {0} attempts")]
    NoNonceFound(u64),

    #[error("session token had length {0}, expected 24 bytes")]
    BadTokenLength(usize),

    #[error("CAPTCHA solution did not unseal the session token")]
    WrongCaptcha,

    #[error(transparent)]
    Core(#[from] umbra_core::CoreError),

    #[error("transport error: {0}")]
    Transport(#[from] serde_json::Error),
}
