//! Umbra client-side handshake primitives: soul generation, server
//! introduction/verification, the PoW solver, and CAPTCHA checkout.
//! A host runtime bridge (WASM, FFI, whatever embeds this) is an
//! external collaborator; this crate is what such a bridge wraps.

pub mod captcha;
pub mod error;
pub mod introduce;
pub mod keypair;
pub mod pow;
pub mod ready;

pub use error::ClientError;
