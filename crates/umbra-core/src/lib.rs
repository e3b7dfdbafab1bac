//! Cryptographic core of the Umbra session-bootstrap protocol.
//!
//! This crate has no I/O and no async runtime dependency: it is pure
//! key derivation, the MACE cipher, and the Ed25519/X25519 primitives
//! that `umbra-server` and `umbra-client` both build on.

pub mod error;
pub mod keys;
pub mod mace;
pub mod pow;
pub mod primitives;

pub use error::CoreError;
pub use keys::Soul;
pub use mace::{DecryptOutput, EncryptOutput, Variant};
