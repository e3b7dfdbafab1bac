//! Umbra session-bootstrap server: rate limiter and PoW tuner (C5),
//! handshake controller (C6), in-memory session store (C4), and the
//! expiry janitor (C8). `umbra-core` supplies every cryptographic
//! primitive this crate uses.

pub mod captcha;
pub mod config;
pub mod error;
pub mod handshake;
pub mod http;
pub mod janitor;
pub mod logging;
pub mod rate_limiter;
pub mod store;
