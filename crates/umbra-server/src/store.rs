//! Session state (C4) and its storage contract.
//!
//! The embedded key-value store itself is an external collaborator —
//! this module only defines [`SessionStore`] and ships an in-memory
//! reference implementation for tests and single-node deployments.
//! Keys are prefixed the way the original model layer prefixed its KV
//! keys: `0x10` for a session record, `0x12` for a tracker entry, so a
//! future shared keyspace can host both without collision.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const SESSION_KEY_PREFIX: u8 = 0x10;
const TRACKER_KEY_PREFIX: u8 = 0x12;

/// How far a sliding renewal pushes `expires_at` out on every
/// authoritative read (§3).
const SLIDING_RENEWAL: Duration = Duration::seconds(300);

/// A single bootstrapped session, as persisted after a successful
/// handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub client_ed25519_pubkey: [u8; 32],
    pub client_x25519_pubkey: [u8; 32],
    pub server_soul: [u8; 32],
    pub shared_key: [u8; 32],
    pub session_token: [u8; 24],
    pub session_token_cipher_key_salt: [u8; 12],
    pub captcha_solution: u32,
    pub pow_challenge: Vec<u8>,
    pub pow_salt: [u8; 12],
    pub pow_memory_mb: u32,
    pub pow_iterations: u32,
    pub pow_parallelism: u32,
    /// Anti-replay nonce log. Reserved for post-handshake use; nothing
    /// in this crate writes to it yet.
    pub last_nonces: HashMap<u64, DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Storage key for this session: `0x10 || id`.
    pub fn key_for(id: Uuid) -> Vec<u8> {
        let mut k = Vec::with_capacity(17);
        k.push(SESSION_KEY_PREFIX);
        k.extend_from_slice(id.as_bytes());
        k
    }
}

/// One sliding-window bucket for a single client identity (C5).
#[derive(Debug, Clone)]
pub struct TrackerEntry {
    pub identity: String,
    pub request_timestamps: Vec<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl TrackerEntry {
    pub fn key_for(identity: &str) -> Vec<u8> {
        let mut k = Vec::with_capacity(1 + identity.len());
        k.push(TRACKER_KEY_PREFIX);
        k.extend_from_slice(identity.as_bytes());
        k
    }
}

/// Storage contract for session records. The in-memory implementation
/// below is the only one shipped here; a durable backend is an
/// external collaborator that implements the same trait.
pub trait SessionStore: Send + Sync {
    fn insert(&self, session: Session);
    /// Authoritative read (§3): if the session exists and hasn't
    /// expired as of `now`, slides `expires_at` forward by
    /// [`SLIDING_RENEWAL`] and stamps `last_activity`. A session found
    /// past its expiry is deleted instead of returned.
    fn get(&self, id: Uuid, now: DateTime<Utc>) -> Option<Session>;
    fn remove(&self, id: Uuid) -> Option<Session>;
    /// Remove every session whose `expires_at` is at or before `now`,
    /// returning how many were swept. Used by the expiry janitor (C8).
    fn sweep_expired(&self, now: DateTime<Utc>) -> usize;
    fn len(&self) -> usize;
}

/// Reference [`SessionStore`] backed by a `parking_lot::RwLock<HashMap>`.
/// Adequate for a single-process deployment or tests; not persisted
/// across restarts.
#[derive(Default)]
pub struct InMemorySessionStore {
    inner: RwLock<HashMap<Uuid, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn insert(&self, session: Session) {
        self.inner.write().insert(session.id, session);
    }

    fn get(&self, id: Uuid, now: DateTime<Utc>) -> Option<Session> {
        let mut guard = self.inner.write();
        let session = guard.get(&id)?;
        if session.is_expired(now) {
            guard.remove(&id);
            return None;
        }
        let session = guard.get_mut(&id).expect("checked present above");
        session.last_activity = now;
        session.expires_at = now + SLIDING_RENEWAL;
        Some(session.clone())
    }

    fn remove(&self, id: Uuid) -> Option<Session> {
        self.inner.write().remove(&id)
    }

    fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut guard = self.inner.write();
        let before = guard.len();
        guard.retain(|_, session| !session.is_expired(now));
        before - guard.len()
    }

    fn len(&self) -> usize {
        self.inner.read().len()
    }
}
