//! Expiry janitor (C8, §4.6).
//!
//! A periodic sweep that prunes expired sessions and stale rate-limiter
//! entries. Mirrors the teacher's background-loop shape: a `sleep`
//! future racing a shutdown signal inside `tokio::select!`, so the task
//! exits promptly instead of waiting out its own interval.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, Duration};

use crate::rate_limiter::RateLimiter;
use crate::store::SessionStore;

/// Spawn the janitor loop. Ticks every `interval_secs`, sweeping both
/// the session store and the rate limiter's tracker, until `shutdown`
/// is signalled.
pub fn spawn(
    store: Arc<dyn SessionStore>,
    rate_limiter: Arc<RateLimiter>,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    let expired = store.sweep_expired(now);
                    let stale = rate_limiter.sweep_stale(now);
                    if expired > 0 || stale > 0 {
                        tracing::info!(expired, stale, "janitor sweep complete");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("janitor shutting down");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimiterConfig;
    use crate::store::{InMemorySessionStore, Session};
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    fn expired_session() -> Session {
        Session {
            id: Uuid::new_v4(),
            client_ed25519_pubkey: [0u8; 32],
            client_x25519_pubkey: [0u8; 32],
            server_soul: [0u8; 32],
            shared_key: [0u8; 32],
            session_token: [0u8; 24],
            session_token_cipher_key_salt: [0u8; 12],
            captcha_solution: 1,
            pow_challenge: vec![0],
            pow_salt: [0u8; 12],
            pow_memory_mb: 12,
            pow_iterations: 2,
            pow_parallelism: 1,
            last_nonces: std::collections::HashMap::new(),
            last_activity: Utc::now() - ChronoDuration::minutes(10),
            created_at: Utc::now() - ChronoDuration::minutes(10),
            expires_at: Utc::now() - ChronoDuration::minutes(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn janitor_sweeps_expired_sessions_on_tick() {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        store.insert(expired_session());
        let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig::default()));
        let (tx, rx) = watch::channel(false);

        let handle = spawn(store.clone(), rate_limiter, 1, rx);
        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;

        assert_eq!(store.len(), 0);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
