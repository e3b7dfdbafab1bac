//! Client-side proof-of-work solver (C7, counterpart to §4.5's
//! `ComputePoW`).
//!
//! Brute-forces a nonce against a server-issued challenge, reporting
//! progress on a bounded channel every `max_attempts / 1000 + 1`
//! attempts so a UI can show a percentage without the solver ever
//! blocking on a slow or absent reader.

use tokio::sync::mpsc;

use umbra_core::pow as core_pow;

use crate::error::ClientError;

/// Hard ceiling on how long a challenge this solver will attempt.
/// `max_attempts` for a challenge this long already overflows `u64`
/// (§4.5: overflowing the attempt budget must fail with
/// `ChallengeTooLarge`, not silently saturate), so 7 is the largest
/// length `core_pow::max_attempts` can still represent exactly.
pub const MAX_CHALLENGE_LEN: usize = 7;

#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub attempt: u64,
    pub max_attempts: u64,
    /// Percentage of the target failure probability's complement
    /// covered so far, clamped to `[0, 100]`.
    pub percentage: f64,
}

/// Argon2id parameters the solver hashes with. Must match what the
/// server issued alongside the challenge, or `verify` on the server
/// side will disagree with what the client thinks it solved.
#[derive(Debug, Clone, Copy)]
pub struct PowParams {
    pub salt: [u8; core_pow::SALT_LEN],
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub target_fail_prob: f64,
}

/// Solve `challenge`, optionally reporting progress on `progress_tx`.
/// Returns the first nonce found to satisfy the challenge, or
/// [`ClientError::NoNonceFound`] if the probabilistic attempt budget is
/// exhausted first.
pub async fn solve(
    challenge: &[u8],
    params: PowParams,
    progress_tx: Option<mpsc::Sender<Progress>>,
) -> Result<u64, ClientError> {
    if challenge.len() > MAX_CHALLENGE_LEN {
        return Err(ClientError::ChallengeTooLarge(challenge.len()));
    }

    let per_attempt_p = core_pow::success_probability(challenge.len());
    let max_attempts = core_pow::max_attempts(challenge.len(), params.target_fail_prob);
    let report_every = max_attempts / 1000 + 1;

    for attempt in 0..max_attempts {
        let nonce = attempt;
        let solved = core_pow::verify(
            challenge,
            nonce,
            &params.salt,
            params.memory_kib,
            params.iterations,
            params.parallelism,
        )?;

        if solved {
            return Ok(nonce);
        }

        if attempt % report_every == 0 {
            if let Some(tx) = &progress_tx {
                let covered = 1.0 - (1.0 - per_attempt_p).powi(attempt as i32 + 1);
                let percentage = (100.0 * covered / (1.0 - params.target_fail_prob)).min(100.0);
                let _ = tx.try_send(Progress {
                    attempt: attempt + 1,
                    max_attempts,
                    percentage,
                });
            }
        }

        if attempt % 64 == 0 {
            tokio::task::yield_now().await;
        }
    }

    Err(ClientError::NoNonceFound(max_attempts))
}
