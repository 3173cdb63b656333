//! Round-call client: one bounded exchange with a participant.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use super::traits::Participant;
use crate::error::{ParticipantError, ParticipantUnavailable};

/// Timeout and retry budget for participant calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts for timeouts and transport failures.
    pub max_attempts: u32,
    /// Bound on a single attempt.
    pub attempt_timeout: Duration,
    /// Delay before the second attempt; doubles after each failure.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Extra random delay, as a fraction of the backoff (0.0-1.0).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(60),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        let base = self
            .initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || base.is_zero() {
            return base;
        }
        let factor = rand::thread_rng().gen_range(0.0..=jitter);
        base + base.mul_f64(factor)
    }
}

/// Sends payloads to participants within a [`RetryPolicy`].
///
/// Stateless apart from its policy, so one client is shared by every
/// session in a batch.
#[derive(Debug, Clone, Default)]
pub struct RoundCallClient {
    policy: RetryPolicy,
}

impl RoundCallClient {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Get one utterance from `participant`.
    ///
    /// Timeouts and transport failures are retried with exponential backoff
    /// until `max_attempts` is spent. A blank or unparseable answer is
    /// re-requested exactly once.
    pub async fn call<P, T>(&self, participant: &T, payload: &P) -> Result<String, ParticipantUnavailable>
    where
        P: Sync,
        T: Participant<P> + ?Sized,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut failures = 0u32;
        let mut calls = 0u32;
        let mut re_requested = false;

        loop {
            calls += 1;
            let outcome =
                match tokio::time::timeout(self.policy.attempt_timeout, participant.respond(payload))
                    .await
                {
                    Ok(Ok(text)) if text.trim().is_empty() => Err(
                        ParticipantError::MalformedResponse("empty message".to_string()),
                    ),
                    Ok(result) => result,
                    Err(_) => Err(ParticipantError::Timeout(self.policy.attempt_timeout)),
                };

            let error = match outcome {
                Ok(text) => {
                    debug!(participant = participant.name(), calls, "participant answered");
                    return Ok(text);
                }
                Err(e) => e,
            };

            let unavailable = |last_error| ParticipantUnavailable {
                participant: participant.name().to_string(),
                attempts: calls,
                last_error,
            };

            if error.is_malformed() {
                if re_requested {
                    warn!(participant = participant.name(), error = %error, "malformed response after re-request");
                    return Err(unavailable(error));
                }
                warn!(participant = participant.name(), error = %error, "malformed response, re-requesting");
                re_requested = true;
                continue;
            }

            failures += 1;
            if !error.is_retryable() || failures >= max_attempts {
                warn!(
                    participant = participant.name(),
                    attempts = calls,
                    error = %error,
                    "participant unavailable"
                );
                return Err(unavailable(error));
            }

            let delay = self.policy.backoff(failures);
            warn!(
                participant = participant.name(),
                attempt = failures,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "participant call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
