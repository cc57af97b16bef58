// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Retry policy with exponential backoff and jitter

use crate::error::{UploadError, UploadResult};
use blobstage_config::RetryConfig;
use blobstage_store::{StoreError, StoreResult};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Backoff exponent cap: delays stop doubling after 2^5 x base
const MAX_BACKOFF_EXPONENT: u32 = 5;

/// How transient failures are retried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from_config(&RetryConfig::default())
    }
}

/// A value plus the number of attempts it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

impl<T> Attempted<T> {
    /// Attempts beyond the first
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Deterministic delay before retry number `retry` (0-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay actually slept: the backoff, or with jitter a value in [backoff/2, backoff]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let backoff = self.backoff(retry);
        if !self.jitter || backoff.is_zero() {
            return backoff;
        }
        let half = backoff / 2;
        let spread = (backoff - half).as_millis() as u64;
        half + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }

    /// Run `op` until it succeeds, fails permanently, or exhausts the policy.
    ///
    /// Each attempt is bounded by `per_attempt_timeout`; an attempt that
    /// times out counts as a transient failure. Cancellation is observed
    /// both during an attempt and during backoff.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        per_attempt_timeout: Duration,
        cancel: &CancellationToken,
        mut op: F,
    ) -> UploadResult<Attempted<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                res = tokio::time::timeout(per_attempt_timeout, op()) => res,
            };

            let err = match outcome {
                Ok(Ok(value)) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    })
                }
                Ok(Err(err)) => err,
                Err(_) => StoreError::timeout(format!(
                    "{} attempt {} exceeded {:?}",
                    operation, attempt, per_attempt_timeout
                )),
            };

            if !err.is_transient() || attempt >= self.max_attempts() {
                return Err(UploadError::from_store(err, operation, attempt));
            }

            let delay = self.delay_for(attempt - 1);
            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            jitter: false,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            jitter: false,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(5), Duration::from_secs(2));
        assert_eq!(policy.backoff(30), Duration::from_secs(2));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy {
            jitter: true,
            ..RetryPolicy::default()
        };
        for retry in 0..6 {
            let backoff = policy.backoff(retry);
            let delay = policy.delay_for(retry);
            assert!(delay <= backoff);
            assert!(delay >= backoff / 2);
        }
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let calls = AtomicU32::new(0);
        let result = fast(3)
            .run("op", Duration::from_secs(1), &CancellationToken::new(), || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StoreError::http(503, "busy"))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(result.value, 7);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.retries(), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let err = fast(3)
            .run("op", Duration::from_secs(1), &CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(StoreError::permission_denied("nope"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::PermanentClient(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let err = fast(2)
            .run("put_block", Duration::from_secs(1), &CancellationToken::new(), || async {
                Err::<(), _>(StoreError::http(500, "boom"))
            })
            .await
            .unwrap_err();
        match err {
            UploadError::Transient { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_transient() {
        let calls = AtomicU32::new(0);
        let result = fast(1)
            .run("op", Duration::from_millis(20), &CancellationToken::new(), || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn test_cancellation_during_attempt() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let err = fast(0)
            .run("op", Duration::from_secs(10), &token, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
