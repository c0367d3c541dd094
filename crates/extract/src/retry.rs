use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Outcome of one attempt that did not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("call failed: {0:#}")]
    Transient(anyhow::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: usize, last: AttemptError },
    #[error("time budget of {budget:?} exhausted after {attempts} attempts")]
    TimedOut { attempts: usize, budget: Duration },
    #[error("abandoned after {count} consecutive malformed responses")]
    Malformed { count: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub retry_delay_ms: u64,
    pub total_timeout_ms: u64,
    pub max_malformed: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 3000,
            total_timeout_ms: 30_000,
            max_malformed: 2,
        }
    }
}

/// Bounded retries with a fixed delay and an overall wall-clock budget.
///
/// The budget is checked before every attempt; an in-flight attempt is never
/// cancelled. Malformed responses are counted separately and abandon the call
/// once `max_malformed` of them arrive back to back.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    delay: Duration,
    total_timeout: Duration,
    max_malformed: usize,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration, total_timeout: Duration, max_malformed: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            total_timeout,
            max_malformed: max_malformed.max(1),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub async fn retry<F, Fut, T>(&self, operation_name: &str, mut f: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, AttemptError>>,
    {
        let started = Instant::now();
        let mut attempt = 0;
        let mut consecutive_malformed = 0;

        loop {
            if started.elapsed() > self.total_timeout {
                warn!(
                    operation = operation_name,
                    attempts = attempt,
                    budget_ms = self.total_timeout.as_millis() as u64,
                    "Time budget exhausted"
                );
                return Err(RetryError::TimedOut {
                    attempts: attempt,
                    budget: self.total_timeout,
                });
            }

            attempt += 1;
            let err = match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempts = attempt, "Succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            match &err {
                AttemptError::Malformed(_) => consecutive_malformed += 1,
                AttemptError::Transient(_) => consecutive_malformed = 0,
            }

            if consecutive_malformed >= self.max_malformed {
                warn!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %err,
                    "Abandoning after repeated malformed responses"
                );
                return Err(RetryError::Malformed {
                    count: consecutive_malformed,
                });
            }

            if attempt >= self.max_attempts {
                warn!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %err,
                    "Operation failed after max retries"
                );
                return Err(RetryError::Exhausted { attempts: attempt, last: err });
            }

            warn!(
                operation = operation_name,
                attempt = attempt,
                max_attempts = self.max_attempts,
                delay_ms = self.delay.as_millis() as u64,
                error = %err,
                "Operation failed, retrying"
            );
            sleep(self.delay).await;
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.retry_delay_ms),
            Duration::from_millis(config.total_timeout_ms),
            config.max_malformed,
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO, Duration::from_secs(60), 2)
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failure() {
        let calls = AtomicUsize::new(0);
        let result = fast_policy(3)
            .retry("op", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(AttemptError::Transient(anyhow::anyhow!("boom")))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = fast_policy(3)
            .retry("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AttemptError::Transient(anyhow::anyhow!("down")))
            })
            .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_two_malformed_responses_abandon_early() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = fast_policy(5)
            .retry("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AttemptError::Malformed("not json".to_string()))
            })
            .await;

        assert!(matches!(result, Err(RetryError::Malformed { count: 2 })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_failure_resets_malformed_streak() {
        let calls = AtomicUsize::new(0);
        let result = fast_policy(5)
            .retry("op", || async {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(AttemptError::Malformed("x".to_string())),
                    1 => Err(AttemptError::Transient(anyhow::anyhow!("blip"))),
                    2 => Err(AttemptError::Malformed("y".to_string())),
                    _ => Ok("done"),
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_zero_budget_times_out() {
        let policy = RetryPolicy::new(3, Duration::from_millis(20), Duration::from_millis(5), 2);
        let result: Result<(), _> = policy
            .retry("op", || async { Err(AttemptError::Transient(anyhow::anyhow!("slow"))) })
            .await;

        assert!(matches!(result, Err(RetryError::TimedOut { attempts: 1, .. })));
    }
}
