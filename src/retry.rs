use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use crate::{PreflightConfig, TaskError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Re-attempts after the initial one.
    pub retry_count: u32,
    /// Window granted to each attempt.
    pub timeout: Duration,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &PreflightConfig) -> Self {
        Self {
            retry_count: config.retry_count,
            timeout: config.task_timeout,
            delay: config.retry_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PreflightConfig::default())
    }
}

#[derive(Error, Debug)]
pub enum RetryError {
    #[error("failed after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: TaskError },
    #[error("cancelled")]
    Cancelled,
}

pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation` until it succeeds or the attempt budget is spent.
    ///
    /// Every attempt gets a fresh child token of `ctx` which is cancelled once
    /// the policy timeout elapses; a timed-out attempt counts as a failure.
    /// `on_retry` is called with the failed attempt number before each
    /// re-attempt. Cancelling `ctx` ends the loop with [`RetryError::Cancelled`].
    /// On success returns the value and the number of attempts used.
    pub async fn execute_with_retry<F, Fut, T, R>(
        &self,
        ctx: &CancellationToken,
        mut operation: F,
        mut on_retry: R,
    ) -> Result<(T, u32), RetryError>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, TaskError>>,
        R: FnMut(u32, &TaskError),
    {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            if ctx.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            let error = match self.attempt(ctx, &mut operation).await? {
                Ok(value) => return Ok((value, attempt)),
                Err(e) => e,
            };

            if attempt >= max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }

            on_retry(attempt, &error);

            if !self.policy.delay.is_zero() {
                tokio::select! {
                    _ = ctx.cancelled() => return Err(RetryError::Cancelled),
                    _ = sleep(self.policy.delay) => {}
                }
            }
        }
    }

    async fn attempt<F, Fut, T>(
        &self,
        ctx: &CancellationToken,
        operation: &mut F,
    ) -> Result<Result<T, TaskError>, RetryError>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, TaskError>>,
    {
        let token = ctx.child_token();
        let window = self.policy.timeout;

        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(RetryError::Cancelled),
            outcome = timeout(window, operation(token.clone())) => match outcome {
                Ok(result) => Ok(result),
                Err(_) => {
                    token.cancel();
                    Ok(Err(TaskError::Timeout(window)))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(retry_count: u32, timeout: Duration) -> RetryPolicy {
        RetryPolicy {
            retry_count,
            timeout,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let executor = RetryExecutor::new(policy(3, Duration::from_secs(1)));
        let ctx = CancellationToken::new();

        let (value, attempts) = executor
            .execute_with_retry(&ctx, |_token| async { Ok(7) }, |_, _| {})
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_always_failing_uses_all_attempts() {
        let executor = RetryExecutor::new(policy(2, Duration::from_secs(1)));
        let ctx = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let mut retries = Vec::new();

        let result = executor
            .execute_with_retry(
                &ctx,
                |_token| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(TaskError::failed("down"))
                    }
                },
                |attempt, _| retries.push(attempt),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries, vec![1, 2]);
        match result {
            Err(RetryError::Exhausted { attempts, last_error }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error.to_string(), "down");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_eventually_succeeds() {
        let executor = RetryExecutor::new(policy(3, Duration::from_secs(1)));
        let ctx = CancellationToken::new();
        let failures_left = Arc::new(AtomicU32::new(2));

        let (_, attempts) = executor
            .execute_with_retry(
                &ctx,
                |_token| {
                    let failures_left = failures_left.clone();
                    async move {
                        if failures_left.load(Ordering::SeqCst) > 0 {
                            failures_left.fetch_sub(1, Ordering::SeqCst);
                            Err(TaskError::failed("not yet"))
                        } else {
                            Ok(())
                        }
                    }
                },
                |_, _| {},
            )
            .await
            .unwrap();

        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_timeout_cancels_attempt_token() {
        let executor = RetryExecutor::new(policy(0, Duration::from_millis(20)));
        let ctx = CancellationToken::new();
        let seen = Arc::new(std::sync::Mutex::new(None::<CancellationToken>));

        let result = executor
            .execute_with_retry(
                &ctx,
                |token| {
                    *seen.lock().unwrap() = Some(token.clone());
                    async move {
                        sleep(Duration::from_secs(30)).await;
                        Ok(())
                    }
                },
                |_, _| {},
            )
            .await;

        match result {
            Err(RetryError::Exhausted { attempts, last_error }) => {
                assert_eq!(attempts, 1);
                assert!(last_error.is_timeout());
            }
            other => panic!("expected timeout exhaustion, got {other:?}"),
        }
        assert!(seen.lock().unwrap().as_ref().unwrap().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_context_stops_before_attempt() {
        let executor = RetryExecutor::new(policy(5, Duration::from_secs(1)));
        let ctx = CancellationToken::new();
        ctx.cancel();

        let result = executor
            .execute_with_retry(&ctx, |_token| async { Ok(()) }, |_, _| {})
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_during_attempt_is_not_retried() {
        let executor = RetryExecutor::new(policy(5, Duration::from_secs(10)));
        let ctx = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let canceller = ctx.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = executor
            .execute_with_retry(
                &ctx,
                |token| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        token.cancelled().await;
                        Err::<(), _>(TaskError::failed("aborted"))
                    }
                },
                |_, _| {},
            )
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
