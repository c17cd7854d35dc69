use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Indicates whether an error should be retried or treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// Result of running an operation under the retry policy.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was considered fatal and should bubble up immediately.
    Fatal { error: E, attempts: usize },
    /// The error was retryable, but the configured attempts were exhausted.
    AttemptsExceeded { error: E, attempts: usize },
    /// Cancellation arrived while waiting to retry.
    Cancelled { error: E, attempts: usize },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> usize {
        match self {
            RetryError::Fatal { attempts, .. }
            | RetryError::AttemptsExceeded { attempts, .. }
            | RetryError::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn into_error(self) -> E {
        match self {
            RetryError::Fatal { error, .. }
            | RetryError::AttemptsExceeded { error, .. }
            | RetryError::Cancelled { error, .. } => error,
        }
    }
}

/// A successful result together with the number of attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: usize,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: if max_delay.is_zero() {
                base_delay
            } else {
                max_delay
            },
        }
    }

    /// Policy without waits between attempts.
    pub fn immediate(max_attempts: usize) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Executes the operation with the configured retry policy.
    pub async fn run<F, Fut, T, E, Classifier>(
        &self,
        op: F,
        classify: Classifier,
    ) -> Result<Attempted<T>, RetryError<E>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Classifier: Fn(&E) -> RetryDisposition,
    {
        self.run_until_cancelled(&CancellationToken::new(), op, classify, |_, _, _| {})
            .await
    }

    /// Like [`RetryPolicy::run`], but stops waiting for the next attempt as soon
    /// as `cancel` fires. `on_retry` sees the 1-based attempt that failed, its
    /// error and the delay before the next attempt. `op` receives the 1-based
    /// attempt number.
    pub async fn run_until_cancelled<F, Fut, T, E, Classifier, OnRetry>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
        classify: Classifier,
        mut on_retry: OnRetry,
    ) -> Result<Attempted<T>, RetryError<E>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Classifier: Fn(&E) -> RetryDisposition,
        OnRetry: FnMut(usize, &E, Duration),
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    });
                }
                Err(error) => match classify(&error) {
                    RetryDisposition::Stop => {
                        return Err(RetryError::Fatal {
                            error,
                            attempts: attempt,
                        });
                    }
                    RetryDisposition::Retry => {
                        if attempt >= self.max_attempts {
                            return Err(RetryError::AttemptsExceeded {
                                error,
                                attempts: attempt,
                            });
                        }

                        let delay = self.backoff_delay(attempt - 1);
                        on_retry(attempt, &error, delay);

                        tokio::select! {
                            _ = cancel.cancelled() => {
                                return Err(RetryError::Cancelled { error, attempts: attempt });
                            }
                            _ = sleep(delay) => {}
                        }
                    }
                },
            }
        }
    }

    /// `base * 2^retry`, capped at `max_delay`. `retry` is 0 for the wait
    /// after the first failed attempt.
    pub fn backoff_delay(&self, retry: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::from_millis(0);
        }

        let factor = 1u128 << retry.min(16);
        let base_ms = self.base_delay.as_millis();
        let delay_ms = base_ms.saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }
}
