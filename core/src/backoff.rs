use backoff::backoff::Backoff;
use backoff::exponential::ExponentialBackoff;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// What to do after a failed attempt that still has attempts left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// Sleep for the next backoff interval before retrying.
    Backoff,
    /// Retry right away without consuming a backoff interval.
    Immediately,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    /// Delays slept between consecutive attempts when every failure backs off.
    pub fn delays(&self) -> Vec<Duration> {
        let mut backoff = create_backoff(self.base_delay);
        (1..self.max_attempts)
            .filter_map(|_| backoff.next_backoff())
            .collect()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4, 500)
    }
}

/// Deterministic doubling backoff: base, 2*base, 4*base, ...
pub fn create_backoff(base_delay: Duration) -> ExponentialBackoff<backoff::SystemClock> {
    ExponentialBackoff {
        current_interval: base_delay,
        initial_interval: base_delay,
        randomization_factor: 0.0,
        multiplier: 2.0,
        max_interval: Duration::from_secs(60),
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    }
}

/// Runs `operation` until it succeeds or `policy.max_attempts` attempts were made.
///
/// `operation` receives the 1-based attempt number. `classify` decides how the
/// next attempt is scheduled after a failure. The last error is returned
/// unchanged once attempts are exhausted.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
    mut classify: C,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: FnMut(&E) -> Retry,
    E: std::fmt::Display,
{
    let mut backoff = create_backoff(policy.base_delay);
    let mut attempts = 0;

    loop {
        attempts += 1;
        metrics::counter!("collector_retry_attempts_total").increment(1);

        match operation(attempts).await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        operation = operation_name,
                        attempts,
                        "Operation succeeded after retries"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if attempts >= policy.max_attempts {
                    warn!(
                        operation = operation_name,
                        attempts,
                        error = %e,
                        "Operation failed after max attempts"
                    );
                    return Err(e);
                }

                match classify(&e) {
                    Retry::Immediately => {
                        warn!(
                            operation = operation_name,
                            attempt = attempts,
                            error = %e,
                            "Operation failed, retrying immediately"
                        );
                    }
                    Retry::Backoff => {
                        let Some(duration) = backoff.next_backoff() else {
                            warn!(
                                operation = operation_name,
                                attempts,
                                error = %e,
                                "Backoff exhausted"
                            );
                            return Err(e);
                        };
                        warn!(
                            operation = operation_name,
                            attempt = attempts,
                            retry_after_ms = duration.as_millis(),
                            error = %e,
                            "Operation failed, retrying"
                        );
                        tokio::time::sleep(duration).await;
                    }
                }
            }
        }
    }
}
