use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Bounded exponential backoff for transient infrastructure failures.
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Run `operation` up to `max_attempts` times, doubling the delay between
/// attempts. Returns the first success or the last error.
pub async fn with_backoff<F, Fut, T, E>(config: &BackoffConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if attempt >= config.max_attempts => {
                tracing::error!(attempt, error = %error, "giving up after final attempt");
                return Err(error);
            }
            Err(error) => {
                tracing::warn!(
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, backing off"
                );
                sleep(delay).await;
                delay = (delay * 2).min(config.max_delay);
            }
        }
    }
}
