use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Tracks consecutive failures against one dependency and fails fast while it
// is known to be down.
//
// Closed -> Open after `failure_threshold` consecutive failures.
// Open   -> HalfOpen once `cooldown` has elapsed; a single probe is let
//           through. Probe success closes the circuit, probe failure reopens
//           it with a fresh cooldown.
//
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Clone, Debug)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub enum BreakerError<E> {
    /// Circuit is open; the call was never attempted.
    Open,
    Inner(E),
}

impl<E: std::fmt::Display> std::fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerError::Open => write!(f, "circuit open"),
            BreakerError::Inner(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::error::Error> std::error::Error for BreakerError<E> {}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

pub struct Breaker {
    inner: Mutex<Inner>,
    config: BreakerConfig,
}

impl Breaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
            config,
        }
    }

    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        {
            let mut inner = self.inner.lock().await;
            if inner.state == BreakerState::Open {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed < self.config.cooldown {
                    return Err(BreakerError::Open);
                }
                tracing::info!("circuit half-open, letting one probe through");
                inner.state = BreakerState::HalfOpen;
            }
        }

        match operation.await {
            Ok(value) => {
                let mut inner = self.inner.lock().await;
                if inner.state != BreakerState::Closed {
                    tracing::info!("circuit closed");
                }
                inner.state = BreakerState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                Ok(value)
            }
            Err(error) => {
                let mut inner = self.inner.lock().await;
                inner.consecutive_failures += 1;
                let trip = inner.state == BreakerState::HalfOpen
                    || inner.consecutive_failures >= self.config.failure_threshold;
                if trip {
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "circuit opened"
                    );
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
                Err(BreakerError::Inner(error))
            }
        }
    }

    pub async fn state(&self) -> BreakerState {
        self.inner.lock().await.state
    }
}
