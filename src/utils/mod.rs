pub mod circuit_breaker;
pub mod deadline;
pub mod retry;

pub use circuit_breaker::{Breaker, BreakerConfig, BreakerError, BreakerState};
pub use deadline::bounded;
pub use retry::{with_backoff, BackoffConfig};
