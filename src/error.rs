use thiserror::Error;

// ============================================================================
// Pipeline Error Taxonomy
// ============================================================================
//
// Four caller-visible classes:
// - Validation: bad input, no side effects, safe to echo back
// - Duplicate:  idempotency key held by a concurrent in-flight attempt
// - NotFound:   lookup miss
// - Transient:  lock store / order store / cache / broker unavailable or
//               timed out; retryable
//
// ============================================================================

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("idempotency key is held by a concurrent attempt")]
    Duplicate,

    #[error("order not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Transient(#[from] anyhow::Error),
}

impl RelayError {
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        RelayError::Transient(err.into())
    }

    /// Whether the error is worth retrying at all.
    pub fn is_transient(&self) -> bool {
        matches!(self, RelayError::Transient(_))
    }
}

impl From<sqlx::Error> for RelayError {
    fn from(err: sqlx::Error) -> Self {
        RelayError::Transient(anyhow::Error::new(err).context("order store"))
    }
}

impl From<redis::RedisError> for RelayError {
    fn from(err: redis::RedisError) -> Self {
        RelayError::Transient(anyhow::Error::new(err).context("redis"))
    }
}

impl From<rdkafka::error::KafkaError> for RelayError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        RelayError::Transient(anyhow::Error::new(err).context("kafka"))
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Transient(anyhow::Error::new(err).context("downstream http"))
    }
}
