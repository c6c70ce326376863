use std::time::Duration;

use crate::error::RelayError;

/// Service configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// MySQL connection URL (env: DATABASE_URL, required)
    pub database_url: String,
    /// Redis connection URL (env: REDIS_URL)
    pub redis_url: String,
    /// Kafka bootstrap servers, comma-separated (env: KAFKA_BROKERS)
    pub kafka_brokers: String,
    /// Topic carrying order.created events (env: CREATED_TOPIC)
    pub created_topic: String,
    /// Topic carrying downstream status-changed events (env: STATUS_TOPIC)
    pub status_topic: String,
    /// Consumer group id shared by the worker fleet (env: CONSUMER_GROUP)
    pub consumer_group: String,
    /// Base URL of the downstream fulfillment service (env: DOWNSTREAM_URL)
    pub downstream_url: String,
    /// Per-call deadline for the downstream gateway (env: DOWNSTREAM_TIMEOUT_SECS)
    pub downstream_timeout: Duration,
    /// Idempotency lock lifetime (env: IDEM_LOCK_TTL_SECS)
    pub idem_lock_ttl: Duration,
    /// Idempotency key -> order id mapping lifetime (env: IDEM_MAP_TTL_SECS)
    pub idem_map_ttl: Duration,
    /// Status cache entry lifetime, zero disables expiry (env: CACHE_TTL_SECS)
    pub cache_ttl: Duration,
    /// Per-command deadline for Redis calls (env: REDIS_TIMEOUT_SECS)
    pub redis_timeout: Duration,
    /// Per-statement deadline for the order store (env: STORE_TIMEOUT_SECS)
    pub store_timeout: Duration,
    /// In-flight delivery limit across all queues (env: DISPATCH_PREFETCH)
    pub prefetch: usize,
    /// Deadline for one handler invocation (env: HANDLER_TIMEOUT_SECS)
    pub handler_timeout: Duration,
    /// Whether handler failures are requeued (env: REQUEUE_ON_ERROR)
    pub requeue_on_error: bool,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn secs_or(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Unlike the string/seconds helpers, an unparseable boolean is rejected
/// rather than defaulted: silently requeueing when the operator asked for
/// "no" inverts the failure policy.
fn bool_or(name: &str, default: bool) -> Result<bool, RelayError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => parse_bool(&raw).ok_or_else(|| {
            RelayError::Validation(format!("{name} must be true/false/1/0, got {raw:?}"))
        }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, RelayError> {
        let config = Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| {
                RelayError::Validation("DATABASE_URL must be set".into())
            })?,
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379/"),
            kafka_brokers: env_or("KAFKA_BROKERS", "127.0.0.1:9092"),
            created_topic: env_or("CREATED_TOPIC", "order.created"),
            status_topic: env_or("STATUS_TOPIC", "order.status-changed"),
            consumer_group: env_or("CONSUMER_GROUP", "order-relay"),
            downstream_url: env_or("DOWNSTREAM_URL", "http://127.0.0.1:8081"),
            downstream_timeout: secs_or("DOWNSTREAM_TIMEOUT_SECS", 8),
            idem_lock_ttl: secs_or("IDEM_LOCK_TTL_SECS", 30),
            idem_map_ttl: secs_or("IDEM_MAP_TTL_SECS", 86_400),
            cache_ttl: secs_or("CACHE_TTL_SECS", 600),
            redis_timeout: secs_or("REDIS_TIMEOUT_SECS", 3),
            store_timeout: secs_or("STORE_TIMEOUT_SECS", 5),
            prefetch: std::env::var("DISPATCH_PREFETCH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
            handler_timeout: secs_or("HANDLER_TIMEOUT_SECS", 10),
            requeue_on_error: bool_or("REQUEUE_ON_ERROR", true)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), RelayError> {
        if self.kafka_brokers.is_empty() {
            return Err(RelayError::Validation("KAFKA_BROKERS must not be empty".into()));
        }
        if self.created_topic.is_empty() || self.status_topic.is_empty() {
            return Err(RelayError::Validation("topic names must not be empty".into()));
        }
        if self.downstream_url.is_empty() {
            return Err(RelayError::Validation("DOWNSTREAM_URL must not be empty".into()));
        }
        if self.prefetch == 0 {
            return Err(RelayError::Validation("DISPATCH_PREFETCH must be positive".into()));
        }
        if self.redis_timeout.is_zero() || self.store_timeout.is_zero() {
            return Err(RelayError::Validation(
                "backend call timeouts must be positive".into(),
            ));
        }
        Ok(())
    }
}
