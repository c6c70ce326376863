use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_relay::config::Config;
use order_relay::dispatch::{Dispatcher, DispatcherConfig, JsonHandler};
use order_relay::gateway::HttpOrderGateway;
use order_relay::handlers::{OrderCreatedHandler, StatusReconciler};
use order_relay::messaging::{KafkaQueueSource, OrderCreated, OrderStatusChanged};
use order_relay::{cache::RedisStatusCache, store::MySqlOrderStore};

// Consumer-side entry point: binds the created-event queue and the status
// stream and runs them until shutdown. The synchronous intake path lives in
// the library and is embedded by the serving layer.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_relay=debug")),
        )
        .init();

    let cfg = Config::from_env()?;
    tracing::info!("starting order-relay workers");

    let pool = MySqlPoolOptions::new()
        .max_connections(16)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    let redis_client = redis::Client::open(cfg.redis_url.as_str())?;
    let redis_conn = redis_client.get_multiplexed_async_connection().await?;

    let store = Arc::new(MySqlOrderStore::new(pool, cfg.store_timeout));
    let cache = Arc::new(RedisStatusCache::new(
        redis_conn,
        cfg.cache_ttl,
        cfg.redis_timeout,
    ));
    let gateway = Arc::new(HttpOrderGateway::new(
        cfg.downstream_url.clone(),
        cfg.downstream_timeout,
    )?);

    let mut dispatcher = Dispatcher::new(DispatcherConfig {
        prefetch: cfg.prefetch,
        handler_timeout: cfg.handler_timeout,
        requeue_on_error: cfg.requeue_on_error,
    });

    dispatcher.bind(
        cfg.created_topic.clone(),
        Box::new(KafkaQueueSource::new(
            &cfg.kafka_brokers,
            &cfg.consumer_group,
            &cfg.created_topic,
        )?),
        Arc::new(JsonHandler::<OrderCreated, _>::new(OrderCreatedHandler::new(
            gateway,
        ))),
    );

    dispatcher.bind(
        cfg.status_topic.clone(),
        Box::new(KafkaQueueSource::new(
            &cfg.kafka_brokers,
            &cfg.consumer_group,
            &cfg.status_topic,
        )?),
        Arc::new(JsonHandler::<OrderStatusChanged, _>::new(
            StatusReconciler::new(store, cache),
        )),
    );

    let handle = dispatcher.start();
    tracing::info!("consumers running, waiting for shutdown signal");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, stopping consumers");
    handle.shutdown().await;
    tracing::info!("order-relay stopped");

    Ok(())
}
