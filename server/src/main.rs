//! Chirp server binary.
//!
//! Wires Postgres, Redis and Redpanda into the full pipeline and serves
//! the HTTP API. The dispatcher, compactor and timeline consumer run as
//! background tasks and stop on the same shutdown signal as the server.

use anyhow::Context;
use chirp_core::id::IdGenerator;
use chirp_core::log::MessageLog;
use chirp_core::shard::ShardRouter;
use chirp_core::store::{Database, FollowStore, OutboxStore, PostStore, TimelineCache, UserStore};
use chirp_postgres::{PgDatabase, PgFollowStore, PgOutboxStore, PgPostStore, PgUserStore, ShardSet};
use chirp_redis::RedisTimelineCache;
use chirp_redpanda::RedpandaLog;
use chirp_server::config::AppConfig;
use chirp_server::consumer::LogConsumer;
use chirp_server::dispatch::{OutboxCompactor, OutboxDispatcher};
use chirp_server::materializer::TimelineMaterializer;
use chirp_server::metrics::{register_metrics, AppMetrics};
use chirp_server::service::{AdminService, FollowService, PostService, TimelineService};
use chirp_server::web::{build_router, AppState};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chirp_server=info,chirp_postgres=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Chirp server");
    let config = AppConfig::from_env();
    register_metrics();

    // Relational storage.
    let shards = ShardSet::connect(&config.postgres.urls, config.postgres.max_connections)
        .await
        .context("connecting to Postgres")?;
    shards.run_migrations().await.context("running migrations")?;
    let shard_router = ShardRouter::new(u32::try_from(config.postgres.urls.len()).unwrap_or(1));

    let database: Arc<dyn Database> = Arc::new(PgDatabase::new(shards.clone()));
    let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(shards.clone()));
    let posts: Arc<dyn PostStore> = Arc::new(PgPostStore::new(shards.clone()));
    let follows: Arc<dyn FollowStore> = Arc::new(PgFollowStore::new(shards.clone()));
    let outbox: Arc<dyn OutboxStore> = Arc::new(PgOutboxStore::new(shards));

    // Timeline cache.
    let cache: Arc<dyn TimelineCache> = Arc::new(
        RedisTimelineCache::connect(&config.redis.url, config.timeline.max_size)
            .await
            .context("connecting to Redis")?,
    );

    // Message log.
    let log: Arc<dyn MessageLog> = Arc::new(
        RedpandaLog::builder()
            .brokers(&config.kafka.brokers)
            .producer_acks("all")
            .build()
            .context("creating the Redpanda producer")?,
    );

    let ids = Arc::new(IdGenerator::new());
    let metrics = Arc::new(AppMetrics::new());

    // Services.
    let state = AppState {
        posts: Arc::new(PostService::new(
            Arc::clone(&database),
            Arc::clone(&posts),
            Arc::clone(&ids),
            Arc::clone(&metrics),
        )),
        follows: Arc::new(FollowService::new(
            Arc::clone(&database),
            Arc::clone(&follows),
            Arc::clone(&ids),
            Arc::clone(&metrics),
        )),
        timeline: Arc::new(TimelineService::new(
            Arc::clone(&cache),
            Arc::clone(&posts),
            Arc::clone(&follows),
            config.timeline.celebrity_follower_threshold,
            Arc::clone(&metrics),
        )),
        admin: Arc::new(AdminService::new(
            Arc::clone(&users),
            Arc::clone(&posts),
            Arc::clone(&follows),
            Arc::clone(&outbox),
            Arc::clone(&cache),
            Arc::clone(&metrics),
        )),
        users,
        shard_router,
        timeline_config: config.timeline.clone(),
    };

    // Background pipeline tasks.
    let (shutdown_tx, _) = broadcast::channel(1);

    let dispatcher = OutboxDispatcher::new(
        Arc::clone(&outbox),
        log.clone(),
        config.kafka.topic.clone(),
        config.outbox.poll_interval,
        config.outbox.batch_size,
        Arc::clone(&metrics),
    );
    let dispatcher_task = dispatcher.spawn(shutdown_tx.subscribe());

    let compactor = OutboxCompactor::new(Arc::clone(&outbox), config.outbox.retention);
    let compactor_task = compactor.spawn(shutdown_tx.subscribe());

    let materializer = Arc::new(TimelineMaterializer::new(
        Arc::clone(&cache),
        Arc::clone(&posts),
        Arc::clone(&follows),
        config.timeline.celebrity_follower_threshold,
        config.timeline.max_size,
        Arc::clone(&metrics),
    ));
    let consumer = LogConsumer::new(
        log,
        materializer,
        shard_router,
        config.kafka.topic.clone(),
        config.kafka.consumer_group.clone(),
    );
    let consumer_task = consumer.spawn(shutdown_tx.subscribe());

    // HTTP server.
    let router = build_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("serving HTTP")?;

    // Stop the pipeline tasks and wait for them.
    let _ = shutdown_tx.send(());
    let _ = tokio::join!(dispatcher_task, compactor_task, consumer_task);
    info!("Chirp server stopped");

    Ok(())
}
