use airlane_api::{app, AppState};
use airlane_core::events::EventPublisher;
use airlane_geo::{CityCoordinateCache, GeocoderClient, NominatimGeocoder, RetryPolicy, RouteResolver};
use airlane_order::OrderAllocator;
use airlane_store::{
    app_config::Config, DbClient, EventProducer, PgAirportRepository, PgCapacityLedger, PgOrderStore,
    PgRouteRepository, RedisClient,
};
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "airlane_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Airlane API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    // Redis coordinate cache
    let redis = RedisClient::new(&config.redis.url, config.redis.coordinate_ttl_seconds)
        .await
        .context("Failed to create Redis client")?;
    if let Err(e) = redis.ping().await {
        tracing::warn!("Redis not reachable, coordinate cache will degrade: {}", e);
    }

    // Kafka
    let events: Option<Arc<dyn EventPublisher>> = if config.kafka.enabled {
        let producer = EventProducer::new(&config.kafka.brokers).context("Failed to create Kafka producer")?;
        Some(Arc::new(producer))
    } else {
        tracing::info!("Kafka disabled, domain events will not be published");
        None
    };

    let geocoder = NominatimGeocoder::new(&config.geocoder.base_url, &config.geocoder.user_agent)
        .context("Failed to build geocoder HTTP client")?;
    let policy = RetryPolicy {
        max_attempts: config.geocoder.max_attempts as usize,
        initial_delay: Duration::from_millis(config.geocoder.initial_backoff_ms),
        max_delay: Duration::from_millis(config.geocoder.max_backoff_ms),
        ..RetryPolicy::default()
    };
    let coordinates = CityCoordinateCache::new(GeocoderClient::new(
        Arc::new(geocoder),
        config.geocoder.timeout(),
        policy,
    ))
    .with_shared_cache(Arc::new(redis));

    let ledger = PgCapacityLedger::new(db.pool.clone(), config.ledger.lock_wait(), config.ledger.hold_ttl());
    let mut allocator = OrderAllocator::new(Arc::new(ledger), Arc::new(PgOrderStore::new(db.pool.clone())));
    let mut resolver = RouteResolver::new(
        Arc::new(PgAirportRepository::new(db.pool.clone())),
        Arc::new(PgRouteRepository::new(db.pool.clone())),
        Arc::new(coordinates),
    );
    if let Some(events) = events {
        allocator = allocator.with_events(events.clone());
        resolver = resolver.with_events(events);
    }

    let app_state = AppState {
        allocator: Arc::new(allocator),
        routes: Arc::new(resolver),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
