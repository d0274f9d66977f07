use anyhow::Context;
use busline_api::{app, worker::BackgroundServices, AppState, Repositories};
use busline_core::{EventPublisher, SystemClock};
use busline_store::{DbClient, EventProducer, LogPublisher, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "busline_api=debug,busline_booking=info,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = busline_store::app_config::Config::load().context("Failed to load config")?;
    tracing::info!("Starting Busline API on port {}", config.server.port);

    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let rules = db
        .fetch_booking_rules(config.booking_rules.clone())
        .await
        .context("Failed to load business rules")?;

    let publisher: Arc<dyn EventPublisher> = match &config.kafka {
        Some(kafka) => Arc::new(
            EventProducer::new(&kafka.brokers).context("Failed to create Kafka producer")?,
        ),
        None => {
            tracing::info!("No Kafka brokers configured, booking events go to the log");
            Arc::new(LogPublisher)
        }
    };
    let notifications = BackgroundServices::notification_queue(publisher, &rules);

    let mut state = AppState::new(
        Repositories::postgres(db.pool.clone()),
        Arc::new(SystemClock),
        notifications.clone(),
        rules,
    );
    if let Some(redis) = &config.redis {
        let client = RedisClient::new(&redis.url)
            .await
            .context("Failed to connect to Redis")?;
        state = state.with_rate_limit(Arc::new(client), redis.requests_per_minute);
    }

    let background = BackgroundServices::start(&state, notifications);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    background.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
