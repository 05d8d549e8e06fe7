use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vrtrust_core::trust::{NoTrustScores, TrustScoreProvider};
use vrtrust_db::ledger::{DeliveryLedger, MemoryLedger, PgLedger};
use vrtrust_db::trust::PgTrustScores;
use vrtrust_events::EventForwarder;

use vrtrust_api::config::{delivery_config_from_env, InboundSecrets, ServerConfig};
use vrtrust_api::router::build_app_router;
use vrtrust_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env();

    // --- Tracing ---
    let (json_layer, pretty_layer) = if config.log_json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "vrtrust_api=debug,vrtrust_events=debug,vrtrust_db=info,tower_http=debug".into()
            }),
        )
        .with(json_layer)
        .with(pretty_layer)
        .init();

    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let delivery_config = delivery_config_from_env();
    tracing::info!(
        max_retries = delivery_config.max_retries,
        timeout_secs = delivery_config.request_timeout.as_secs(),
        sweep_secs = delivery_config.sweep_interval.as_secs(),
        "Loaded delivery configuration"
    );

    let inbound_secrets = InboundSecrets::from_env();
    tracing::info!(sources = inbound_secrets.len(), "Loaded inbound webhook secrets");

    // --- Ledger ---
    let (ledger, trust) = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = vrtrust_db::create_pool(&database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            vrtrust_db::health_check(&pool)
                .await
                .expect("Database health check failed");
            tracing::info!("Database health check passed");

            vrtrust_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            (
                Arc::new(PgLedger::new(pool.clone())) as Arc<dyn DeliveryLedger>,
                Arc::new(PgTrustScores::new(pool)) as Arc<dyn TrustScoreProvider>,
            )
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using the in-memory delivery ledger");
            (
                Arc::new(MemoryLedger::new()) as Arc<dyn DeliveryLedger>,
                Arc::new(NoTrustScores) as Arc<dyn TrustScoreProvider>,
            )
        }
    };

    // --- App state ---
    let state = AppState::build(
        ledger,
        trust,
        delivery_config,
        config.clone(),
        inbound_secrets,
    )
    .expect("Failed to build delivery engine");

    // --- Background services ---
    let sweeper = state.pipeline.engine().start_sweeper();
    tracing::info!("Retry sweeper started");

    let event_bus = Arc::clone(&state.event_bus);
    let forwarder_handle = tokio::spawn(EventForwarder::run(
        Arc::clone(&state.pipeline),
        event_bus.subscribe(),
    ));
    tracing::info!("Event forwarder started");

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let drain = config.shutdown_timeout();

    if tokio::time::timeout(drain, sweeper.stop()).await.is_err() {
        tracing::warn!("Retry sweeper did not stop within the shutdown timeout");
    }
    tracing::info!("Retry sweeper stopped");

    // Dropping the last bus sender closes the channel and ends the forwarder.
    drop(event_bus);
    let _ = tokio::time::timeout(drain, forwarder_handle).await;
    tracing::info!("Event forwarder stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
