use solar_relay::{
    config::Config,
    influx::PowerSink,
    model::PowerModel,
    relay::Relay,
    ws::{app, AppState, Hub},
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "solar_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting solar-relay service");

    // Load configuration
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());

    let config = Config::load(&config_path)?;
    info!("Configuration loaded from: {}", config_path);

    // The hub is the one shared mutable structure; everything else holds
    // its own state
    let hub = Arc::new(Hub::new());

    // Start the buffered InfluxDB writer
    let sink = PowerSink::spawn(reqwest::Client::new(), config.influx.clone());
    info!(
        url = %config.influx.url,
        bucket = %config.influx.bucket,
        "InfluxDB sink started"
    );

    // Load the prediction model in the background; the relay runs without
    // predictions until (and unless) the load succeeds
    let model = PowerModel::new();
    {
        let model = model.clone();
        let path = config.model.path.clone();
        tokio::spawn(async move {
            model.load(&path).await;
        });
    }

    // Spawn the relay task that owns the MQTT subscription
    let relay = Relay::new(
        config.mqtt.clone(),
        config.relay.clone(),
        Arc::clone(&hub),
        sink,
        model,
    );
    info!(
        broker = %format!("{}:{}", config.mqtt.host, config.mqtt.port),
        topic = %config.mqtt.topic,
        "starting telemetry relay"
    );
    tokio::spawn(async move {
        if let Err(e) = relay.run().await {
            error!("relay error: {}", e);
        }
    });

    // Build Axum application
    let state = Arc::new(AppState::new(hub));
    let router = app(state);

    // Start HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Server ready to accept WebSocket connections");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
