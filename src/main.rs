mod config;
mod help;
mod intent;
mod iot;
mod mqtt;
mod settings;
mod shadow;
mod signature;
mod sigv4;
mod twiml;
mod webhook;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Context;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use config::Config;
use iot::{EventPublisher, IotDataClient};
use mqtt::MqttPublisher;
use webhook::AppState;

/// SMS webhooks are a handful of short form fields.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (development); in production the service
    // manager provides the environment.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .without_time()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_sms=info,tower_http=info".into()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);
    info!(
        thing = %config.thing_name,
        region = %config.aws.region,
        endpoint = %config.aws.endpoint,
        "Configuration loaded"
    );

    let iot = Arc::new(IotDataClient::new(
        config.aws.clone(),
        config.thing_name.clone(),
        config.topic.clone(),
    ));

    let publisher: Arc<dyn EventPublisher> = match &config.mqtt {
        Some(mqtt) => {
            info!(host = %mqtt.host, port = mqtt.port, topic = %config.topic, "Passthrough via MQTT");
            Arc::new(MqttPublisher::spawn(mqtt, config.topic.clone()))
        }
        None => {
            info!(topic = %config.topic, "Passthrough via IoT data plane");
            iot.clone()
        }
    };

    let state = AppState {
        config: config.clone(),
        shadow: iot,
        publisher,
    };

    let app = webhook::router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!(
        "SMS webhook listening on {}{}",
        config.listen_addr, config.webhook_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
