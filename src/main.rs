mod api;
mod config;
mod data;
mod error;
mod hub;
mod websocket;

use std::time::Duration;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use log::{info, error};
use tower_http::cors::CorsLayer;

use crate::config::{Config, STATS_INTERVAL_SECS};
use crate::data::{PriceGenerator, QuoteBook, QuoteLoader};
use crate::hub::BroadcastHub;
use crate::websocket::WebSocketHandler;
use crate::api::{ApiState, create_api_router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger before parsing the rest of the config, so fallback warnings show
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(config::log_level_from_env()));

    // Load configuration
    let config = Config::from_env();

    config.log_config();

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e.into());
    }

    let quotes = QuoteLoader::load_from_json(&config.data_file)?;
    let shutdown = CancellationToken::new();

    // Generator -> hub event channel; bounded, so a lagging hub slows the tick loops
    let (events_tx, events_rx) = mpsc::channel(config.event_channel_size);

    let hub = Arc::new(BroadcastHub::new(
        QuoteBook::new(&quotes),
        config.delivery_timeout(),
        shutdown.child_token(),
    ));
    let generator = PriceGenerator::new(shutdown.child_token());
    generator.start(quotes, events_tx);

    let hub_task = {
        let hub = hub.clone();
        tokio::spawn(async move { hub.run(events_rx).await })
    };

    start_background_tasks(hub.clone(), shutdown.clone());

    // Start API server
    let api_router = create_api_router(ApiState { hub: hub.clone() })
        .layer(CorsLayer::permissive()); // Browser clients read /api/stocks directly

    let api_listener = TcpListener::bind(&config.api_bind_address).await?;
    info!("🌐 HTTP API server running at http://{}", config.api_bind_address);

    let api_server = axum::serve(api_listener, api_router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    // Start WebSocket server
    let ws_listener = TcpListener::bind(&config.bind_address).await?;
    info!("🚀 WebSocket server running at ws://{}", config.bind_address);
    info!("🔗 Price stream: ws://{}/ws or ws://{}/api/ws", config.bind_address, config.bind_address);

    let websocket_server = {
        let hub = hub.clone();
        let shutdown = shutdown.clone();
        async move {
            loop {
                let (stream, addr) = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    accepted = ws_listener.accept() => match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("Failed to accept WebSocket connection: {}", e);
                            continue;
                        }
                    }
                };

                let handler = WebSocketHandler::new(hub.clone(), addr.to_string());
                tokio::spawn(handler.handle_connection(stream, shutdown.child_token()));
            }
        }
    };

    info!("🎯 Starting WebSocket and HTTP API servers...");
    tokio::select! {
        result = api_server => {
            if let Err(e) = result {
                error!("API server stopped: {:?}", e);
            }
        }
        _ = websocket_server => {
            info!("WebSocket server stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Shutdown signal received");
        }
    }

    shutdown.cancel();
    generator.join().await;
    if let Err(e) = hub_task.await {
        error!("Broadcast hub task failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

fn start_background_tasks(hub: Arc<BroadcastHub>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut interval_timer = interval(Duration::from_secs(STATS_INTERVAL_SECS));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval_timer.tick() => {}
            }
            info!("Stats - Symbols: {}, Subscribers: {}", hub.book().len(), hub.subscriber_count());
        }
    });

    info!("📈 Started stats monitoring task (every {} seconds)", STATS_INTERVAL_SECS);
}
