//! # Orbital Nexus Voice - Main Application Entry Point
//!
//! Backend for the Orbital Nexus voice agent. It sets up an Actix-web server with:
//!
//! - **`/ws/voice`**: browser socket driving the live voice link (microphone
//!   frames in, scheduled playback out)
//! - **`/api/v1/voice`**: voice link status, text turns and disconnect
//! - **`/api/v1/scan`**: "deep scan" planet image generation
//! - **`/api/v1/planets`**: planet catalog, selection briefings and narrated scans
//! - **`/api/v1/config`** and **`/health`**: runtime configuration and health
//!
//! ## Application Architecture:
//! - **audio**: PCM/base64 helpers, capture metering, gapless playback scheduling
//! - **voice**: the voice link session manager and its vendor seam
//! - **planets**: the selectable planet catalog
//! - **gemini**: Gemini Live and image generation adapters
//! - **bridge** / **websocket** / **protocol**: browser-owned audio devices
//! - **config**, **state**, **error**, **health**, **handlers**: the HTTP service

mod audio;
mod bridge;
mod config;
mod error;
mod gemini;
mod handlers;
mod health;
mod imaging;
mod planets;
mod protocol;
mod state;
mod voice;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use crate::config::AppConfig;
use crate::gemini::imaging::GeminiImageGenerator;
use crate::gemini::live::GeminiLiveConnector;
use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use crate::voice::VoiceLink;

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from defaults, `config.*` and environment variables
/// 2. **Sets up logging**
/// 3. **Builds the vendor adapters** and the shared voice link
/// 4. **Configures the HTTP server** with middleware and routes
/// 5. **Handles graceful shutdown**, closing any live session first
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing();

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting orbital-nexus-voice v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    if config.live.api_key.is_empty() {
        warn!("No API key configured; voice sessions and deep scans will fail");
    }

    let connector = GeminiLiveConnector::new(config.live.endpoint.clone(), config.live.api_key.clone())
        .with_handshake_timeout(Duration::from_secs(config.live.handshake_timeout_secs))
        .with_capacities(config.audio.outbound_queue_frames, config.audio.inbound_queue_chunks);
    let voice_link = Arc::new(VoiceLink::new(
        Arc::new(connector),
        config.live_setup(),
        config.link_options(),
    ));

    let image_generator = GeminiImageGenerator::new(
        config.imaging.endpoint.clone(),
        config.imaging.api_key.clone(),
        config.imaging.model.clone(),
    )
    .with_format(config.imaging.aspect_ratio.clone(), config.imaging.image_size.clone())
    .with_timeout(Duration::from_secs(config.imaging.timeout_secs));

    let app_state = AppState::new(config.clone(), voice_link.clone(), Arc::new(image_generator));
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config))
                    .route("/voice", web::get().to(handlers::voice_status))
                    .route("/voice/message", web::post().to(handlers::send_voice_message))
                    .route("/voice/disconnect", web::post().to(handlers::disconnect_voice))
                    .route("/scan", web::post().to(handlers::deep_scan))
                    .route("/planets", web::get().to(handlers::list_planets))
                    .route("/planets/{id}/select", web::post().to(handlers::select_planet))
                    .route("/planets/{id}/scan", web::post().to(handlers::scan_planet)),
            )
            .route("/ws/voice", web::get().to(websocket::voice_websocket))
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            voice_link.disconnect();
            server_handle.stop(true).await;
        }
    }

    voice_link.disconnect();
    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize tracing.
///
/// `RUST_LOG` controls the filter; the default is
/// `orbital_nexus_voice=debug,actix_web=info`.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orbital_nexus_voice=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolve on SIGTERM or SIGINT (Ctrl+C).
#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        _ => {
            warn!("Failed to install signal handlers, falling back to Ctrl+C");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received Ctrl+C");
}
