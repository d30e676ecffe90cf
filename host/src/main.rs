mod actuator;
mod adaptation;
mod audio;
mod catalog;
mod colorspace;
mod config;
mod delta_e;
mod error;
mod extractor;
mod image_processing;
mod link;
mod normalizer;
mod palette;
mod pipeline;
mod runner;
mod smoothing;
mod snapshot;
mod source;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tokio::sync::{mpsc, watch};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::audio::ChannelToneSink;
use crate::catalog::ColorCatalog;
use crate::config::{ActuatorConfig, Config, Mode};
use crate::error::AppError;
use crate::link::{ActuatorPort, SerialLink};
use crate::normalizer::Gains;
use crate::pipeline::{FrameReport, Pipeline, Settings, SettingsUpdate};
use crate::runner::LoopHandle;
use crate::snapshot::SnapshotStore;
use crate::source::ImageSequenceSource;

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    snapshot: Arc<SnapshotStore>,
    control: LoopHandle,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Chromalight Host API",
        description = "Color detection status and control for the chromalight lamp host",
        version = "0.1.0"
    ),
    tags(
        (name = "Detection", description = "Latest detection results"),
        (name = "Control", description = "Calibration and runtime settings")
    ),
    paths(
        health,
        get_status,
        calibrate,
        reset_calibration,
        get_settings,
        update_settings
    ),
    components(schemas(FrameReport, Gains, Settings, SettingsUpdate, Mode))
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let config = Config::load()?;

    let source = ImageSequenceSource::open(&config.source.path).await?;
    let port = open_actuator(&config.actuator).await;

    // Tones go to a detached player over a bounded queue
    let (tone_tx, tone_rx) = mpsc::channel(config.audio.queue_depth.max(1));
    let player = audio::spawn_player(tone_rx);

    let pipeline = Pipeline::new(
        &config,
        ColorCatalog::builtin(),
        port,
        Box::new(ChannelToneSink::new(tone_tx)),
    );

    let snapshot = Arc::new(SnapshotStore::new());
    let (control, commands) = runner::control_channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    // Ctrl-C stops the loop and the server
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, shutting down");
                shutdown_tx.send_replace(true);
            }
        });
    }

    let frame_loop = {
        let snapshot = snapshot.clone();
        let shutdown_tx = shutdown_tx.clone();
        let frame_interval = Duration::from_millis(config.source.frame_interval_ms);
        let stop = wait_for_shutdown(shutdown_rx.clone());
        tokio::spawn(async move {
            let result = runner::run(
                pipeline,
                Box::new(source),
                commands,
                snapshot,
                frame_interval,
                stop,
            )
            .await;
            // A dead loop takes the server down with it
            shutdown_tx.send_replace(true);
            result
        })
    };

    let state = AppState { snapshot, control };

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .route("/status", get(get_status))
        .route("/calibrate", post(calibrate).delete(reset_calibration))
        .route("/settings", get(get_settings).put(update_settings))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .route("/openapi.json", get(openapi_json))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.server.port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
        .await?;

    let result = frame_loop
        .await
        .map_err(|e| AppError::FrameSource(format!("frame loop panicked: {}", e)))?;
    player.abort();
    result
}

/// Resolves once shutdown has been requested
async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    // An error means the sender is gone, which is also a shutdown
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Open the serial link if one is configured
///
/// A port that fails to open is logged and the host runs without an actuator.
async fn open_actuator(config: &ActuatorConfig) -> Option<Box<dyn ActuatorPort>> {
    let path = config.port.as_deref()?;
    let timeout = Duration::from_millis(config.write_timeout_ms);

    match SerialLink::open(path, config.baud_rate, timeout) {
        Ok(link) => {
            // The controller resets when the port opens
            tracing::info!("Waiting {} ms for the controller to reset", config.reset_delay_ms);
            tokio::time::sleep(Duration::from_millis(config.reset_delay_ms)).await;
            Some(Box::new(link) as Box<dyn ActuatorPort>)
        }
        Err(e) => {
            tracing::warn!("{}; running without actuator", e);
            None
        }
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = String)
    )
)]
async fn health() -> &'static str {
    "ok"
}

/// Get OpenAPI JSON specification
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Latest frame report
///
/// Returns the most recent detection result, if one was produced in the last few
/// seconds.
#[utoipa::path(
    get,
    path = "/status",
    tag = "Detection",
    responses(
        (status = 200, description = "Latest frame report", body = FrameReport),
        (status = 404, description = "No recent frame")
    )
)]
async fn get_status(State(state): State<AppState>) -> Result<Json<FrameReport>, AppError> {
    state.snapshot.get().await.map(Json).ok_or(AppError::NoFrame)
}

/// Calibrate white balance
///
/// Point the camera at a white reference first. Gains are computed from the center
/// region of the most recent frame.
#[utoipa::path(
    post,
    path = "/calibrate",
    tag = "Control",
    responses(
        (status = 200, description = "New white-balance gains", body = Gains),
        (status = 404, description = "No frame processed yet"),
        (status = 503, description = "Frame loop is not running")
    )
)]
async fn calibrate(State(state): State<AppState>) -> Result<Json<Gains>, AppError> {
    let gains = state.control.calibrate().await?;
    Ok(Json(gains))
}

/// Clear white-balance calibration
#[utoipa::path(
    delete,
    path = "/calibrate",
    tag = "Control",
    responses(
        (status = 200, description = "Identity gains", body = Gains),
        (status = 503, description = "Frame loop is not running")
    )
)]
async fn reset_calibration(State(state): State<AppState>) -> Result<Json<Gains>, AppError> {
    let gains = state.control.reset_calibration().await?;
    Ok(Json(gains))
}

/// Current runtime settings
#[utoipa::path(
    get,
    path = "/settings",
    tag = "Control",
    responses(
        (status = 200, description = "Current settings", body = Settings),
        (status = 503, description = "Frame loop is not running")
    )
)]
async fn get_settings(State(state): State<AppState>) -> Result<Json<Settings>, AppError> {
    Ok(Json(state.control.settings().await?))
}

/// Change runtime settings
///
/// Fields left out of the body keep their current value.
#[utoipa::path(
    put,
    path = "/settings",
    tag = "Control",
    request_body = SettingsUpdate,
    responses(
        (status = 200, description = "Updated settings", body = Settings),
        (status = 400, description = "Invalid setting"),
        (status = 503, description = "Frame loop is not running")
    )
)]
async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<Settings>, AppError> {
    tracing::info!("Settings update: {:?}", update);
    Ok(Json(state.control.update_settings(update).await?))
}
