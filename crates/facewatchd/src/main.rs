use anyhow::Result;
use facewatch_core::history::RecognitionHistory;
use facewatch_core::source::SourceError;
use facewatch_hw::Camera;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod error;
mod http;
mod uploads;

use config::Config;
use engine::{BoxedSource, SourceSlot};
use error::StartupError;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "facewatchd failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facewatchd starting");
    let config = Config::from_env();

    let recognizer = engine::load_recognizer(&config)?;
    let labels = recognizer.classifier().labels().names().into();
    let recognizer = recognizer.into_shared();

    let (device, width, height) = (config.camera_device.clone(), config.camera_width, config.camera_height);
    let open_camera = move || -> Result<BoxedSource, SourceError> {
        Camera::open(&device, width, height)
            .map(|camera| Box::new(camera) as BoxedSource)
            .map_err(|e| SourceError::Unavailable(e.to_string()))
    };
    let initial = match open_camera() {
        Ok(camera) => Some(camera),
        Err(e) => {
            tracing::warn!(
                device = %config.camera_device,
                error = %e,
                "camera unavailable; streaming disabled until it can be opened"
            );
            None
        }
    };

    let state = http::AppState {
        recognizer,
        labels,
        history: Arc::new(RecognitionHistory::new()),
        slot: Arc::new(SourceSlot::new(initial, Box::new(open_camera))),
        stream_config: config.stream_config(),
        test_images_dir: config.test_images_dir.clone(),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .map_err(|source| StartupError::Bind {
            addr: config.bind.clone(),
            source,
        })?;
    tracing::info!(addr = %config.bind, "facewatchd ready");

    axum::serve(listener, http::create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("facewatchd shutting down");
        })
        .await?;

    Ok(())
}
