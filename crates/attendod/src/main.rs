use anyhow::{bail, Context, Result};
use attendo_core::{OnnxEmbeddingProvider, RosterMatcher};
use attendo_hw::Camera;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod backend;
mod config;
mod dbus_interface;
mod reporter;
mod scheduler;
mod worker;

use backend::HttpBackend;
use config::Config;
use dbus_interface::AttendoService;
use reporter::AttendanceReporter;
use scheduler::{KioskStatus, LoopState, Scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("attendod starting");
    let config = Config::from_env();

    // Roster load and matcher build fail fast: bad roster data means the
    // session cannot start.
    let backend = Arc::new(HttpBackend::new(&config.backend_url, config.api_token.clone()));
    let roster = backend
        .fetch_roster()
        .await
        .context("failed to load roster from backend")?;
    let matcher = RosterMatcher::build(roster, config.match_threshold)
        .context("roster configuration error")?;
    let matcher = Arc::new(RwLock::new(matcher));

    // Camera and models are session-scoped resources; their absence is fatal.
    let camera = Camera::open(&config.camera_device)
        .with_context(|| format!("camera unavailable: {}", config.camera_device))?;
    let provider = OnnxEmbeddingProvider::load(
        &config.detector_model_path(),
        &config.embedder_model_path(),
    )
    .context("failed to load embedding models")?;

    let detector = worker::spawn_detector(camera, Box::new(provider), config.warmup_frames);

    let (session_tx, session_rx) = watch::channel(None);
    let (status_tx, status_rx) = watch::channel(KioskStatus::default());
    let (stop_tx, stop_rx) = watch::channel(false);

    let reporter = AttendanceReporter::new(
        backend.clone(),
        Duration::from_secs(config.cooldown_secs),
        session_rx,
    );
    let scheduler = Scheduler::new(
        detector,
        matcher.clone(),
        reporter,
        Duration::from_millis(config.tick_interval_ms),
        status_tx,
        stop_rx,
    );
    let mut loop_task = tokio::spawn(scheduler.run());

    let service = AttendoService::new(
        status_rx,
        session_tx,
        matcher,
        backend,
        config.match_threshold,
    );
    let _conn = zbus::connection::Builder::session()?
        .name("org.academy.Attendo1")?
        .serve_at("/org/academy/Attendo1", service)?
        .build()
        .await
        .context("failed to register D-Bus service")?;

    tracing::info!("attendod ready");

    let ended = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("signal received, stopping kiosk loop");
            let _ = stop_tx.send(true);
            None
        }
        ended = &mut loop_task => Some(ended),
    };

    let final_state = match ended {
        Some(res) => res.context("kiosk loop panicked")?,
        None => loop_task.await.context("kiosk loop panicked")?,
    };

    // The loop only ends on its own for fatal reasons.
    if final_state == LoopState::CameraFailed {
        bail!("kiosk session halted: camera unavailable");
    }

    tracing::info!("attendod shutting down");
    Ok(())
}
