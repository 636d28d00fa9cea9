//! Detection worker — a dedicated OS thread owning the camera and the
//! embedding provider.
//!
//! Inference is blocking CPU work, so it runs off the async runtime. The
//! scheduler requests one pass at a time over an mpsc channel and receives
//! the result on a oneshot reply. When every handle is dropped the worker
//! exits and the camera is released with it.

use attendo_core::{DetectionResult, EmbeddingProvider, ProviderError};
use attendo_hw::{Camera, CameraError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum CycleError {
    /// Fatal to the kiosk session: the loop must halt and surface it.
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    /// One cycle failed; the loop logs it and continues on the next tick.
    #[error("detection error: {0}")]
    Provider(#[from] ProviderError),
}

pub type CycleResult = Result<Vec<DetectionResult>, CycleError>;

pub(crate) struct DetectRequest {
    pub(crate) reply: oneshot::Sender<CycleResult>,
}

/// Clone-safe handle to the detection worker thread.
#[derive(Clone)]
pub struct DetectorHandle {
    tx: mpsc::Sender<DetectRequest>,
}

impl DetectorHandle {
    /// Request one detection pass: capture a frame, extract descriptors.
    ///
    /// Returns `None` when the worker is gone. The scheduler's re-entrancy
    /// guard ensures at most one request is outstanding.
    pub fn request(&self) -> Option<oneshot::Receiver<CycleResult>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        match self.tx.try_send(DetectRequest { reply: reply_tx }) {
            Ok(()) => Some(reply_rx),
            Err(e) => {
                tracing::error!(error = %e, "detection worker not accepting requests");
                None
            }
        }
    }

    /// Channel pair for tests that stand in for the worker thread.
    #[cfg(test)]
    pub(crate) fn test_pair() -> (Self, mpsc::Receiver<DetectRequest>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }
}

/// Spawn the detection worker on a dedicated OS thread.
///
/// Discards warmup frames first so the camera's AGC/AE settles before the
/// first real pass.
pub fn spawn_detector(
    camera: Camera,
    mut provider: Box<dyn EmbeddingProvider>,
    warmup_frames: usize,
) -> DetectorHandle {
    let (tx, mut rx) = mpsc::channel::<DetectRequest>(1);

    std::thread::Builder::new()
        .name("attendo-detect".into())
        .spawn(move || {
            if warmup_frames > 0 {
                tracing::info!(count = warmup_frames, "discarding warmup frames");
                for _ in 0..warmup_frames {
                    let _ = camera.capture_frame();
                }
            }

            tracing::info!("detection worker started");
            while let Some(req) = rx.blocking_recv() {
                let result = run_cycle(&camera, provider.as_mut());
                // A failed send means the scheduler stopped while this pass
                // was in flight; the result is discarded as required.
                let _ = req.reply.send(result);
            }
            tracing::info!("detection worker exiting, releasing camera");
        })
        .expect("failed to spawn detection worker thread");

    DetectorHandle { tx }
}

/// One detection pass: frame capture, dark-frame gate, descriptor extraction.
fn run_cycle(camera: &Camera, provider: &mut dyn EmbeddingProvider) -> CycleResult {
    let frame = camera.capture_frame()?;

    if frame.is_dark() {
        tracing::debug!(seq = frame.sequence, "dark frame, skipping extraction");
        return Ok(Vec::new());
    }

    let detections = provider.extract(&frame.data, frame.width, frame.height)?;
    Ok(detections)
}

// Keeps the transient/fatal split visible at the type level for callers.
impl CycleError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, CycleError::Camera(_))
    }
}
