//! Boundary to the face detection + embedding extraction capability.

use crate::types::DetectionResult;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("frame rejected: {0}")]
    BadFrame(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Extracts face descriptors from a single grayscale frame.
///
/// One call covers one frame; zero detections is a normal outcome, not an
/// error. A call may take longer than the kiosk sampling interval — the
/// scheduler guarantees at most one call is in flight at a time.
pub trait EmbeddingProvider: Send {
    fn extract(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectionResult>, ProviderError>;
}
