//! attendo-core — Identity matching and attendance-debounce logic for the kiosk.
//!
//! Holds the enrolled roster, matches query embeddings against it, and keeps
//! the per-identity cooldown ledger that prevents duplicate check-ins. The
//! face detection + embedding extraction capability sits behind the
//! [`EmbeddingProvider`] trait; an ONNX-backed adapter lives in [`onnx`].

pub mod ledger;
pub mod matcher;
pub mod onnx;
pub mod provider;
pub mod types;

pub use ledger::CooldownLedger;
pub use onnx::OnnxEmbeddingProvider;
pub use matcher::{MatchError, RosterMatcher};
pub use provider::{EmbeddingProvider, ProviderError};
pub use types::{DetectionResult, Embedding, LabeledEmbedding, MatchResult, Region};

/// Default directory for the kiosk's ONNX model files.
pub fn default_model_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("/usr/share/attendo/models")
}
