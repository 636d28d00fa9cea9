use serde::{Deserialize, Serialize};

/// Bounding region of a detected face, in frame coordinates.
///
/// Carried through to the operator overlay only — matching never looks at it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Face embedding vector (128- or 512-dimensional depending on the model).
///
/// Distance polarity for the whole crate: Euclidean distance, lower = more
/// similar. Every comparison in this crate uses this metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance to another embedding of the same dimensionality.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One enrolled biometric template.
///
/// An identity may appear multiple times in a roster (one entry per stored
/// template). Loaded once per kiosk session; the roster is rebuilt wholesale
/// on reload, never patched in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledEmbedding {
    pub identity_id: String,
    pub embedding: Embedding,
}

/// One detected face in one frame.
///
/// Ephemeral: produced by the embedding provider, matched immediately, then
/// dropped. Never persisted.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub region: Region,
    pub embedding: Embedding,
}

/// Result of matching one query embedding against the roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    /// Matched identity, or `None` when nothing in the roster is within
    /// threshold (including the empty-roster case).
    pub identity_id: Option<String>,
    /// Euclidean distance of the closest roster entry; `None` for an empty
    /// roster.
    pub distance: Option<f32>,
}

impl MatchResult {
    pub fn is_known(&self) -> bool {
        self.identity_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new(vec![1.0, 2.0, 3.0]);
        let b = Embedding::new(vec![1.0, 2.0, 3.0]);
        assert_eq!(a.euclidean_distance(&b), 0.0);
    }

    #[test]
    fn test_euclidean_distance_unit_apart() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_symmetric() {
        let a = Embedding::new(vec![0.2, -0.7, 1.5]);
        let b = Embedding::new(vec![-0.1, 0.4, 0.9]);
        assert_eq!(a.euclidean_distance(&b), b.euclidean_distance(&a));
    }
}
