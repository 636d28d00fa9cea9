//! Nearest-neighbor identity matching against the enrolled roster.

use crate::types::{Embedding, LabeledEmbedding, MatchResult};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error(
        "roster embedding for {identity_id} has dimension {actual}, expected {expected} — \
         re-enroll or fix the roster source"
    )]
    RosterDimensionMismatch {
        identity_id: String,
        expected: usize,
        actual: usize,
    },
    #[error("roster embedding for {0} is empty")]
    EmptyEmbedding(String),
    #[error("query embedding has dimension {actual}, expected {expected}")]
    QueryDimensionMismatch { expected: usize, actual: usize },
}

/// Matches query embeddings against the session roster.
///
/// Owns the roster exclusively. Entries keep their load order: on an exact
/// distance tie the earliest-loaded entry wins, so matching is deterministic
/// for a given roster payload.
#[derive(Debug)]
pub struct RosterMatcher {
    entries: Vec<LabeledEmbedding>,
    /// Dimensionality shared by every roster entry; `None` for an empty roster.
    dim: Option<usize>,
    /// Acceptance threshold: a best distance above this is reported as unknown.
    threshold: f32,
}

impl RosterMatcher {
    /// Build a matcher from the full session roster.
    ///
    /// Fails if any entry's dimensionality differs from the first entry's.
    /// An empty roster builds fine — the matcher then always reports unknown,
    /// which is a legitimate degraded state (nobody enrolled yet).
    pub fn build(roster: Vec<LabeledEmbedding>, threshold: f32) -> Result<Self, MatchError> {
        let mut dim = None;
        for entry in &roster {
            let d = entry.embedding.dim();
            if d == 0 {
                return Err(MatchError::EmptyEmbedding(entry.identity_id.clone()));
            }
            match dim {
                None => dim = Some(d),
                Some(expected) if expected != d => {
                    return Err(MatchError::RosterDimensionMismatch {
                        identity_id: entry.identity_id.clone(),
                        expected,
                        actual: d,
                    });
                }
                Some(_) => {}
            }
        }

        tracing::info!(
            templates = roster.len(),
            dim = ?dim,
            threshold,
            "roster matcher built"
        );

        Ok(Self {
            entries: roster,
            dim,
            threshold,
        })
    }

    /// Number of templates (not distinct identities) in the roster.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Match a query embedding against every roster template.
    ///
    /// An identity with several templates is scored by its best template, so
    /// one good template recognizes the person even when another is stale.
    /// Returns unknown when the best distance exceeds the threshold or the
    /// roster is empty.
    pub fn match_embedding(&self, query: &Embedding) -> Result<MatchResult, MatchError> {
        let Some(dim) = self.dim else {
            return Ok(MatchResult {
                identity_id: None,
                distance: None,
            });
        };

        if query.dim() != dim {
            return Err(MatchError::QueryDimensionMismatch {
                expected: dim,
                actual: query.dim(),
            });
        }

        let mut best_distance = f32::INFINITY;
        let mut best_identity: Option<&str> = None;

        // Strict `<` keeps the earliest-loaded entry on an exact tie.
        for entry in &self.entries {
            let distance = query.euclidean_distance(&entry.embedding);
            if distance < best_distance {
                best_distance = distance;
                best_identity = Some(&entry.identity_id);
            }
        }

        let identity_id = match best_identity {
            Some(id) if best_distance <= self.threshold => Some(id.to_string()),
            _ => None,
        };

        Ok(MatchResult {
            identity_id,
            distance: Some(best_distance),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, values: Vec<f32>) -> LabeledEmbedding {
        LabeledEmbedding {
            identity_id: id.to_string(),
            embedding: Embedding::new(values),
        }
    }

    #[test]
    fn test_exact_template_matches_with_zero_distance() {
        let matcher = RosterMatcher::build(
            vec![entry("anna", vec![0.1, 0.2, 0.3]), entry("bo", vec![1.0, 1.0, 1.0])],
            0.5,
        )
        .unwrap();

        let result = matcher
            .match_embedding(&Embedding::new(vec![0.1, 0.2, 0.3]))
            .unwrap();
        assert_eq!(result.identity_id.as_deref(), Some("anna"));
        assert_eq!(result.distance, Some(0.0));
    }

    #[test]
    fn test_above_threshold_is_unknown_even_for_nonempty_roster() {
        let matcher =
            RosterMatcher::build(vec![entry("anna", vec![0.0, 0.0])], 0.5).unwrap();

        let result = matcher
            .match_embedding(&Embedding::new(vec![3.0, 4.0]))
            .unwrap();
        assert!(result.identity_id.is_none());
        assert!((result.distance.unwrap() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_best_of_n_templates_per_identity() {
        // Second template for "anna" is the close one; the stale first
        // template must not drag the score up.
        let matcher = RosterMatcher::build(
            vec![
                entry("anna", vec![5.0, 5.0]),
                entry("bo", vec![2.0, 0.0]),
                entry("anna", vec![0.1, 0.0]),
            ],
            1.0,
        )
        .unwrap();

        let result = matcher
            .match_embedding(&Embedding::new(vec![0.0, 0.0]))
            .unwrap();
        assert_eq!(result.identity_id.as_deref(), Some("anna"));
    }

    #[test]
    fn test_tie_breaks_to_earliest_loaded() {
        let matcher = RosterMatcher::build(
            vec![entry("first", vec![1.0, 0.0]), entry("second", vec![1.0, 0.0])],
            2.0,
        )
        .unwrap();

        let result = matcher
            .match_embedding(&Embedding::new(vec![0.0, 0.0]))
            .unwrap();
        assert_eq!(result.identity_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_boundary_distance_equal_to_threshold_is_known() {
        let matcher =
            RosterMatcher::build(vec![entry("anna", vec![0.0, 0.0])], 5.0).unwrap();

        let result = matcher
            .match_embedding(&Embedding::new(vec![3.0, 4.0]))
            .unwrap();
        assert_eq!(result.identity_id.as_deref(), Some("anna"));
    }

    #[test]
    fn test_empty_roster_always_unknown() {
        let matcher = RosterMatcher::build(vec![], 0.5).unwrap();
        assert!(matcher.is_empty());

        let result = matcher
            .match_embedding(&Embedding::new(vec![1.0, 2.0]))
            .unwrap();
        assert!(result.identity_id.is_none());
        assert!(result.distance.is_none());
    }

    #[test]
    fn test_inconsistent_roster_dimensionality_is_fatal() {
        let err = RosterMatcher::build(
            vec![entry("anna", vec![0.0, 0.0]), entry("bo", vec![0.0, 0.0, 0.0])],
            0.5,
        )
        .unwrap_err();
        assert!(matches!(err, MatchError::RosterDimensionMismatch { .. }));
    }

    #[test]
    fn test_query_dimension_mismatch_is_rejected() {
        let matcher =
            RosterMatcher::build(vec![entry("anna", vec![0.0, 0.0])], 0.5).unwrap();
        let err = matcher
            .match_embedding(&Embedding::new(vec![0.0, 0.0, 0.0]))
            .unwrap_err();
        assert!(matches!(err, MatchError::QueryDimensionMismatch { .. }));
    }
}
