//! Academy backend client — roster source and attendance collaborator.
//!
//! The backend does NOT guarantee idempotency of repeated attendance
//! submissions in a short window; the cooldown ledger exists client-side
//! precisely for that reason.

use async_trait::async_trait;
use attendo_core::{Embedding, LabeledEmbedding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// The external attendance-recording collaborator.
///
/// Implemented over HTTP in production; tests substitute in-memory doubles.
#[async_trait]
pub trait AttendanceBackend: Send + Sync {
    async fn record_attendance(
        &self,
        identity_id: &str,
        session_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), BackendError>;
}

#[derive(Serialize)]
struct AttendanceSubmission<'a> {
    identity_id: &'a str,
    session_id: &'a str,
    timestamp: DateTime<Utc>,
}

/// One enrolled identity as the backend serves it: one or more stored
/// embedding vectors per person.
#[derive(Deserialize)]
struct RosterEntry {
    identity_id: String,
    embeddings: Vec<Vec<f32>>,
}

/// HTTP client for the academy backend.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, api_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        }
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Fetch the full enrolled roster. Called once at session start and again
    /// on an explicit reload; there is no incremental sync.
    pub async fn fetch_roster(&self) -> Result<Vec<LabeledEmbedding>, BackendError> {
        let url = format!("{}/api/kiosk/roster", self.base_url);
        let response = self.with_auth(self.client.get(&url)).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let entries: Vec<RosterEntry> = response.json().await?;
        let roster = flatten_roster(entries);
        tracing::info!(url = %url, templates = roster.len(), "roster fetched");
        Ok(roster)
    }
}

#[async_trait]
impl AttendanceBackend for HttpBackend {
    async fn record_attendance(
        &self,
        identity_id: &str,
        session_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), BackendError> {
        let url = format!("{}/api/kiosk/attendance", self.base_url);
        let submission = AttendanceSubmission {
            identity_id,
            session_id,
            timestamp,
        };

        let response = self
            .with_auth(self.client.post(&url))
            .json(&submission)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Flatten backend roster entries into one template per element, preserving
/// backend order (matching tie-breaks depend on it).
fn flatten_roster(entries: Vec<RosterEntry>) -> Vec<LabeledEmbedding> {
    entries
        .into_iter()
        .flat_map(|entry| {
            let identity_id = entry.identity_id;
            entry
                .embeddings
                .into_iter()
                .map(move |values| LabeledEmbedding {
                    identity_id: identity_id.clone(),
                    embedding: Embedding::new(values),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_roster_preserves_order_and_labels() {
        let entries = vec![
            RosterEntry {
                identity_id: "anna".into(),
                embeddings: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            },
            RosterEntry {
                identity_id: "bo".into(),
                embeddings: vec![vec![5.0, 6.0]],
            },
        ];

        let roster = flatten_roster(entries);
        assert_eq!(roster.len(), 3);
        assert_eq!(roster[0].identity_id, "anna");
        assert_eq!(roster[1].identity_id, "anna");
        assert_eq!(roster[1].embedding.values, vec![3.0, 4.0]);
        assert_eq!(roster[2].identity_id, "bo");
    }

    #[test]
    fn test_roster_entry_deserializes_backend_payload() {
        let payload = r#"[{"identity_id": "s-1042", "embeddings": [[0.1, 0.2, 0.3]]}]"#;
        let entries: Vec<RosterEntry> = serde_json::from_str(payload).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].identity_id, "s-1042");
        assert_eq!(entries[0].embeddings[0].len(), 3);
    }
}
