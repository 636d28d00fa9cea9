//! Attendance reporter — turns a recognized identity into (at most) one
//! backend submission per cooldown window.

use crate::backend::AttendanceBackend;
use attendo_core::CooldownLedger;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Outcome of one submission attempt for one recognized identity.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// The backend accepted the submission.
    Recorded {
        identity_id: String,
        session_id: String,
    },
    /// Within the cooldown window — expected steady state during continuous
    /// presence, not an error.
    Suppressed { identity_id: String },
    /// No session context selected; recognition was valid but not actionable.
    /// Does not consume the cooldown window.
    ContextRequired { identity_id: String },
    /// The backend call failed. Not retried here; the next recognition cycle
    /// outside the window retries naturally.
    Failed {
        identity_id: String,
        detail: String,
    },
}

/// Submits confirmed identities to the attendance backend, debounced through
/// the cooldown ledger.
///
/// Owns its ledger so independent kiosk sessions (and tests) never share
/// debounce state.
pub struct AttendanceReporter {
    backend: Arc<dyn AttendanceBackend>,
    ledger: CooldownLedger,
    session: watch::Receiver<Option<String>>,
}

impl AttendanceReporter {
    pub fn new(
        backend: Arc<dyn AttendanceBackend>,
        cooldown_window: Duration,
        session: watch::Receiver<Option<String>>,
    ) -> Self {
        Self {
            backend,
            ledger: CooldownLedger::new(cooldown_window),
            session,
        }
    }

    /// Submit attendance for a recognized identity.
    ///
    /// Precondition order matters: a missing session context must not touch
    /// the ledger, and a suppressed identity must not reach the backend. The
    /// ledger attempt is recorded *before* the backend call resolves, so
    /// overlapping detections within the window stay suppressed while a call
    /// is still in flight — and a failed call still burns the window.
    pub async fn submit(&mut self, identity_id: &str, now: Instant) -> Outcome {
        let Some(session_id) = self.session.borrow().clone() else {
            return Outcome::ContextRequired {
                identity_id: identity_id.to_string(),
            };
        };

        if self.ledger.should_suppress(identity_id, now) {
            return Outcome::Suppressed {
                identity_id: identity_id.to_string(),
            };
        }

        self.ledger.record_attempt(identity_id, now);

        match self
            .backend
            .record_attendance(identity_id, &session_id, Utc::now())
            .await
        {
            Ok(()) => Outcome::Recorded {
                identity_id: identity_id.to_string(),
                session_id,
            },
            Err(e) => Outcome::Failed {
                identity_id: identity_id.to_string(),
                detail: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::Mutex;

    struct FakeBackend {
        calls: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl FakeBackend {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AttendanceBackend for FakeBackend {
        async fn record_attendance(
            &self,
            identity_id: &str,
            session_id: &str,
            _timestamp: DateTime<Utc>,
        ) -> Result<(), BackendError> {
            self.calls
                .lock()
                .unwrap()
                .push((identity_id.to_string(), session_id.to_string()));
            if self.fail {
                Err(BackendError::Rejected {
                    status: 502,
                    body: "backend down".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    const WINDOW: Duration = Duration::from_secs(10);

    fn reporter_with_session(
        backend: Arc<FakeBackend>,
        session: Option<&str>,
    ) -> AttendanceReporter {
        let (_tx, rx) = watch::channel(session.map(str::to_string));
        AttendanceReporter::new(backend, WINDOW, rx)
    }

    #[tokio::test]
    async fn test_missing_context_never_reaches_backend_or_ledger() {
        let backend = FakeBackend::new(false);
        let mut reporter = reporter_with_session(backend.clone(), None);

        let t0 = Instant::now();
        let outcome = reporter.submit("anna", t0).await;
        assert!(matches!(outcome, Outcome::ContextRequired { .. }));
        assert_eq!(backend.call_count(), 0);
        // The cooldown window was not burned: an attempt right after a
        // session is selected must go through.
        assert!(!reporter.ledger.should_suppress("anna", t0 + Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_second_detection_within_window_is_suppressed() {
        let backend = FakeBackend::new(false);
        let mut reporter = reporter_with_session(backend.clone(), Some("yoga-0900"));

        let t0 = Instant::now();
        let first = reporter.submit("anna", t0).await;
        assert!(matches!(first, Outcome::Recorded { .. }));

        let second = reporter.submit("anna", t0 + Duration::from_secs(2)).await;
        assert!(matches!(second, Outcome::Suppressed { .. }));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_submission_still_burns_the_window() {
        let backend = FakeBackend::new(true);
        let mut reporter = reporter_with_session(backend.clone(), Some("yoga-0900"));

        let t0 = Instant::now();
        let first = reporter.submit("anna", t0).await;
        assert!(matches!(first, Outcome::Failed { .. }));

        // The attempt was recorded before the backend resolved, so the
        // network hiccup does not cause a double-fire moments later.
        let second = reporter.submit("anna", t0 + Duration::from_secs(2)).await;
        assert!(matches!(second, Outcome::Suppressed { .. }));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_new_window_allows_resubmission() {
        let backend = FakeBackend::new(false);
        let mut reporter = reporter_with_session(backend.clone(), Some("yoga-0900"));

        let t0 = Instant::now();
        reporter.submit("anna", t0).await;
        let outcome = reporter
            .submit("anna", t0 + WINDOW + Duration::from_secs(1))
            .await;
        assert!(matches!(outcome, Outcome::Recorded { .. }));
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_identities_do_not_share_cooldown() {
        let backend = FakeBackend::new(false);
        let mut reporter = reporter_with_session(backend.clone(), Some("yoga-0900"));

        let t0 = Instant::now();
        reporter.submit("anna", t0).await;
        let outcome = reporter.submit("bo", t0 + Duration::from_secs(1)).await;
        assert!(matches!(outcome, Outcome::Recorded { .. }));
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_submission_carries_selected_session() {
        let backend = FakeBackend::new(false);
        let mut reporter = reporter_with_session(backend.clone(), Some("pilates-1830"));

        reporter.submit("anna", Instant::now()).await;
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0], ("anna".to_string(), "pilates-1830".to_string()));
    }
}
