use crate::backend::HttpBackend;
use crate::scheduler::KioskStatus;
use attendo_core::RosterMatcher;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use zbus::interface;

/// D-Bus interface for the attendance kiosk daemon.
///
/// Bus name: org.academy.Attendo1
/// Object path: /org/academy/Attendo1
pub struct AttendoService {
    status_rx: watch::Receiver<KioskStatus>,
    session_tx: watch::Sender<Option<String>>,
    matcher: Arc<RwLock<RosterMatcher>>,
    backend: Arc<HttpBackend>,
    match_threshold: f32,
}

impl AttendoService {
    pub fn new(
        status_rx: watch::Receiver<KioskStatus>,
        session_tx: watch::Sender<Option<String>>,
        matcher: Arc<RwLock<RosterMatcher>>,
        backend: Arc<HttpBackend>,
        match_threshold: f32,
    ) -> Self {
        Self {
            status_rx,
            session_tx,
            matcher,
            backend,
            match_threshold,
        }
    }
}

#[interface(name = "org.academy.Attendo1")]
impl AttendoService {
    /// Return kiosk status as JSON: loop state, last match, last submission
    /// outcome, selected session, roster size.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let loop_status = serde_json::to_value(&*self.status_rx.borrow())
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;

        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "session": *self.session_tx.borrow(),
            "roster_templates": self.matcher.read().len(),
            "loop": loop_status,
        })
        .to_string())
    }

    /// Select the class/session that attendance submissions are attributed to.
    async fn select_session(&self, session_id: &str) -> zbus::fdo::Result<()> {
        if session_id.is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs(
                "session id must not be empty".into(),
            ));
        }
        tracing::info!(session = session_id, "session context selected");
        self.session_tx.send_replace(Some(session_id.to_string()));
        Ok(())
    }

    /// Clear the session context. Recognitions then surface ContextRequired
    /// instead of being submitted.
    async fn clear_session(&self) -> zbus::fdo::Result<()> {
        tracing::info!("session context cleared");
        self.session_tx.send_replace(None);
        Ok(())
    }

    /// Refetch the roster and rebuild the matcher wholesale. Returns the new
    /// template count. Newly enrolled identities are not recognized until
    /// this is called (or the daemon restarts).
    async fn reload_roster(&self) -> zbus::fdo::Result<u32> {
        let roster = self
            .backend
            .fetch_roster()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(format!("roster fetch failed: {e}")))?;

        let rebuilt = RosterMatcher::build(roster, self.match_threshold)
            .map_err(|e| zbus::fdo::Error::Failed(format!("bad roster data: {e}")))?;

        let count = rebuilt.len() as u32;
        *self.matcher.write() = rebuilt;
        tracing::info!(templates = count, "roster reloaded");
        Ok(count)
    }
}
