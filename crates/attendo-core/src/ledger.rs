//! Per-identity cooldown ledger — time-window debounce for attendance attempts.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Suppresses duplicate attendance submissions within a fixed window.
///
/// Pure debounce, not a backoff: every recorded attempt (successful or not)
/// resets the window, so a failed submission cannot double-fire attendance
/// moments later when the network recovers. Entries are never deleted; they
/// age out by comparison against the window.
///
/// Boundary choice: suppression uses strict `elapsed < window`, so an attempt
/// at exactly `window` after the last one is allowed.
pub struct CooldownLedger {
    window: Duration,
    entries: HashMap<String, Instant>,
}

impl CooldownLedger {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// True iff an attempt for this identity was recorded less than one
    /// window before `now`.
    pub fn should_suppress(&self, identity_id: &str, now: Instant) -> bool {
        self.entries
            .get(identity_id)
            .is_some_and(|last| now.duration_since(*last) < self.window)
    }

    /// Record an attempt, overwriting any previous timestamp for the identity.
    /// No side effect beyond the stored timestamp.
    pub fn record_attempt(&mut self, identity_id: &str, now: Instant) {
        self.entries.insert(identity_id.to_string(), now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(10);

    #[test]
    fn test_unknown_identity_is_not_suppressed() {
        let ledger = CooldownLedger::new(WINDOW);
        assert!(!ledger.should_suppress("anna", Instant::now()));
    }

    #[test]
    fn test_suppressed_just_inside_window() {
        let mut ledger = CooldownLedger::new(WINDOW);
        let t0 = Instant::now();
        ledger.record_attempt("anna", t0);
        assert!(ledger.should_suppress("anna", t0 + WINDOW - Duration::from_millis(1)));
    }

    #[test]
    fn test_allowed_just_past_window() {
        let mut ledger = CooldownLedger::new(WINDOW);
        let t0 = Instant::now();
        ledger.record_attempt("anna", t0);
        assert!(!ledger.should_suppress("anna", t0 + WINDOW + Duration::from_millis(1)));
    }

    #[test]
    fn test_allowed_at_exact_window_boundary() {
        // Strict `<`: exactly one window after the attempt is allowed.
        let mut ledger = CooldownLedger::new(WINDOW);
        let t0 = Instant::now();
        ledger.record_attempt("anna", t0);
        assert!(!ledger.should_suppress("anna", t0 + WINDOW));
    }

    #[test]
    fn test_repeat_attempt_resets_window() {
        let mut ledger = CooldownLedger::new(WINDOW);
        let t0 = Instant::now();
        ledger.record_attempt("anna", t0);
        ledger.record_attempt("anna", t0 + Duration::from_secs(8));
        // 12s after t0 but only 4s after the second attempt.
        assert!(ledger.should_suppress("anna", t0 + Duration::from_secs(12)));
    }

    #[test]
    fn test_identities_are_independent() {
        let mut ledger = CooldownLedger::new(WINDOW);
        let t0 = Instant::now();
        ledger.record_attempt("anna", t0);
        assert!(ledger.should_suppress("anna", t0 + Duration::from_secs(2)));
        assert!(!ledger.should_suppress("bo", t0 + Duration::from_secs(2)));
    }
}
