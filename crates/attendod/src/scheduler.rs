//! Detection loop scheduler — the kiosk's driving state machine.
//!
//! A single task samples the camera on a fixed-period tick, keeps at most one
//! detection pass in flight, and fans resolved descriptors out to the matcher
//! and the attendance reporter. States are published over a watch channel for
//! the operator surface.

use crate::reporter::{AttendanceReporter, Outcome};
use crate::worker::{CycleError, CycleResult, DetectorHandle};
use attendo_core::{DetectionResult, Region, RosterMatcher};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};
use tokio::time::MissedTickBehavior;

/// Detection loop state, published for overlay/status rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Sampling,
    AwaitingDescriptors,
    Dispatching,
    /// Terminal: session ended normally.
    Stopped,
    /// Terminal: the camera source failed. Distinct from a normal stop so the
    /// operator surface can show it.
    CameraFailed,
}

/// Last match observed by the loop, for overlay rendering.
#[derive(Debug, Clone, Serialize)]
pub struct ObservedMatch {
    /// `None` means an unrecognized face.
    pub identity_id: Option<String>,
    pub distance: Option<f32>,
    pub region: Region,
}

/// Snapshot of everything the operator surface needs from the loop.
#[derive(Debug, Clone, Serialize)]
pub struct KioskStatus {
    pub state: LoopState,
    pub last_match: Option<ObservedMatch>,
    pub last_outcome: Option<Outcome>,
}

impl Default for KioskStatus {
    fn default() -> Self {
        Self {
            state: LoopState::Idle,
            last_match: None,
            last_outcome: None,
        }
    }
}

pub struct Scheduler {
    detector: DetectorHandle,
    matcher: Arc<RwLock<RosterMatcher>>,
    reporter: AttendanceReporter,
    tick: Duration,
    status_tx: watch::Sender<KioskStatus>,
    stop_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        detector: DetectorHandle,
        matcher: Arc<RwLock<RosterMatcher>>,
        reporter: AttendanceReporter,
        tick: Duration,
        status_tx: watch::Sender<KioskStatus>,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            detector,
            matcher,
            reporter,
            tick,
            status_tx,
            stop_rx,
        }
    }

    /// Drive the loop until the session stops or the camera fails.
    ///
    /// Re-entrancy guard: a tick that fires while a pass is still awaiting
    /// descriptors is skipped entirely, so slow inference stalls sampling
    /// instead of queuing unboundedly. Stop is honored at state-transition
    /// boundaries; an in-flight pass completes on the worker but its result
    /// is discarded when the reply receiver is dropped here.
    pub async fn run(self) -> LoopState {
        let Scheduler {
            detector,
            matcher,
            mut reporter,
            tick,
            status_tx,
            mut stop_rx,
        } = self;

        let set_state = |state: LoopState| {
            status_tx.send_modify(|s| s.state = state);
        };

        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut in_flight: Option<oneshot::Receiver<CycleResult>> = None;

        let final_state = loop {
            tokio::select! {
                biased;

                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break LoopState::Stopped;
                    }
                }

                result = pending_cycle(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    match result {
                        Ok(Ok(detections)) => {
                            set_state(LoopState::Dispatching);
                            dispatch(&matcher, &mut reporter, &status_tx, detections).await;
                            set_state(LoopState::Idle);
                        }
                        Ok(Err(CycleError::Provider(e))) => {
                            tracing::warn!(error = %e, "detection cycle failed; treating as zero detections");
                            set_state(LoopState::Idle);
                        }
                        Ok(Err(CycleError::Camera(e))) => {
                            tracing::error!(error = %e, "camera unavailable; halting kiosk loop");
                            break LoopState::CameraFailed;
                        }
                        Err(_) => {
                            tracing::error!("detection worker dropped its reply; halting kiosk loop");
                            break LoopState::CameraFailed;
                        }
                    }
                }

                _ = interval.tick() => {
                    if in_flight.is_some() {
                        tracing::debug!("detection pass still in flight; skipping tick");
                        continue;
                    }
                    set_state(LoopState::Sampling);
                    match detector.request() {
                        Some(rx) => {
                            in_flight = Some(rx);
                            set_state(LoopState::AwaitingDescriptors);
                        }
                        None => break LoopState::CameraFailed,
                    }
                }
            }
        };

        // Dropping the receiver discards any result still in flight: a late
        // resolution after stop must produce no side effects.
        drop(in_flight);
        set_state(final_state);
        tracing::info!(state = ?final_state, "kiosk loop ended");
        final_state
    }
}

async fn pending_cycle(
    in_flight: &mut Option<oneshot::Receiver<CycleResult>>,
) -> Result<CycleResult, oneshot::error::RecvError> {
    in_flight
        .as_mut()
        .expect("pending_cycle polled without an in-flight pass")
        .await
}

/// Process one resolved cycle's detections sequentially in input order.
/// Per-identity state is independent, so input order is the only ordering.
async fn dispatch(
    matcher: &Arc<RwLock<RosterMatcher>>,
    reporter: &mut AttendanceReporter,
    status_tx: &watch::Sender<KioskStatus>,
    detections: Vec<DetectionResult>,
) {
    for detection in detections {
        let matched = {
            let matcher = matcher.read();
            matcher.match_embedding(&detection.embedding)
        };
        let result = match matched {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "query embedding rejected");
                continue;
            }
        };

        status_tx.send_modify(|s| {
            s.last_match = Some(ObservedMatch {
                identity_id: result.identity_id.clone(),
                distance: result.distance,
                region: detection.region,
            })
        });

        let Some(identity_id) = result.identity_id else {
            tracing::debug!(distance = ?result.distance, "face not recognized");
            continue;
        };

        let outcome = reporter.submit(&identity_id, Instant::now()).await;
        match &outcome {
            Outcome::Recorded { session_id, .. } => {
                tracing::info!(identity = %identity_id, session = %session_id, "attendance recorded");
            }
            Outcome::Suppressed { .. } => {
                tracing::debug!(identity = %identity_id, "within cooldown window");
            }
            Outcome::ContextRequired { .. } => {
                tracing::warn!(identity = %identity_id, "no session selected; submission deferred");
            }
            Outcome::Failed { detail, .. } => {
                tracing::warn!(identity = %identity_id, error = %detail, "attendance submission failed");
            }
        }
        status_tx.send_modify(|s| s.last_outcome = Some(outcome));
    }
}
