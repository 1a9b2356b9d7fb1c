//! Position-driven reminder tracking.
//!
//! # Responsibility
//! - Keep the latest position and plan snapshot observed by the host.
//! - Run one evaluation pass per position or plan change, strictly serialized.
//! - Drive a `LocationProvider` until it ends or tracking is stopped.
//!
//! # Invariants
//! - Passes never overlap: evaluator, cooldown store and latest inputs live
//!   behind one mutex.
//! - A plan change re-evaluates only when a position has been observed.
//! - After `stop()` no pass runs until `resume()`.

use crate::cooldown::CooldownStore;
use crate::location::{LocationError, LocationProvider, PermissionStatus, StopSignal};
use crate::model::plan::PlanSnapshot;
use crate::model::position::Position;
use crate::notify::NotificationSink;
use crate::reminder::evaluator::{EvaluationReport, EvaluatorConfig, GeofenceEvaluator};
use log::{debug, info, warn};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

/// Where a tracking loop takes "now" from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    /// Use each fix's own timestamp; deterministic for recorded tracks.
    PositionTimestamp,
    /// Use the wall clock when the fix is processed.
    System,
}

impl ClockSource {
    pub fn now_ms(self, position: &Position) -> i64 {
        match self {
            Self::PositionTimestamp => position.timestamp_ms,
            Self::System => system_now_ms(),
        }
    }
}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn system_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Why a tracking loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Provider ran out of fixes.
    StreamEnded,
    /// `ReminderTracker::stop` was called.
    Stopped,
    /// Location permission is denied; the tracker stays idle.
    PermissionDenied,
}

/// Aggregate of one `ReminderTracker::run` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub positions: usize,
    pub provider_errors: usize,
    pub reports: Vec<EvaluationReport>,
    pub stop_reason: StopReason,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            positions: 0,
            provider_errors: 0,
            reports: Vec::new(),
            stop_reason: StopReason::StreamEnded,
        }
    }

    pub fn emitted_count(&self) -> usize {
        self.reports.iter().map(|report| report.emitted.len()).sum()
    }

    pub fn delivery_failure_count(&self) -> usize {
        self.reports
            .iter()
            .map(|report| report.delivery_failures.len())
            .sum()
    }
}

struct TrackerState<S: CooldownStore> {
    evaluator: GeofenceEvaluator<S>,
    last_position: Option<Position>,
    snapshot: PlanSnapshot,
}

/// Owns the evaluator and serializes every pass.
pub struct ReminderTracker<S: CooldownStore, N: NotificationSink> {
    state: Mutex<TrackerState<S>>,
    sink: N,
    stop_signal: StopSignal,
}

impl<S: CooldownStore, N: NotificationSink> ReminderTracker<S, N> {
    pub fn new(config: EvaluatorConfig, store: S, sink: N) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                evaluator: GeofenceEvaluator::new(config, store),
                last_position: None,
                snapshot: PlanSnapshot::new(),
            }),
            sink,
            stop_signal: StopSignal::new(),
        }
    }

    pub fn sink(&self) -> &N {
        &self.sink
    }

    pub fn is_tracking(&self) -> bool {
        !self.stop_signal.is_stopped()
    }

    /// Stops tracking and forgets the last position.
    ///
    /// A `run` loop blocked inside a provider that honors `StopSignal`
    /// returns promptly; other providers are checked between fixes.
    pub fn stop(&self) {
        if self.stop_signal.stop() {
            info!("event=tracking_stopped module=reminder status=ok reason=stop_requested");
        }
        self.lock_state().last_position = None;
    }

    pub fn resume(&self) {
        if self.stop_signal.reset() {
            info!("event=tracking_started module=reminder status=ok reason=resumed");
        }
    }

    pub fn last_position(&self) -> Option<Position> {
        self.lock_state().last_position
    }

    /// Records a new fix and evaluates the current snapshot against it.
    pub fn on_position(&self, position: Position, now_ms: i64) -> EvaluationReport {
        if !self.is_tracking() {
            debug!("event=position_ignored module=reminder status=skipped reason=not_tracking");
            return EvaluationReport::default();
        }
        let mut guard = self.lock_state();
        let state = &mut *guard;
        state.last_position = Some(position);
        state
            .evaluator
            .evaluate(&position, &state.snapshot, now_ms, &self.sink)
    }

    /// Replaces the plan snapshot and re-evaluates with the latest fix, if any.
    pub fn on_plans_changed(&self, snapshot: PlanSnapshot, now_ms: i64) -> EvaluationReport {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        state.snapshot = snapshot;

        if !self.is_tracking() {
            return EvaluationReport::default();
        }
        match state.last_position {
            Some(position) => state
                .evaluator
                .evaluate(&position, &state.snapshot, now_ms, &self.sink),
            None => EvaluationReport::default(),
        }
    }

    /// Current plan snapshot.
    pub fn snapshot(&self) -> PlanSnapshot {
        self.lock_state().snapshot.clone()
    }

    /// Pulls fixes from `provider` until it ends, denies permission or
    /// tracking is stopped.
    pub fn run<P: LocationProvider + ?Sized>(
        &self,
        provider: &mut P,
        clock: ClockSource,
    ) -> RunSummary {
        let mut summary = RunSummary::new();

        if provider.permission() == PermissionStatus::Denied {
            info!("event=tracking_idle module=reminder status=skipped reason=permission_denied");
            summary.stop_reason = StopReason::PermissionDenied;
            return summary;
        }
        info!(
            "event=tracking_started module=reminder status=ok permission={}",
            provider.permission().as_str()
        );
        provider.attach_stop_signal(self.stop_signal.clone());

        loop {
            if !self.is_tracking() {
                provider.stop();
                summary.stop_reason = StopReason::Stopped;
                break;
            }
            match provider.next_position() {
                None => {
                    summary.stop_reason = if self.is_tracking() {
                        StopReason::StreamEnded
                    } else {
                        StopReason::Stopped
                    };
                    break;
                }
                Some(Err(LocationError::PermissionDenied)) => {
                    warn!(
                        "event=location_error module=reminder status=error error=permission_denied"
                    );
                    provider.stop();
                    summary.stop_reason = StopReason::PermissionDenied;
                    break;
                }
                Some(Err(err)) => {
                    warn!(
                        "event=location_error module=reminder status=error error={}",
                        err
                    );
                    summary.provider_errors += 1;
                }
                Some(Ok(position)) => {
                    // The stop flag may have flipped while the provider blocked.
                    if !self.is_tracking() {
                        continue;
                    }
                    summary.positions += 1;
                    let now_ms = clock.now_ms(&position);
                    summary.reports.push(self.on_position(position, now_ms));
                }
            }
        }

        info!(
            "event=tracking_stopped module=reminder status=ok reason={:?} positions={} emitted={}",
            summary.stop_reason,
            summary.positions,
            summary.emitted_count()
        );
        summary
    }

    fn lock_state(&self) -> MutexGuard<'_, TrackerState<S>> {
        // Recover state left behind by a panicking sink.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
