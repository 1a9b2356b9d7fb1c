//! FFI use-case API for the mobile host.
//!
//! # Responsibility
//! - Expose stable, use-case-level reminder calls to Dart via FRB.
//! - Own the process-wide reminder tracker the host feeds with positions,
//!   permission changes and plan snapshots.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Notifications are queued in Rust and delivered natively by the host
//!   after `drain_notifications`.

use donetogether_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, parse_snapshot,
    ping as ping_inner, reminder::system_now_ms, CooldownStore, EvaluationReport,
    InMemoryCooldownStore, PermissionStatus, PlanSnapshot, Position, QueuedNotificationSink,
    ReminderSettings, ReminderTracker, SqliteCooldownStore,
};
use log::{info, warn};
use std::sync::{Arc, Mutex};

type HostTracker = ReminderTracker<Box<dyn CooldownStore + Send>, QueuedNotificationSink>;

static HOST_TRACKER: Mutex<Option<Arc<HostTracker>>> = Mutex::new(None);

/// Minimal health-check API for FRB smoke integration.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir`.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Generic action response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderActionResponse {
    pub ok: bool,
    /// Human-readable response message for diagnostics.
    pub message: String,
}

impl ReminderActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Outcome of one evaluation pass triggered from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderPassResponse {
    pub ok: bool,
    pub message: String,
    /// Reminders queued for native delivery.
    pub emitted: u32,
    pub suppressed: u32,
    /// True when the cooldown store failed and reminders were held back.
    pub degraded: bool,
}

impl ReminderPassResponse {
    fn from_report(report: &EvaluationReport) -> Self {
        let message = match report.degraded.as_deref() {
            Some(reason) => format!("Reminders paused: {reason}"),
            None if report.emitted.is_empty() => "No reminders.".to_string(),
            None => format!("Queued {} reminder(s).", report.emitted.len()),
        };
        Self {
            ok: true,
            message,
            emitted: saturating_u32(report.emitted.len()),
            suppressed: saturating_u32(report.suppressed),
            degraded: report.is_degraded(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            emitted: 0,
            suppressed: 0,
            degraded: false,
        }
    }
}

/// Notification the host should post natively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingNotification {
    pub title: String,
    pub body: String,
    pub identifier: String,
}

/// Configures reminders from a JSON settings document (may be `{}`).
///
/// Replaces any running tracker. Undrained notifications, the plan snapshot
/// and a stopped tracking state carry over; the host reports the next fix
/// again. Cooldowns survive only with `cooldownDbPath`.
#[flutter_rust_bridge::frb(sync)]
pub fn configure_reminders(settings_json: String) -> ReminderActionResponse {
    match build_tracker(settings_json.as_str()) {
        Ok(tracker) => {
            let mut host = lock_host();
            let carried = host
                .as_deref()
                .map(|previous| carry_over(previous, &tracker))
                .unwrap_or(0);
            *host = Some(Arc::new(tracker));
            ReminderActionResponse::success(format!(
                "Reminders configured; {carried} pending notification(s) kept."
            ))
        }
        Err(err) => ReminderActionResponse::failure(format!("configure_reminders failed: {err}")),
    }
}

/// Replaces the plan snapshot after a backend change notification.
#[flutter_rust_bridge::frb(sync)]
pub fn update_plans(plans_json: String, now_epoch_ms: Option<i64>) -> ReminderPassResponse {
    match host_tracker() {
        Ok(tracker) => update_plans_with(&tracker, plans_json.as_str(), now_epoch_ms),
        Err(err) => ReminderPassResponse::failure(format!("update_plans failed: {err}")),
    }
}

/// Reports one location fix from the platform location API.
#[flutter_rust_bridge::frb(sync)]
pub fn report_position(
    latitude: f64,
    longitude: f64,
    accuracy: Option<f64>,
    timestamp_epoch_ms: i64,
    now_epoch_ms: Option<i64>,
) -> ReminderPassResponse {
    let position = match accuracy {
        Some(accuracy) => {
            Position::new(latitude, longitude, timestamp_epoch_ms).with_accuracy(accuracy)
        }
        None => Position::new(latitude, longitude, timestamp_epoch_ms),
    };
    match host_tracker() {
        Ok(tracker) => report_position_with(&tracker, position, now_epoch_ms),
        Err(err) => ReminderPassResponse::failure(format!("report_position failed: {err}")),
    }
}

/// Reports the platform permission state (`prompt|granted|denied`).
///
/// `denied` stops tracking; `granted` resumes it.
#[flutter_rust_bridge::frb(sync)]
pub fn report_location_permission(status: String) -> ReminderActionResponse {
    let Some(permission) = PermissionStatus::parse(status.as_str()) else {
        return ReminderActionResponse::failure(format!(
            "unsupported permission status `{}`",
            status.trim()
        ));
    };
    match host_tracker() {
        Ok(tracker) => apply_permission(&tracker, permission),
        Err(err) => {
            ReminderActionResponse::failure(format!("report_location_permission failed: {err}"))
        }
    }
}

/// Stops tracking, e.g. when the user signs out.
#[flutter_rust_bridge::frb(sync)]
pub fn stop_tracking() -> ReminderActionResponse {
    let tracker = lock_host().clone();
    if let Some(tracker) = tracker {
        tracker.stop();
    }
    ReminderActionResponse::success("Tracking stopped.")
}

/// Takes queued notifications for native delivery.
#[flutter_rust_bridge::frb(sync)]
pub fn drain_notifications() -> Vec<PendingNotification> {
    let tracker = lock_host().clone();
    tracker.map(|tracker| drain_with(&tracker)).unwrap_or_default()
}

fn build_tracker(settings_json: &str) -> Result<HostTracker, String> {
    let raw = if settings_json.trim().is_empty() {
        "{}"
    } else {
        settings_json
    };
    let mut settings = ReminderSettings::from_json_str(raw).map_err(|err| err.to_string())?;
    settings
        .apply_env_overrides()
        .map_err(|err| err.to_string())?;

    let store: Box<dyn CooldownStore + Send> = match settings.cooldown_db_path.as_ref() {
        Some(path) => Box::new(SqliteCooldownStore::open(path).map_err(|err| err.to_string())?),
        None => Box::new(InMemoryCooldownStore::new()),
    };
    info!(
        "event=reminders_configured module=ffi status=ok durable={} cooldown_ms={}",
        settings.cooldown_db_path.is_some(),
        settings.cooldown_window_ms
    );

    Ok(ReminderTracker::new(
        settings.evaluator_config(),
        store,
        QueuedNotificationSink::new(),
    ))
}

/// Moves host-visible state from a replaced tracker into its successor.
fn carry_over(previous: &HostTracker, next: &HostTracker) -> usize {
    let pending = previous.sink().drain();
    let carried = pending.len();
    next.sink().extend(pending);
    next.on_plans_changed(previous.snapshot(), system_now_ms());
    if !previous.is_tracking() {
        next.stop();
    }
    carried
}

fn host_tracker() -> Result<Arc<HostTracker>, String> {
    let mut host = lock_host();
    if let Some(tracker) = host.as_ref() {
        return Ok(Arc::clone(tracker));
    }
    // Hosts that never call `configure_reminders` get volatile defaults.
    let tracker = Arc::new(build_tracker("{}")?);
    *host = Some(Arc::clone(&tracker));
    Ok(tracker)
}

fn lock_host() -> std::sync::MutexGuard<'static, Option<Arc<HostTracker>>> {
    HOST_TRACKER
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn update_plans_with(
    tracker: &HostTracker,
    plans_json: &str,
    now_epoch_ms: Option<i64>,
) -> ReminderPassResponse {
    let snapshot: PlanSnapshot = match parse_snapshot(plans_json) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!("event=plans_rejected module=ffi status=error error={}", err);
            return ReminderPassResponse::failure(format!("update_plans failed: {err}"));
        }
    };
    let report = tracker.on_plans_changed(snapshot, now_epoch_ms.unwrap_or_else(system_now_ms));
    ReminderPassResponse::from_report(&report)
}

fn report_position_with(
    tracker: &HostTracker,
    position: Position,
    now_epoch_ms: Option<i64>,
) -> ReminderPassResponse {
    if !tracker.is_tracking() {
        return ReminderPassResponse::failure("Tracking is stopped.");
    }
    let report = tracker.on_position(position, now_epoch_ms.unwrap_or_else(system_now_ms));
    ReminderPassResponse::from_report(&report)
}

fn apply_permission(tracker: &HostTracker, permission: PermissionStatus) -> ReminderActionResponse {
    match permission {
        PermissionStatus::Denied => {
            tracker.stop();
            ReminderActionResponse::success("Location denied; tracking idle.")
        }
        PermissionStatus::Granted => {
            tracker.resume();
            ReminderActionResponse::success("Tracking active.")
        }
        PermissionStatus::Prompt => ReminderActionResponse::success("Waiting for permission."),
    }
}

fn drain_with(tracker: &HostTracker) -> Vec<PendingNotification> {
    tracker
        .sink()
        .drain()
        .into_iter()
        .map(|request| PendingNotification {
            title: request.title,
            body: request.body,
            identifier: request.identifier,
        })
        .collect()
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::{
        apply_permission, build_tracker, carry_over, core_version, drain_with, init_logging,
        ping, report_position_with, update_plans_with,
    };
    use donetogether_core::{PermissionStatus, Position};

    const PLANS_JSON: &str = r#"[
        {
            "id": "plan-1",
            "name": "Weekend",
            "completed": false,
            "items": [
                {
                    "id": "item-1",
                    "text": "Pick up parcel",
                    "checked": false,
                    "location": {
                        "latitude": 59.3293,
                        "longitude": 18.0686,
                        "name": "Central station",
                        "radius": 50,
                        "active": true
                    }
                }
            ]
        }
    ]"#;

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "/tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn build_tracker_rejects_invalid_settings() {
        let err = build_tracker(r#"{"cooldownWindowMs": -5}"#)
            .err()
            .expect("negative window must be rejected");
        assert!(err.contains("cooldownWindowMs"));
    }

    #[test]
    fn position_in_range_queues_one_notification() {
        let tracker = build_tracker("").expect("default tracker");
        let plans = update_plans_with(&tracker, PLANS_JSON, Some(0));
        assert!(plans.ok, "{}", plans.message);
        assert_eq!(plans.emitted, 0);

        let fix = Position::new(59.3293, 18.0686, 1_000);
        let first = report_position_with(&tracker, fix, Some(1_000));
        assert!(first.ok);
        assert_eq!(first.emitted, 1);

        let second = report_position_with(&tracker, fix, Some(2_000));
        assert_eq!(second.emitted, 0);
        assert_eq!(second.suppressed, 1);

        let pending = drain_with(&tracker);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "Weekend");
        assert_eq!(pending[0].body, "Pick up parcel (near Central station)");
        assert!(drain_with(&tracker).is_empty());
    }

    #[test]
    fn denied_permission_stops_evaluation() {
        let tracker = build_tracker("{}").expect("default tracker");
        update_plans_with(&tracker, PLANS_JSON, Some(0));

        let response = apply_permission(&tracker, PermissionStatus::Denied);
        assert!(response.ok);
        let pass = report_position_with(&tracker, Position::new(59.3293, 18.0686, 0), Some(0));
        assert!(!pass.ok);
        assert!(drain_with(&tracker).is_empty());
    }

    #[test]
    fn reconfigure_keeps_pending_notifications_and_plans() {
        let previous = build_tracker("{}").expect("default tracker");
        update_plans_with(&previous, PLANS_JSON, Some(0));
        let fix = Position::new(59.3293, 18.0686, 1_000).with_accuracy(5.0);
        assert_eq!(report_position_with(&previous, fix, Some(1_000)).emitted, 1);

        let next = build_tracker(r#"{"cooldownWindowMs": 60000}"#).expect("tracker");
        assert_eq!(carry_over(&previous, &next), 1);
        assert!(drain_with(&previous).is_empty());
        assert!(next.is_tracking());

        // The snapshot carried over; only the position must be reported again.
        let pass = report_position_with(&next, fix, Some(2_000));
        assert_eq!(pass.emitted, 1);

        let pending = drain_with(&next);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].identifier, "plan-1/item-1");
    }

    #[test]
    fn reconfigure_keeps_denied_tracking_state() {
        let previous = build_tracker("{}").expect("default tracker");
        apply_permission(&previous, PermissionStatus::Denied);

        let next = build_tracker("{}").expect("default tracker");
        assert_eq!(carry_over(&previous, &next), 0);
        assert!(!next.is_tracking());
    }

    #[test]
    fn malformed_plans_json_is_reported() {
        let tracker = build_tracker("{}").expect("default tracker");
        let response = update_plans_with(&tracker, "[{\"items\": 5}]", Some(0));
        assert!(!response.ok);
        assert!(response.message.contains("update_plans failed"));
    }
}
