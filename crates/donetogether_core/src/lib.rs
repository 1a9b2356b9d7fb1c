//! Core reminder logic for Done Together.
//! This crate is the single source of truth for proximity reminder invariants.

pub mod config;
pub mod cooldown;
pub mod db;
pub mod geo;
pub mod location;
pub mod logging;
pub mod model;
pub mod notify;
pub mod reminder;

pub use config::{ReminderSettings, SettingsError};
pub use cooldown::{
    CooldownError, CooldownResult, CooldownStore, InMemoryCooldownStore, SqliteCooldownStore,
};
pub use geo::{distance_meters, haversine_km};
pub use location::{
    ChannelLocationProvider, LocationError, LocationProvider, PermissionStatus, PositionSender,
    ReplayLocationProvider, StopSignal,
};
pub use logging::{default_log_level, init_logging, init_logging_from_settings, logging_status};
pub use model::plan::{
    parse_snapshot, GeoTarget, GeoTargetError, Item, Plan, PlanSnapshot, ReminderKey,
};
pub use model::position::Position;
pub use notify::{
    DeliveryError, FnNotificationSink, LogNotificationSink, NotificationRequest,
    NotificationSink, QueuedNotificationSink,
};
pub use reminder::{
    ClockSource, EvaluationReport, EvaluatorConfig, GeofenceEvaluator, ReminderEvent,
    ReminderTracker, RunSummary, StopReason,
};

/// Minimal health-check API for host integration probes.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
