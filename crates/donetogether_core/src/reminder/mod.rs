//! Proximity reminders for open plan items.
//!
//! # Responsibility
//! - Decide which items are close enough to the current position to remind.
//! - Serialize evaluation passes driven by positions and plan changes.
//!
//! # Invariants
//! - At most one reminder per item per cooldown window.
//! - Plans and items are read, never written.
//!
//! # See also
//! - `crate::cooldown` for the persistence contract.
//! - `crate::notify` for delivery.

pub mod evaluator;
pub mod tracker;

use crate::model::plan::ReminderKey;
use serde::Serialize;

pub use evaluator::{
    DeliveryFailure, EvaluationReport, EvaluatorConfig, GeofenceEvaluator,
    DEFAULT_COOLDOWN_WINDOW_MS, DEFAULT_RADIUS_METERS,
};
pub use tracker::{system_now_ms, ClockSource, ReminderTracker, RunSummary, StopReason};

/// One reminder decided by an evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderEvent {
    pub plan_id: String,
    pub item_id: String,
    pub text: String,
    pub plan_name: String,
    /// Target place name, or a coordinate label when the target has none.
    pub place_label: Option<String>,
    pub distance_meters: f64,
}

impl ReminderEvent {
    pub fn key(&self) -> ReminderKey {
        ReminderKey::new(self.plan_id.as_str(), self.item_id.as_str())
    }
}
