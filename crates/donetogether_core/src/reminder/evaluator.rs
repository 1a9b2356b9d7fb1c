//! Geofence evaluator.
//!
//! # Responsibility
//! - Walk a plan snapshot, measure the distance from the current position to
//!   every open, active target and emit reminders for targets in range.
//! - Apply the per-item cooldown through the owned `CooldownStore`.
//!
//! # Invariants
//! - Completed plans, checked items and inactive targets are never measured.
//! - The range check is inclusive (`distance <= radius`).
//! - The cooldown timestamp is committed before delivery and is never rolled
//!   back when the sink fails.
//! - A cooldown read failure suppresses every reminder for the rest of the
//!   pass (degraded mode).

use crate::cooldown::CooldownStore;
use crate::geo::{distance_meters, format_coordinates};
use crate::model::plan::{GeoTarget, Item, Plan, ReminderKey};
use crate::model::position::Position;
use crate::notify::{DeliveryError, NotificationRequest, NotificationSink};
use crate::reminder::ReminderEvent;
use log::{debug, error, info, warn};
use std::time::Instant;

/// One hour.
pub const DEFAULT_COOLDOWN_WINDOW_MS: i64 = 60 * 60 * 1000;
pub const DEFAULT_RADIUS_METERS: f64 = 100.0;

/// Evaluation tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluatorConfig {
    /// Minimum elapsed time between two reminders for the same item.
    pub cooldown_window_ms: i64,
    /// Radius used when a target has none or a non-positive one.
    pub default_radius_meters: f64,
    /// Clears an item's cooldown once the position leaves its geofence, so the
    /// next entry reminds again even inside the window. Off by default.
    pub rearm_on_exit: bool,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            cooldown_window_ms: DEFAULT_COOLDOWN_WINDOW_MS,
            default_radius_meters: DEFAULT_RADIUS_METERS,
            rearm_on_exit: false,
        }
    }
}

/// Sink failure for one emitted reminder.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryFailure {
    pub key: ReminderKey,
    pub error: DeliveryError,
}

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    /// Targets measured against the position.
    pub evaluated: usize,
    /// Reminders decided in this pass, in snapshot order.
    pub emitted: Vec<ReminderEvent>,
    /// In-range items held back by cooldown or degraded mode.
    pub suppressed: usize,
    /// Active targets ignored because their coordinates are unusable.
    pub skipped_malformed: usize,
    pub delivery_failures: Vec<DeliveryFailure>,
    /// Set when the cooldown store failed during the pass.
    pub degraded: Option<String>,
}

impl EvaluationReport {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

enum CooldownDecision {
    Eligible,
    Suppressed,
    StoreFailed(String),
}

/// Stateless over plans; stateful only through its cooldown store.
pub struct GeofenceEvaluator<S: CooldownStore> {
    config: EvaluatorConfig,
    store: S,
}

impl<S: CooldownStore> GeofenceEvaluator<S> {
    pub fn new(config: EvaluatorConfig, store: S) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs one pass over `snapshot` at `now_ms` (Unix epoch milliseconds).
    ///
    /// Never fails: malformed targets, sink failures and store failures are
    /// reported in the returned `EvaluationReport`.
    pub fn evaluate<N: NotificationSink + ?Sized>(
        &mut self,
        position: &Position,
        snapshot: &[Plan],
        now_ms: i64,
        sink: &N,
    ) -> EvaluationReport {
        let started_at = Instant::now();
        let mut report = EvaluationReport::default();

        if !position.has_finite_coordinates() {
            warn!(
                "event=evaluation_pass module=reminder status=skipped reason=non_finite_position"
            );
            return report;
        }

        for plan in snapshot.iter().filter(|plan| !plan.completed) {
            for item in &plan.items {
                let Some(target) = item.active_target() else {
                    continue;
                };
                self.evaluate_item(position, plan, item, target, now_ms, sink, &mut report);
            }
        }

        let log_line = format!(
            "event=evaluation_pass module=reminder status={} evaluated={} emitted={} suppressed={} skipped_malformed={} delivery_failures={} duration_us={}",
            if report.is_degraded() { "degraded" } else { "ok" },
            report.evaluated,
            report.emitted.len(),
            report.suppressed,
            report.skipped_malformed,
            report.delivery_failures.len(),
            started_at.elapsed().as_micros()
        );
        if report.emitted.is_empty() && !report.is_degraded() {
            debug!("{log_line}");
        } else {
            info!("{log_line}");
        }

        report
    }

    #[allow(clippy::too_many_arguments)]
    fn evaluate_item<N: NotificationSink + ?Sized>(
        &mut self,
        position: &Position,
        plan: &Plan,
        item: &Item,
        target: &GeoTarget,
        now_ms: i64,
        sink: &N,
        report: &mut EvaluationReport,
    ) {
        let coordinates = match target.validate() {
            Ok(()) => target.coordinates(),
            Err(err) => {
                warn!(
                    "event=geo_target_malformed module=reminder status=skipped plan_id={} item_id={} reason={}",
                    plan.id, item.id, err
                );
                None
            }
        };
        let Some(coordinates) = coordinates else {
            report.skipped_malformed += 1;
            return;
        };

        report.evaluated += 1;
        let key = ReminderKey::new(plan.id.as_str(), item.id.as_str());
        let distance = distance_meters(position, coordinates);
        let threshold = target.effective_radius_meters(self.config.default_radius_meters);

        if distance > threshold {
            if self.config.rearm_on_exit && report.degraded.is_none() {
                self.rearm(&key, report);
            }
            return;
        }

        if report.is_degraded() {
            report.suppressed += 1;
            return;
        }

        match self.cooldown_decision(&key, now_ms) {
            CooldownDecision::Eligible => {}
            CooldownDecision::Suppressed => {
                debug!(
                    "event=reminder_suppressed module=reminder status=ok reason=cooldown reminder_key={}",
                    key
                );
                report.suppressed += 1;
                return;
            }
            CooldownDecision::StoreFailed(message) => {
                error!(
                    "event=cooldown_degraded module=reminder status=error op=get reminder_key={} error={}",
                    key, message
                );
                report.degraded = Some(message);
                report.suppressed += 1;
                return;
            }
        }

        // Committed before delivery; kept even when the sink fails.
        if let Err(err) = self.store.set(&key, now_ms) {
            error!(
                "event=cooldown_degraded module=reminder status=error op=set reminder_key={} error={}",
                key, err
            );
            report.degraded = Some(err.to_string());
            report.suppressed += 1;
            return;
        }

        let event = ReminderEvent {
            plan_id: plan.id.clone(),
            item_id: item.id.clone(),
            text: item.text.clone(),
            plan_name: plan.name.clone(),
            place_label: place_label(target, coordinates),
            distance_meters: distance,
        };
        info!(
            "event=reminder_emitted module=reminder status=ok reminder_key={} distance_m={:.1} radius_m={:.1}",
            key, distance, threshold
        );

        let request = NotificationRequest::from_event(&event);
        if let Err(err) = sink.deliver(&request) {
            warn!(
                "event=notification_failed module=reminder status=error reminder_key={} error={}",
                key, err
            );
            report.delivery_failures.push(DeliveryFailure {
                key,
                error: err,
            });
        }
        report.emitted.push(event);
    }

    fn cooldown_decision(&self, key: &ReminderKey, now_ms: i64) -> CooldownDecision {
        match self.store.get(key) {
            Ok(None) => CooldownDecision::Eligible,
            Ok(Some(last_notified_ms)) => {
                let elapsed = now_ms.saturating_sub(last_notified_ms);
                if elapsed >= self.config.cooldown_window_ms {
                    CooldownDecision::Eligible
                } else {
                    CooldownDecision::Suppressed
                }
            }
            Err(err) => CooldownDecision::StoreFailed(err.to_string()),
        }
    }

    fn rearm(&mut self, key: &ReminderKey, report: &mut EvaluationReport) {
        let result = match self.store.get(key) {
            Ok(Some(_)) => self.store.clear(key),
            Ok(None) => return,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => debug!(
                "event=reminder_rearmed module=reminder status=ok reminder_key={}",
                key
            ),
            Err(err) => {
                error!(
                    "event=cooldown_degraded module=reminder status=error op=rearm reminder_key={} error={}",
                    key, err
                );
                report.degraded = Some(err.to_string());
            }
        }
    }
}

fn place_label(target: &GeoTarget, coordinates: (f64, f64)) -> Option<String> {
    match target.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => Some(name.to_string()),
        _ => Some(format_coordinates(coordinates.0, coordinates.1)),
    }
}

#[cfg(test)]
mod tests {
    use super::{EvaluatorConfig, GeofenceEvaluator, DEFAULT_COOLDOWN_WINDOW_MS};
    use crate::cooldown::{CooldownError, CooldownResult, CooldownStore, InMemoryCooldownStore};
    use crate::geo::EARTH_RADIUS_KM;
    use crate::model::plan::{GeoTarget, Item, Plan, ReminderKey};
    use crate::model::position::Position;
    use crate::notify::{
        DeliveryError, FnNotificationSink, NotificationRequest, QueuedNotificationSink,
    };

    const MINUTE_MS: i64 = 60 * 1000;

    /// Longitude offset at the equator that lies `meters` east of 0,0.
    fn equator_offset_degrees(meters: f64) -> f64 {
        (meters / (EARTH_RADIUS_KM * 1000.0)).to_degrees()
    }

    fn single_item_snapshot(target: GeoTarget) -> Vec<Plan> {
        vec![Plan::new("plan-1", "Errands")
            .with_item(Item::new("item-1", "Buy stamps").with_target(target))]
    }

    fn evaluator() -> GeofenceEvaluator<InMemoryCooldownStore> {
        GeofenceEvaluator::new(EvaluatorConfig::default(), InMemoryCooldownStore::new())
    }

    struct BrokenStore;

    impl CooldownStore for BrokenStore {
        fn get(&self, _key: &ReminderKey) -> CooldownResult<Option<i64>> {
            Err(CooldownError::Unavailable("disk detached".to_string()))
        }

        fn set(&mut self, _key: &ReminderKey, _notified_at_ms: i64) -> CooldownResult<()> {
            Err(CooldownError::Unavailable("disk detached".to_string()))
        }

        fn clear(&mut self, _key: &ReminderKey) -> CooldownResult<()> {
            Err(CooldownError::Unavailable("disk detached".to_string()))
        }
    }

    #[test]
    fn range_boundary_is_inclusive() {
        let sink = QueuedNotificationSink::new();
        let position = Position::new(0.0, equator_offset_degrees(100.0), 0);
        let exact = crate::geo::distance_meters(&position, (0.0, 0.0));
        assert!((exact - 100.0).abs() < 1e-6);

        let mut at_boundary = evaluator();
        let report = at_boundary.evaluate(
            &position,
            &single_item_snapshot(GeoTarget::new(0.0, 0.0, exact)),
            0,
            &sink,
        );
        assert_eq!(report.emitted.len(), 1);

        let mut just_outside = evaluator();
        let beyond = Position::new(0.0, equator_offset_degrees(100.01), 0);
        let report = just_outside.evaluate(
            &beyond,
            &single_item_snapshot(GeoTarget::new(0.0, 0.0, 100.0)),
            0,
            &sink,
        );
        assert!(report.emitted.is_empty());
        assert_eq!(report.evaluated, 1);
    }

    #[test]
    fn cooldown_is_elapsed_time_based() {
        let sink = QueuedNotificationSink::new();
        let snapshot = single_item_snapshot(GeoTarget::new(59.3293, 18.0686, 50.0));
        let position = Position::new(59.3293, 18.0686, 0);
        let mut evaluator = evaluator();

        assert_eq!(evaluator.evaluate(&position, &snapshot, 0, &sink).emitted.len(), 1);
        let held = evaluator.evaluate(&position, &snapshot, 30 * MINUTE_MS, &sink);
        assert!(held.emitted.is_empty());
        assert_eq!(held.suppressed, 1);

        let exactly_window =
            evaluator.evaluate(&position, &snapshot, DEFAULT_COOLDOWN_WINDOW_MS, &sink);
        assert_eq!(exactly_window.emitted.len(), 1);
        assert_eq!(sink.pending_len(), 2);
    }

    #[test]
    fn failed_delivery_still_commits_cooldown() {
        let sink = FnNotificationSink(|_: &NotificationRequest| -> Result<(), DeliveryError> {
            Err(DeliveryError::Platform("service down".to_string()))
        });
        let snapshot = single_item_snapshot(GeoTarget::new(1.0, 1.0, 100.0));
        let position = Position::new(1.0, 1.0, 0);
        let mut evaluator = evaluator();

        let first = evaluator.evaluate(&position, &snapshot, 1_000, &sink);
        assert_eq!(first.emitted.len(), 1);
        assert_eq!(first.delivery_failures.len(), 1);
        assert_eq!(
            evaluator.store().get(&ReminderKey::new("plan-1", "item-1")).unwrap(),
            Some(1_000)
        );

        let second = evaluator.evaluate(&position, &snapshot, 2_000, &sink);
        assert!(second.emitted.is_empty());
        assert!(second.delivery_failures.is_empty());
    }

    #[test]
    fn unavailable_store_suppresses_everything() {
        let sink = QueuedNotificationSink::new();
        let snapshot = vec![Plan::new("p", "Plan")
            .with_item(Item::new("a", "first").with_target(GeoTarget::new(1.0, 1.0, 100.0)))
            .with_item(Item::new("b", "second").with_target(GeoTarget::new(1.0, 1.0, 100.0)))];
        let mut evaluator = GeofenceEvaluator::new(EvaluatorConfig::default(), BrokenStore);

        let report = evaluator.evaluate(&Position::new(1.0, 1.0, 0), &snapshot, 0, &sink);
        assert!(report.is_degraded());
        assert!(report.emitted.is_empty());
        assert_eq!(report.suppressed, 2);
        assert_eq!(sink.pending_len(), 0);
    }

    #[test]
    fn malformed_targets_are_skipped_and_counted() {
        let sink = QueuedNotificationSink::new();
        let mut missing = GeoTarget::new(1.0, 1.0, 100.0);
        missing.latitude = None;
        let mut not_finite = GeoTarget::new(1.0, 1.0, 100.0);
        not_finite.longitude = Some(f64::INFINITY);
        let snapshot = vec![Plan::new("p", "Plan")
            .with_item(Item::new("a", "missing").with_target(missing))
            .with_item(Item::new("b", "infinite").with_target(not_finite))
            .with_item(Item::new("c", "fine").with_target(GeoTarget::new(1.0, 1.0, 100.0)))];

        let report = evaluator().evaluate(&Position::new(1.0, 1.0, 0), &snapshot, 0, &sink);
        assert_eq!(report.skipped_malformed, 2);
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.emitted.len(), 1);
        assert_eq!(report.emitted[0].item_id, "c");
    }

    #[test]
    fn non_positive_radius_uses_default() {
        let sink = QueuedNotificationSink::new();
        let position = Position::new(0.0, equator_offset_degrees(80.0), 0);
        let report = evaluator().evaluate(
            &position,
            &single_item_snapshot(GeoTarget::new(0.0, 0.0, 0.0)),
            0,
            &sink,
        );
        assert_eq!(report.emitted.len(), 1);
    }

    #[test]
    fn rearm_on_exit_clears_cooldown_after_leaving() {
        let sink = QueuedNotificationSink::new();
        let config = EvaluatorConfig {
            rearm_on_exit: true,
            ..EvaluatorConfig::default()
        };
        let mut evaluator = GeofenceEvaluator::new(config, InMemoryCooldownStore::new());
        let snapshot = single_item_snapshot(GeoTarget::new(0.0, 0.0, 100.0));
        let inside = Position::new(0.0, 0.0, 0);
        let outside = Position::new(0.0, equator_offset_degrees(500.0), 0);

        assert_eq!(evaluator.evaluate(&inside, &snapshot, 0, &sink).emitted.len(), 1);
        evaluator.evaluate(&outside, &snapshot, MINUTE_MS, &sink);
        assert!(evaluator.store().is_empty());
        assert_eq!(
            evaluator.evaluate(&inside, &snapshot, 2 * MINUTE_MS, &sink).emitted.len(),
            1
        );
    }

    #[test]
    fn event_carries_place_label_or_coordinates() {
        let sink = QueuedNotificationSink::new();
        let snapshot = vec![Plan::new("p", "Errands")
            .with_item(
                Item::new("a", "named")
                    .with_target(GeoTarget::new(1.0, 1.0, 100.0).named("Pharmacy")),
            )
            .with_item(Item::new("b", "unnamed").with_target(GeoTarget::new(1.0, 1.0, 100.0)))];

        let report = evaluator().evaluate(&Position::new(1.0, 1.0, 0), &snapshot, 0, &sink);
        assert_eq!(report.emitted[0].place_label.as_deref(), Some("Pharmacy"));
        assert_eq!(report.emitted[1].place_label.as_deref(), Some("1.0000, 1.0000"));

        let delivered = sink.drain();
        assert_eq!(delivered[0].title, "Errands");
        assert_eq!(delivered[0].body, "named (near Pharmacy)");
    }

    #[test]
    fn non_finite_position_is_ignored() {
        let sink = QueuedNotificationSink::new();
        let report = evaluator().evaluate(
            &Position::new(f64::NAN, 0.0, 0),
            &single_item_snapshot(GeoTarget::new(0.0, 0.0, 100.0)),
            0,
            &sink,
        );
        assert_eq!(report, Default::default());
    }
}
