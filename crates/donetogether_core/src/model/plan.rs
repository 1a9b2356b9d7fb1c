//! Plan, item and geofence target records.
//!
//! # Responsibility
//! - Mirror the shared plan documents owned by the backend document store.
//! - Provide read-only helpers the evaluator needs (coordinates, radius).
//!
//! # Invariants
//! - `Item::id` is unique within its `Plan`.
//! - `GeoTarget::active == false` disables evaluation regardless of other fields.
//! - A non-positive or missing radius falls back to the configured default.
//!
//! # See also
//! - `crate::reminder::evaluator`

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Ordered collection of plans handed to one evaluation pass.
pub type PlanSnapshot = Vec<Plan>;

/// Parses a JSON array of plan documents as delivered by the backend.
pub fn parse_snapshot(json: &str) -> Result<PlanSnapshot, serde_json::Error> {
    serde_json::from_str(json)
}

/// Shared checklist owned by one user and shared with members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    /// Display name; used as notification title.
    #[serde(default)]
    pub name: String,
    /// Completed plans are skipped entirely.
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Plan {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            completed: false,
            items: Vec::new(),
        }
    }

    /// Builder-style helper used by hosts and tests assembling snapshots.
    pub fn with_item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }
}

/// Single checklist entry, optionally carrying a geofence target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub checked: bool,
    /// Serialized as `location` to match the backend document schema.
    #[serde(
        rename = "location",
        alias = "geoTarget",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub geo_target: Option<GeoTarget>,
}

impl Item {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            checked: false,
            geo_target: None,
        }
    }

    pub fn with_target(mut self, target: GeoTarget) -> Self {
        self.geo_target = Some(target);
        self
    }

    /// Returns the target only when the item is still open and tracking is on.
    pub fn active_target(&self) -> Option<&GeoTarget> {
        if self.checked {
            return None;
        }
        self.geo_target.as_ref().filter(|target| target.active)
    }
}

/// Circular region around a target coordinate.
///
/// Coordinates are optional because documents written by older clients may
/// carry a partially filled location object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoTarget {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Serialized as `radius` to match the backend document schema.
    #[serde(rename = "radius", alias = "radiusMeters", default)]
    pub radius_meters: Option<f64>,
    #[serde(default)]
    pub active: bool,
    /// Human-readable place label picked when the target was set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl GeoTarget {
    /// Creates an active target with an explicit radius.
    pub fn new(latitude: f64, longitude: f64, radius_meters: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            radius_meters: Some(radius_meters),
            active: true,
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Returns `(latitude, longitude)` when the target is usable for distance math.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.validate().ok()?;
        Some((self.latitude?, self.longitude?))
    }

    /// Returns the radius used as the inclusive geofence threshold.
    pub fn effective_radius_meters(&self, default_radius_meters: f64) -> f64 {
        match self.radius_meters {
            Some(radius) if radius.is_finite() && radius > 0.0 => radius,
            _ => default_radius_meters,
        }
    }

    /// Returns whether the stored radius is missing or unusable.
    pub fn uses_default_radius(&self) -> bool {
        !matches!(self.radius_meters, Some(radius) if radius.is_finite() && radius > 0.0)
    }

    /// Validates coordinate presence and range.
    ///
    /// Radius problems are not reported here; they fall back to the default
    /// radius instead of disabling the target.
    pub fn validate(&self) -> Result<(), GeoTargetError> {
        check_axis("latitude", self.latitude, 90.0)?;
        check_axis("longitude", self.longitude, 180.0)?;
        Ok(())
    }
}

fn check_axis(axis: &'static str, value: Option<f64>, limit: f64) -> Result<(), GeoTargetError> {
    let value = value.ok_or(GeoTargetError::MissingCoordinate(axis))?;
    if !value.is_finite() {
        return Err(GeoTargetError::NonFiniteCoordinate(axis));
    }
    if value.abs() > limit {
        return Err(GeoTargetError::OutOfRange { axis, value });
    }
    Ok(())
}

/// Reasons a geofence target cannot be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum GeoTargetError {
    MissingCoordinate(&'static str),
    NonFiniteCoordinate(&'static str),
    OutOfRange { axis: &'static str, value: f64 },
}

impl Display for GeoTargetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCoordinate(axis) => write!(f, "geo target {axis} is missing"),
            Self::NonFiniteCoordinate(axis) => write!(f, "geo target {axis} is not finite"),
            Self::OutOfRange { axis, value } => {
                write!(f, "geo target {axis} `{value}` is out of range")
            }
        }
    }
}

impl Error for GeoTargetError {}

/// Cooldown key for one item, derived from `(plan_id, item_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReminderKey {
    pub plan_id: String,
    pub item_id: String,
}

impl ReminderKey {
    pub fn new(plan_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            item_id: item_id.into(),
        }
    }

    /// Stable `plan/item` string form, used as the notification identifier.
    ///
    /// `%` and `/` inside either id are percent-escaped, so two different
    /// pairs never map to the same string.
    pub fn as_storage_key(&self) -> String {
        self.to_string()
    }
}

impl Display for ReminderKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}",
            escape_key_part(&self.plan_id),
            escape_key_part(&self.item_id)
        )
    }
}

fn escape_key_part(part: &str) -> Cow<'_, str> {
    if !part.contains(['%', '/']) {
        return Cow::Borrowed(part);
    }
    Cow::Owned(part.replace('%', "%25").replace('/', "%2F"))
}

#[cfg(test)]
mod tests {
    use super::{GeoTarget, GeoTargetError, Item, Plan, ReminderKey};

    #[test]
    fn coordinates_require_both_axes() {
        let mut target = GeoTarget::new(59.3293, 18.0686, 50.0);
        assert_eq!(target.coordinates(), Some((59.3293, 18.0686)));

        target.longitude = None;
        assert_eq!(target.coordinates(), None);
        assert_eq!(
            target.validate(),
            Err(GeoTargetError::MissingCoordinate("longitude"))
        );
    }

    #[test]
    fn non_finite_and_out_of_range_coordinates_are_rejected() {
        let mut target = GeoTarget::new(f64::NAN, 18.0, 50.0);
        assert_eq!(
            target.validate(),
            Err(GeoTargetError::NonFiniteCoordinate("latitude"))
        );

        target.latitude = Some(91.0);
        assert!(matches!(
            target.validate(),
            Err(GeoTargetError::OutOfRange { axis: "latitude", .. })
        ));
    }

    #[test]
    fn non_positive_radius_falls_back_to_default() {
        let mut target = GeoTarget::new(0.0, 0.0, 0.0);
        assert_eq!(target.effective_radius_meters(100.0), 100.0);
        assert!(target.uses_default_radius());

        target.radius_meters = Some(-5.0);
        assert_eq!(target.effective_radius_meters(100.0), 100.0);

        target.radius_meters = None;
        assert_eq!(target.effective_radius_meters(100.0), 100.0);

        target.radius_meters = Some(250.0);
        assert_eq!(target.effective_radius_meters(100.0), 250.0);
        assert!(!target.uses_default_radius());
    }

    #[test]
    fn active_target_skips_checked_items_and_inactive_targets() {
        let item = Item::new("i1", "buy milk").with_target(GeoTarget::new(1.0, 2.0, 10.0));
        assert!(item.active_target().is_some());

        let mut checked = item.clone();
        checked.checked = true;
        assert!(checked.active_target().is_none());

        let inactive =
            Item::new("i2", "post letter").with_target(GeoTarget::new(1.0, 2.0, 10.0).inactive());
        assert!(inactive.active_target().is_none());
    }

    #[test]
    fn deserializes_backend_document_shape() {
        let json = r#"{
            "id": "plan-1",
            "name": "Weekend",
            "ownerId": "u1",
            "completed": false,
            "items": [
                {
                    "id": "item-1",
                    "text": "Pick up parcel",
                    "checked": false,
                    "checkedBy": "someone",
                    "location": {
                        "latitude": 59.3293,
                        "longitude": 18.0686,
                        "name": "Sergels torg",
                        "radius": 150,
                        "active": true
                    }
                },
                { "id": "item-2", "text": "No location", "checked": true }
            ]
        }"#;

        let plan: Plan = serde_json::from_str(json).expect("document should parse");
        assert_eq!(plan.items.len(), 2);
        let target = plan.items[0]
            .geo_target
            .as_ref()
            .expect("first item should carry a target");
        assert_eq!(target.radius_meters, Some(150.0));
        assert_eq!(target.name.as_deref(), Some("Sergels torg"));
        assert!(plan.items[1].geo_target.is_none());
    }

    #[test]
    fn reminder_key_storage_form_is_stable() {
        let key = ReminderKey::new("plan-1", "item-9");
        assert_eq!(key.as_storage_key(), "plan-1/item-9");
        assert_eq!(key.to_string(), "plan-1/item-9");
    }

    #[test]
    fn reminder_key_storage_form_escapes_separators() {
        let left = ReminderKey::new("a/b", "c");
        let right = ReminderKey::new("a", "b/c");
        assert_eq!(left.as_storage_key(), "a%2Fb/c");
        assert_eq!(right.as_storage_key(), "a/b%2Fc");
        assert_ne!(left.as_storage_key(), right.as_storage_key());

        let percent = ReminderKey::new("a%2Fb", "c");
        assert_eq!(percent.as_storage_key(), "a%252Fb/c");
        assert_ne!(percent.as_storage_key(), left.as_storage_key());
    }
}
