//! Plan snapshot model consumed by the reminder core.
//!
//! # Responsibility
//! - Define the read-only shapes of plans, items and geofence targets.
//! - Define positions produced by location providers.
//!
//! # Invariants
//! - An item id is unique within its plan; `ReminderKey` relies on that.
//! - The reminder core never mutates plan or item records.

pub mod plan;
pub mod position;
