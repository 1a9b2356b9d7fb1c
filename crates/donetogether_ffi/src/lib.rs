//! Flutter-facing bridge over `donetogether_core`.

pub mod api;
