//! Position readings produced by location providers.

use serde::{Deserialize, Serialize};

/// One location fix. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported horizontal accuracy in meters, when the provider knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Unix epoch milliseconds at which the fix was taken.
    #[serde(alias = "timestamp")]
    pub timestamp_ms: i64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            timestamp_ms,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Providers occasionally emit NaN fixes while warming up.
    pub fn has_finite_coordinates(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::Position;

    #[test]
    fn parses_track_line_with_plain_timestamp_field() {
        let position: Position = serde_json::from_str(
            r#"{"latitude": 59.3293, "longitude": 18.0686, "accuracy": 12.5, "timestamp": 1700000000000}"#,
        )
        .expect("track line should parse");
        assert_eq!(position.timestamp_ms, 1_700_000_000_000);
        assert_eq!(position.accuracy, Some(12.5));
    }

    #[test]
    fn nan_fix_is_not_finite() {
        assert!(!Position::new(f64::NAN, 0.0, 0).has_finite_coordinates());
        assert!(Position::new(0.0, 0.0, 0).has_finite_coordinates());
    }
}
