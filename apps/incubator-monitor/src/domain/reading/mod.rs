//! Sensor Reading Value Type
//!
//! The canonical internal representation of one environmental reading
//! recorded by the incubator's sensor pipeline. Wire records from the
//! ledger gateway are normalized into this type at the port boundary;
//! everything downstream (reconciler, projections, display) works on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One environmental reading captured at the incubator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Capture time, second resolution, UTC.
    pub timestamp: DateTime<Utc>,
    /// Air temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Identifier of the reporting sensor unit.
    pub sensor_id: String,
    /// Physical placement of the sensor within the installation.
    pub location: String,
    /// Free-form stage label recorded by the pipeline (`"Hari ke-7"` style).
    pub stage_label: String,
}

impl Reading {
    /// Create a new reading.
    #[must_use]
    pub const fn new(
        timestamp: DateTime<Utc>,
        temperature: f64,
        humidity: f64,
        sensor_id: String,
        location: String,
        stage_label: String,
    ) -> Self {
        Self {
            timestamp,
            temperature,
            humidity,
            sensor_id,
            location,
            stage_label,
        }
    }

    /// Identity key for duplicate suppression: a reading is the same
    /// occurrence as another when both the capture second and the
    /// reporting sensor match.
    #[must_use]
    pub fn dedup_key(&self) -> (i64, String) {
        (self.timestamp.timestamp(), self.sensor_id.clone())
    }

    /// Wall-clock label used on the chart axis (`HH:MM:SS`, UTC).
    #[must_use]
    pub fn chart_label(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }
}
