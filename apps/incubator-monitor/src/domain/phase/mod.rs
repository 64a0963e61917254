//! Incubation Phase Classification
//!
//! Maps the free-form stage label recorded by the sensor pipeline
//! (`"Hari ke-N"`, day N of the batch) to the operational phase of the
//! incubation cycle. Classification is presentation-side only: readings
//! carry the raw label, the phase is derived on display.
//!
//! The day ranges overlap at day 21 on purpose. Rules are applied in
//! order and the last matching rule wins, so day 21 reports `Hatching`,
//! not the lockdown phase.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Operational phase of the incubation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncubationPhase {
    /// Egg selection and incubator preparation (day 0 or unknown label).
    SelectionPreparation,
    /// Days 1-18: incubation with routine egg turning.
    RoutineTurning,
    /// Days 19-21: turning stopped, humidity raised.
    HighHumidityLockdown,
    /// Days 21-22: chicks hatching.
    Hatching,
    /// Day 23: chicks drying inside the incubator.
    Drying,
    /// Day 24 onward: chicks moved to the brooder.
    BrooderTransfer,
}

impl IncubationPhase {
    /// Operator-facing label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SelectionPreparation => "selection/preparation",
            Self::RoutineTurning => "incubation (routine turning)",
            Self::HighHumidityLockdown => "incubation (no turning, high humidity)",
            Self::Hatching => "hatching",
            Self::Drying => "chick drying",
            Self::BrooderTransfer => "brooder transfer",
        }
    }
}

impl fmt::Display for IncubationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Day number embedded in a stage label, if present.
///
/// The pipeline writes labels as `"Hari ke-N"`; anything else (including
/// an empty label) carries no day number.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
#[must_use]
pub fn day_number(stage_label: &str) -> Option<u32> {
    static DAY_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = DAY_REGEX.get_or_init(|| {
        // This regex pattern is compile-time constant and always valid
        regex::Regex::new(r"Hari ke-(\d+)").expect("day regex is valid")
    });

    re.captures(stage_label)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Classify a stage label into an incubation phase.
///
/// Unparseable labels classify as day 0. Rules apply in order with the
/// last match winning, which keeps day 21 reporting `Hatching`.
#[must_use]
pub fn classify(stage_label: &str) -> IncubationPhase {
    let day = day_number(stage_label).unwrap_or(0);

    let mut phase = IncubationPhase::SelectionPreparation;
    if (1..=18).contains(&day) {
        phase = IncubationPhase::RoutineTurning;
    }
    if (19..=21).contains(&day) {
        phase = IncubationPhase::HighHumidityLockdown;
    }
    if (21..=22).contains(&day) {
        phase = IncubationPhase::Hatching;
    }
    if day > 22 && day <= 23 {
        phase = IncubationPhase::Drying;
    }
    if day > 23 {
        phase = IncubationPhase::BrooderTransfer;
    }
    phase
}
