//! Series Reconciliation
//!
//! Merges one historical backfill with an unbounded live stream into a
//! single consistent series with two projections:
//!
//! - **table**: every reading of the session, newest first, unbounded
//! - **chart**: the most recent `window` readings, chronological order,
//!   evicted strictly FIFO as live readings arrive
//!
//! The reconciler is owned by the session engine alone. All mutation goes
//! through `seed`, `append` and `clear`; `project` never mutates. Live
//! appends are suppressed when a reading with the same capture second and
//! sensor is already present, so a push received during the historical
//! fetch cannot appear twice.

use crate::domain::reading::Reading;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Default chart window size.
pub const DEFAULT_CHART_WINDOW: usize = 20;

// =============================================================================
// Projections
// =============================================================================

/// Chart-ready view of the windowed series, chronological order.
///
/// The three vectors always have equal length, at most the window size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartWindow {
    /// Wall-clock axis labels (`HH:MM:SS`, UTC).
    pub labels: Vec<String>,
    /// Temperature values aligned with `labels`.
    pub temperature: Vec<f64>,
    /// Humidity values aligned with `labels`.
    pub humidity: Vec<f64>,
}

impl ChartWindow {
    /// Number of plotted points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the chart has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Immutable snapshot of both projections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesProjection {
    /// Full session history, newest first.
    pub table: Vec<Reading>,
    /// Bounded chronological chart window.
    pub chart: ChartWindow,
}

// =============================================================================
// Reconciler
// =============================================================================

/// Single-owner state merging the historical batch with live pushes.
#[derive(Debug)]
pub struct SeriesReconciler {
    window: usize,
    /// Newest-first. Live readings are pushed to the front.
    table: VecDeque<Reading>,
    /// Chronological. Oldest point evicted when the window overflows.
    chart: VecDeque<Reading>,
    /// Dedup keys of every reading currently in the table.
    seen: HashSet<(i64, String)>,
}

impl SeriesReconciler {
    /// Create an empty reconciler with the given chart window size.
    ///
    /// A window of zero is treated as one; the chart always has capacity
    /// for at least the latest reading.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            table: VecDeque::new(),
            chart: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// Chart window capacity.
    #[must_use]
    pub const fn window(&self) -> usize {
        self.window
    }

    /// Number of readings in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the series holds no readings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Replace the whole series with a historical batch.
    ///
    /// `newest_first` is the batch exactly as the historical loader
    /// produces it. The chart window becomes the most recent `window`
    /// readings in chronological order. The batch itself is trusted and
    /// not deduplicated, but every reading registers its key so later
    /// live pushes of the same occurrence are suppressed.
    pub fn seed(&mut self, newest_first: Vec<Reading>) {
        self.table = newest_first.into();
        self.chart = self
            .table
            .iter()
            .take(self.window)
            .rev()
            .cloned()
            .collect();
        self.seen = self.table.iter().map(Reading::dedup_key).collect();
    }

    /// Append one live reading.
    ///
    /// Returns `false` without mutating when a reading with the same
    /// capture second and sensor is already present. Otherwise the
    /// reading joins the table front and the chart back, evicting the
    /// oldest chart point once the window is full.
    pub fn append(&mut self, reading: Reading) -> bool {
        let key = reading.dedup_key();
        if self.seen.contains(&key) {
            return false;
        }
        self.seen.insert(key);
        self.chart.push_back(reading.clone());
        if self.chart.len() > self.window {
            self.chart.pop_front();
        }
        self.table.push_front(reading);
        true
    }

    /// Drop every reading. Used when the session identity is torn down.
    pub fn clear(&mut self) {
        self.table.clear();
        self.chart.clear();
        self.seen.clear();
    }

    /// Build the display projection. Pure with respect to the series.
    #[must_use]
    pub fn project(&self) -> SeriesProjection {
        let mut chart = ChartWindow {
            labels: Vec::with_capacity(self.chart.len()),
            temperature: Vec::with_capacity(self.chart.len()),
            humidity: Vec::with_capacity(self.chart.len()),
        };
        for reading in &self.chart {
            chart.labels.push(reading.chart_label());
            chart.temperature.push(reading.temperature);
            chart.humidity.push(reading.humidity);
        }
        SeriesProjection {
            table: self.table.iter().cloned().collect(),
            chart,
        }
    }
}

impl Default for SeriesReconciler {
    fn default() -> Self {
        Self::new(DEFAULT_CHART_WINDOW)
    }
}
