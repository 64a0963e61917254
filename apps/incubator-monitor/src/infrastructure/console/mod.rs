//! Console View
//!
//! Terminal presentation of session snapshots. Renders the connection
//! status, the current error if any, the newest readings with their
//! incubation phase, and a one-line chart summary. The view re-renders
//! on every published snapshot and scrolls rather than clearing, so the
//! terminal buffer keeps the session history.

use std::fmt::Write as _;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::application::session::SessionSnapshot;
use crate::domain::phase::classify;

/// Table rows printed per refresh. The series itself is unbounded; the
/// view shows the newest slice and counts the rest.
const TABLE_ROWS: usize = 10;

/// Re-render the console on every snapshot change until cancelled.
pub async fn run_view(mut snapshots: watch::Receiver<SessionSnapshot>, cancel: CancellationToken) {
    let initial = snapshots.borrow().clone();
    print!("{}", render(&initial));

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    // Publisher gone, the supervisor is tearing down.
                    return;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                print!("{}", render(&snapshot));
            }
        }
    }
}

/// Render one snapshot as a text block.
#[must_use]
pub fn render(snapshot: &SessionSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "---- smartine incubator monitor ----");

    let identity = snapshot
        .identity
        .as_ref()
        .map_or_else(|| "-".to_string(), |id| id.short_form());
    let chain = snapshot.chain.as_deref().unwrap_or("-");
    let _ = writeln!(
        out,
        "status: {}  account: {identity}  network: {chain}",
        snapshot.state.label()
    );

    if let Some(error) = &snapshot.current_error {
        let _ = writeln!(out, "problem: {error}");
    }

    let table = &snapshot.projection.table;
    if table.is_empty() {
        let _ = writeln!(out, "no readings recorded yet");
    } else {
        let _ = writeln!(
            out,
            "{:<10} {:<10} {:<12} {:<14} {:<38} {:>6} {:>6}",
            "time", "sensor", "location", "stage", "phase", "temp", "hum"
        );
        for reading in table.iter().take(TABLE_ROWS) {
            let phase = classify(&reading.stage_label);
            let _ = writeln!(
                out,
                "{:<10} {:<10} {:<12} {:<14} {:<38} {:>6.1} {:>6.1}",
                reading.chart_label(),
                reading.sensor_id,
                reading.location,
                reading.stage_label,
                phase.label(),
                reading.temperature,
                reading.humidity,
            );
        }
        if table.len() > TABLE_ROWS {
            let _ = writeln!(out, "... {} earlier readings", table.len() - TABLE_ROWS);
        }
    }

    let chart = &snapshot.projection.chart;
    if !chart.is_empty() {
        let first = chart.labels.first().map_or("", String::as_str);
        let last = chart.labels.last().map_or("", String::as_str);
        let _ = writeln!(out, "chart: {} points, {first} .. {last}", chart.len());
    }

    out
}
