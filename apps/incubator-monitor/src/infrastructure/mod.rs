//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port
//! interfaces defined in the application layer, plus the process-level
//! concerns (configuration, logging, console output).

/// Signing agent WebSocket bridge.
pub mod agent;

/// Environment-driven configuration.
pub mod config;

/// Terminal renderer for session snapshots.
pub mod console;

/// Contract descriptor artifact loading.
pub mod descriptor;

/// Ledger gateway adapters (query and live feed channels).
pub mod ledger;

/// Tracing subscriber setup.
pub mod telemetry;
