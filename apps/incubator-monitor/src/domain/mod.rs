//! Domain Layer - Core telemetry types and reconciliation logic.
//!
//! This layer contains the core domain types for incubator telemetry
//! with no external dependencies. All types here are pure Rust with
//! serialization support; nothing in this layer performs IO.

/// Connection lifecycle states and session identity.
pub mod connection;

/// Incubation phase classification from stage labels.
pub mod phase;

/// Sensor reading value type.
pub mod reading;

/// Series reconciliation (table and chart projections).
pub mod series;
