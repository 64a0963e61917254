//! Application Layer - Session orchestration and port definitions.
//!
//! This layer contains the session engine and the port interfaces
//! through which it reaches the signing agent and the ledger gateway.

/// Historical backfill use case.
pub mod history;

/// Port interfaces for the signing agent and ledger gateway.
pub mod ports;

/// Session engine: connection lifecycle and series ownership.
pub mod session;
