#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Incubator Monitor - Smartine Telemetry Console
//!
//! A client-side engine that reconciles egg incubator telemetry recorded
//! on the Smartine ledger into one ordered, bounded, duplicate-free
//! series, and tracks the connection lifecycle to the operator's signing
//! agent. A one-time historical backfill and a live push feed merge into
//! a newest-first table plus a bounded chronological chart window.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Pure telemetry and session types
//!   - `reading`: The sensor reading record
//!   - `series`: Series reconciliation, table and chart projections
//!   - `connection`: Connection lifecycle states and session identity
//!   - `phase`: Incubation phase classification from stage labels
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Interfaces for the signing agent and ledger channels
//!   - `session`: The session engine actor driving the whole lifecycle
//!   - `history`: One-shot historical backfill
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `agent`: WebSocket JSON-RPC bridge to the signing agent
//!   - `ledger`: HTTP query and WebSocket push channels to the gateway
//!   - `descriptor`: Contract descriptor artifact loader
//!   - `console`: Terminal presentation of session snapshots
//!   - `config`: Environment-derived configuration
//!   - `telemetry`: Tracing subscriber setup
//!
//! # Data Flow
//!
//! ```text
//! signing agent (WS) <----+
//!                         |            +----------------+
//!                    +----+-----+      |    snapshot    |
//!                    | session  +----->|    (watch)     +---> console view
//!                    |  engine  |      +----------------+
//!                    +--+----+--+
//!                       |    ^
//!             backfill  |    |  live readings
//!                       v    |
//!              +--------+-+  +-+--------+
//!              | query    |  | feed     |
//!              | (HTTP)   |  | (WS)     |
//!              +----------+  +----------+
//!                   ledger gateway
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pure telemetry and session types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{AccountAddress, ChainId, ConnectionState, SessionIdentity};
pub use domain::phase::{IncubationPhase, classify, day_number};
pub use domain::reading::Reading;
pub use domain::series::{ChartWindow, DEFAULT_CHART_WINDOW, SeriesProjection, SeriesReconciler};

// Ports (for integration tests and alternative adapters)
pub use application::ports::{
    AgentError, AgentEvent, ContractDescriptor, FeedError, FeedEvent, FeedHandle, LedgerChannels,
    LedgerConnectorPort, LiveFeedPort, QueryError, ReadingQueryPort, ReadingRecord,
    SigningAgentPort,
};

// Session engine
pub use application::session::{
    MonitorEngine, SessionCommand, SessionError, SessionExit, SessionSnapshot,
};

// Infrastructure adapters
pub use infrastructure::agent::WalletBridge;
pub use infrastructure::config::{AgentSettings, GatewaySettings, MonitorConfig};
pub use infrastructure::descriptor::{DescriptorError, load_descriptor};
pub use infrastructure::ledger::{GatewayConnector, GatewayFeedChannel, GatewayQueryChannel};
pub use infrastructure::telemetry::init_tracing;
