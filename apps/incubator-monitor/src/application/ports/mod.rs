//! Application Ports (Driven)
//!
//! Ports define interfaces for the external systems the session engine
//! depends on: the operator's signing agent and the ledger gateway's
//! query and subscription channels. The infrastructure layer provides
//! the implementations.

mod agent_port;
mod ledger_port;

pub use agent_port::{AgentError, AgentEvent, SigningAgentPort};
pub use ledger_port::{
    ContractDescriptor, FeedError, FeedEvent, FeedHandle, LedgerChannels, LedgerConnectorPort,
    LiveFeedPort, QueryError, ReadingQueryPort, ReadingRecord,
};
