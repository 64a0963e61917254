//! Signing Agent Port (Driven Port)
//!
//! Interface to the operator's signing agent, the wallet service that
//! identifies and authorizes the viewing session. The agent is probed
//! silently at startup, asked interactively on an explicit connect, and
//! pushes notifications when the operator switches accounts or networks.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::connection::{AccountAddress, ChainId};

/// Notification pushed by the signing agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// The granted account set changed. Empty means access was revoked.
    AccountsChanged(Vec<AccountAddress>),
    /// The agent switched to a different ledger network.
    ChainChanged(ChainId),
}

/// Signing agent error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    /// The agent endpoint could not be reached or dropped mid-call.
    #[error("Signing agent unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },

    /// The operator rejected the identity request.
    #[error("Signing agent denied the connection request")]
    Denied,

    /// The agent answered with something the protocol does not allow.
    #[error("Signing agent protocol violation: {message}")]
    Protocol {
        /// Error details.
        message: String,
    },
}

/// Port to the operator's signing agent.
///
/// A failed call never poisons the port; every method may be retried
/// once the agent is reachable again.
#[async_trait]
pub trait SigningAgentPort: Send + Sync {
    /// Accounts the agent has already granted, without prompting.
    ///
    /// Returns an empty list when the agent is reachable but no account
    /// is exposed to this session yet.
    async fn current_accounts(&self) -> Result<Vec<AccountAddress>, AgentError>;

    /// Ask the operator to grant access, prompting if necessary.
    ///
    /// Returns the granted accounts, primary first. An empty grant is
    /// possible and treated by the caller as no identity.
    async fn request_accounts(&self) -> Result<Vec<AccountAddress>, AgentError>;

    /// Identity of the ledger network the agent is bound to.
    async fn chain_id(&self) -> Result<ChainId, AgentError>;

    /// Subscribe to account and network change notifications.
    ///
    /// Each call returns an independent receiver positioned at the next
    /// event.
    fn notifications(&self) -> broadcast::Receiver<AgentEvent>;
}
