//! Connection Lifecycle States
//!
//! The session's link to the signing agent moves through a small state
//! machine. The session engine owns the transitions; this module owns
//! the states themselves and the identity value they guard.
//!
//! ```text
//! Unresolved -> Disconnected -> Connecting -> Connected <-> Degraded
//!                    ^                             |
//!                    +--- identity lost / revoked -+
//! ```
//!
//! `Degraded` is entered from `Connected` when the live feed drops while
//! the query channel still works; historical refresh stays available there.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account address as reported by the signing agent.
pub type AccountAddress = String;

/// Network identity of the ledger the session is bound to.
pub type ChainId = String;

/// Lifecycle of the session's link to the signing agent and ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Agent presence not yet probed.
    Unresolved,
    /// No identity bound; nothing fetched or subscribed.
    Disconnected,
    /// Identity request or channel construction in flight.
    Connecting,
    /// Identity bound, both channels live.
    Connected,
    /// Identity bound, query channel live, live feed lost.
    Degraded,
}

impl ConnectionState {
    /// Whether an identity is currently bound to the session.
    #[must_use]
    pub const fn has_identity(self) -> bool {
        matches!(self, Self::Connected | Self::Degraded)
    }

    /// Whether a historical refresh may be issued in this state.
    #[must_use]
    pub const fn can_query(self) -> bool {
        self.has_identity()
    }

    /// Short operator-facing label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unresolved => "resolving",
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Degraded => "degraded",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The identity the signing agent granted to this session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    /// Primary account selected in the agent.
    pub account: AccountAddress,
}

impl SessionIdentity {
    /// Create an identity from the agent's primary account.
    #[must_use]
    pub const fn new(account: AccountAddress) -> Self {
        Self { account }
    }

    /// Abbreviated display form: leading 6 and trailing 4 characters.
    #[must_use]
    pub fn short_form(&self) -> String {
        let addr = self.account.as_str();
        if addr.chars().count() <= 10 {
            return addr.to_string();
        }
        let head: String = addr.chars().take(6).collect();
        let tail_start = addr.chars().count() - 4;
        let tail: String = addr.chars().skip(tail_start).collect();
        format!("{head}...{tail}")
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_form())
    }
}
