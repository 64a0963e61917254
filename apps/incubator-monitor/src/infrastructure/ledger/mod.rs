//! Ledger Gateway Adapters
//!
//! JSON-RPC clients for the ledger gateway: the HTTP query channel for
//! the historical backfill and the WebSocket push channel for live
//! readings. The connector binds both to one contract; the session
//! engine rebinds on every identity change, so nothing here caches
//! state across sessions.

mod feed;
pub mod messages;
mod query;

pub use feed::GatewayFeedChannel;
pub use query::GatewayQueryChannel;

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::ports::{
    ContractDescriptor, LedgerChannels, LedgerConnectorPort, QueryError,
};
use crate::infrastructure::config::GatewaySettings;

// =============================================================================
// Connector
// =============================================================================

/// Builds the query and feed channels for one contract.
#[derive(Debug, Clone)]
pub struct GatewayConnector {
    settings: GatewaySettings,
}

impl GatewayConnector {
    /// Create a connector for the configured gateway endpoints.
    #[must_use]
    pub const fn new(settings: GatewaySettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl LedgerConnectorPort for GatewayConnector {
    async fn bind(&self, descriptor: &ContractDescriptor) -> Result<LedgerChannels, QueryError> {
        let client = reqwest::Client::builder()
            .timeout(self.settings.request_timeout)
            .build()
            .map_err(|e| QueryError::Transport {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        tracing::info!(
            http_url = %self.settings.http_url,
            ws_url = %self.settings.ws_url,
            contract = %descriptor.address,
            "Ledger channels bound"
        );

        Ok(LedgerChannels {
            query: Arc::new(GatewayQueryChannel::new(
                client,
                self.settings.http_url.clone(),
                descriptor.address.clone(),
            )),
            feed: Arc::new(GatewayFeedChannel::new(
                self.settings.ws_url.clone(),
                descriptor.address.clone(),
            )),
        })
    }
}
