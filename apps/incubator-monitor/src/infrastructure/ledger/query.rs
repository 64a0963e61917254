//! Ledger Query Channel
//!
//! HTTP JSON-RPC adapter for the one-shot historical query. One POST per
//! fetch, no retries: a failed backfill surfaces to the operator, who
//! can refresh manually once the gateway is back.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::messages::{METHOD_GET_ALL_READINGS, RpcRequest, RpcResponse};
use crate::application::ports::{QueryError, ReadingQueryPort, ReadingRecord};

/// Query channel bound to one contract on one gateway.
#[derive(Debug)]
pub struct GatewayQueryChannel {
    client: reqwest::Client,
    url: String,
    contract_address: String,
    next_id: AtomicU64,
}

impl GatewayQueryChannel {
    /// Bind the channel to a gateway endpoint and contract address.
    #[must_use]
    pub fn new(client: reqwest::Client, url: String, contract_address: String) -> Self {
        Self {
            client,
            url,
            contract_address,
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl ReadingQueryPort for GatewayQueryChannel {
    async fn fetch_all_readings(&self) -> Result<Vec<ReadingRecord>, QueryError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(
            id,
            METHOD_GET_ALL_READINGS,
            serde_json::json!([self.contract_address]),
        );

        tracing::debug!(url = %self.url, id, "Historical query issued");
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| QueryError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueryError::Transport {
                message: format!("gateway answered HTTP {status}"),
            });
        }

        let envelope: RpcResponse = response.json().await.map_err(|e| QueryError::Decode {
            message: e.to_string(),
        })?;
        let result = envelope.into_result().map_err(|e| QueryError::Gateway {
            code: e.code,
            message: e.message,
        })?;

        let records: Vec<ReadingRecord> =
            serde_json::from_value(result).map_err(|e| QueryError::Decode {
                message: e.to_string(),
            })?;

        tracing::debug!(count = records.len(), "Historical query answered");
        Ok(records)
    }
}
