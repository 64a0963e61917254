//! Ledger Gateway Ports (Driven Ports)
//!
//! Interfaces to the ledger gateway's two channels: the request/response
//! query channel used for the historical backfill and the push channel
//! delivering live readings. Both are bound to one contract through the
//! connector port; the session engine rebinds them on every identity
//! change so no channel outlives the session epoch that created it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::reading::Reading;

// =============================================================================
// Contract Descriptor
// =============================================================================

/// Identity of the deployed contract, as written by the deployment
/// tooling. The ABI is carried opaquely for channel binding; nothing in
/// this crate interprets it beyond checking its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDescriptor {
    /// Ledger address of the contract.
    #[serde(default)]
    pub address: String,
    /// Contract ABI as the tooling emitted it.
    #[serde(default)]
    pub abi: serde_json::Value,
}

// =============================================================================
// Wire Records
// =============================================================================

/// One reading exactly as the gateway delivers it.
///
/// Query results and push notifications share this shape:
///
/// ```json
/// {
///   "timestamp": 1700000000,
///   "temperature": 37.0,
///   "humidity": 61.0,
///   "sensorId": "dht22-1",
///   "location": "box-a",
///   "processStage": "Hari ke-5"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingRecord {
    /// Capture time as Unix seconds.
    pub timestamp: i64,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Reporting sensor unit.
    pub sensor_id: String,
    /// Sensor placement.
    pub location: String,
    /// Stage label recorded by the pipeline.
    pub process_stage: String,
}

impl ReadingRecord {
    /// Normalize into the domain reading.
    ///
    /// Timestamps outside the representable range collapse to the Unix
    /// epoch rather than failing; the record is still worth showing.
    #[must_use]
    pub fn into_reading(self) -> Reading {
        let timestamp =
            DateTime::from_timestamp(self.timestamp, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Reading::new(
            timestamp,
            self.temperature,
            self.humidity,
            self.sensor_id,
            self.location,
            self.process_stage,
        )
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Query channel error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryError {
    /// The gateway could not be reached.
    #[error("Ledger gateway unreachable: {message}")]
    Transport {
        /// Error details.
        message: String,
    },

    /// The gateway answered with an error.
    #[error("Ledger gateway rejected the query ({code}): {message}")]
    Gateway {
        /// Gateway error code.
        code: i64,
        /// Gateway error message.
        message: String,
    },

    /// The gateway answered with something undecodable.
    #[error("Ledger gateway response undecodable: {message}")]
    Decode {
        /// Error details.
        message: String,
    },
}

/// Live feed establishment error.
///
/// Failures after establishment are delivered through the sink as
/// [`FeedEvent::Lost`], never as an error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FeedError {
    /// The push endpoint could not be reached.
    #[error("Live feed endpoint unreachable: {message}")]
    Connect {
        /// Error details.
        message: String,
    },

    /// The subscription request was not accepted.
    #[error("Live feed subscription rejected: {message}")]
    Handshake {
        /// Error details.
        message: String,
    },
}

// =============================================================================
// Feed Events and Handle
// =============================================================================

/// Event pushed through a live feed sink.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// One new reading, in transport delivery order.
    Reading(ReadingRecord),
    /// The feed died. Delivered at most once, after which the sink closes.
    Lost {
        /// Human-readable cause.
        reason: String,
    },
}

/// Cancellation handle for one live subscription.
///
/// `cancel` deregisters the subscription and releases the underlying
/// socket; calling it again is a no-op. Dropping the handle cancels too,
/// so a replaced subscription can never leak its socket task.
#[derive(Debug)]
pub struct FeedHandle {
    token: CancellationToken,
}

impl FeedHandle {
    /// Wrap the token that stops the subscription's socket task.
    #[must_use]
    pub const fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Stop the subscription. Safe to call any number of times.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the subscription has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

// =============================================================================
// Ports
// =============================================================================

/// Both ledger channels bound to one contract.
#[derive(Clone)]
pub struct LedgerChannels {
    /// Historical query channel.
    pub query: Arc<dyn ReadingQueryPort>,
    /// Live push channel.
    pub feed: Arc<dyn LiveFeedPort>,
}

/// Port that binds ledger channels to a contract descriptor.
///
/// Binding constructs clients; it performs no ledger calls. A bind
/// failure means the descriptor or endpoint configuration is unusable
/// and classifies as a query failure.
#[async_trait]
pub trait LedgerConnectorPort: Send + Sync {
    /// Bind the query and push channels to the given contract.
    async fn bind(&self, descriptor: &ContractDescriptor) -> Result<LedgerChannels, QueryError>;
}

/// Port for the one-shot historical query.
#[async_trait]
pub trait ReadingQueryPort: Send + Sync {
    /// Fetch every recorded reading, oldest first, without gaps.
    async fn fetch_all_readings(&self) -> Result<Vec<ReadingRecord>, QueryError>;
}

/// Port for the live push subscription.
#[async_trait]
pub trait LiveFeedPort: Send + Sync {
    /// Open a subscription delivering into `sink`.
    ///
    /// The returned handle is the only way to stop delivery. After a
    /// transport failure the adapter sends [`FeedEvent::Lost`] once and
    /// closes the sink; it never reconnects on its own.
    async fn subscribe(&self, sink: mpsc::Sender<FeedEvent>) -> Result<FeedHandle, FeedError>;
}
