//! Gateway Wire Messages
//!
//! JSON-RPC 2.0 envelopes shared by the ledger gateway channels and the
//! agent bridge. Calls carry a client-assigned numeric id; pushes arrive
//! as id-less notifications.
//!
//! Response:
//!
//! ```json
//! {"jsonrpc": "2.0", "id": 3, "result": [...]}
//! {"jsonrpc": "2.0", "id": 3, "error": {"code": -32000, "message": "..."}}
//! ```
//!
//! Subscription push:
//!
//! ```json
//! {"jsonrpc": "2.0", "method": "smartine_subscription",
//!  "params": {"subscription": "0x1", "result": {...reading...}}}
//! ```

use serde::{Deserialize, Serialize};

/// Protocol version tag on every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Bulk historical query method.
pub const METHOD_GET_ALL_READINGS: &str = "smartine_getAllReadings";

/// Subscription open method.
pub const METHOD_SUBSCRIBE: &str = "smartine_subscribe";

/// Subscription close method.
pub const METHOD_UNSUBSCRIBE: &str = "smartine_unsubscribe";

/// Notification method carrying subscription pushes.
pub const NOTIFICATION_SUBSCRIPTION: &str = "smartine_subscription";

/// Event name subscribed to for live readings.
pub const EVENT_NEW_READING: &str = "NewSensorReading";

// =============================================================================
// Envelopes
// =============================================================================

/// Outgoing call.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: &'static str,
    /// Client-assigned correlation id.
    pub id: u64,
    /// Method name.
    pub method: String,
    /// Positional parameters.
    pub params: serde_json::Value,
}

impl RpcRequest {
    /// Build a call with positional parameters.
    #[must_use]
    pub fn new(id: u64, method: &str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// Error object inside a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    /// Gateway error code.
    pub code: i64,
    /// Gateway error message.
    pub message: String,
}

/// Incoming answer to a call.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    /// Correlation id; absent on protocol-level failures.
    #[serde(default)]
    pub id: Option<u64>,
    /// Success payload.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Failure payload.
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    /// Collapse into the success payload or the error object.
    ///
    /// # Errors
    ///
    /// Returns the gateway error object, or a synthetic one when the
    /// response carried neither result nor error.
    pub fn into_result(self) -> Result<serde_json::Value, RpcErrorObject> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.result.ok_or(RpcErrorObject {
            code: 0,
            message: "response carried neither result nor error".to_string(),
        })
    }
}

/// Incoming id-less push.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcNotification {
    /// Notification method.
    pub method: String,
    /// Notification payload.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Payload of a [`NOTIFICATION_SUBSCRIPTION`] push.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionParams {
    /// Subscription this push belongs to.
    pub subscription: String,
    /// The pushed record.
    pub result: serde_json::Value,
}

// =============================================================================
// Frame Classification
// =============================================================================

/// One decoded incoming frame.
#[derive(Debug, Clone)]
pub enum RpcFrame {
    /// Answer to a call.
    Response(RpcResponse),
    /// Push without an id.
    Notification(RpcNotification),
}

/// Classify a raw text frame by shape: a `method` key marks a
/// notification, anything else decodes as a response.
///
/// # Errors
///
/// Returns the JSON error when the frame is not an object of either
/// shape.
pub fn parse_frame(text: &str) -> Result<RpcFrame, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if value.get("method").is_some() {
        let notification: RpcNotification = serde_json::from_value(value)?;
        Ok(RpcFrame::Notification(notification))
    } else {
        let response: RpcResponse = serde_json::from_value(value)?;
        Ok(RpcFrame::Response(response))
    }
}
