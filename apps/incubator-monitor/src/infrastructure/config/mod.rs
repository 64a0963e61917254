//! Monitor Configuration
//!
//! Configuration for the incubator monitor, loaded from environment
//! variables. Every setting has a default suited to the local dev
//! environment (Hardhat-style gateway on 8545, agent bridge on 8601),
//! so a bare `cargo run` against the dev stack needs no configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::series::DEFAULT_CHART_WINDOW;

/// Ledger gateway endpoints.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// HTTP endpoint for the query channel.
    pub http_url: String,
    /// WebSocket endpoint for the live feed.
    pub ws_url: String,
    /// Timeout for one query round trip.
    pub request_timeout: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            http_url: "http://127.0.0.1:8545".to_string(),
            ws_url: "ws://127.0.0.1:8545".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Signing agent bridge endpoint.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// WebSocket endpoint of the agent bridge.
    pub ws_url: String,
    /// Timeout for one agent call. Generous: an interactive request
    /// waits for the operator to approve.
    pub call_timeout: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8601".to_string(),
            call_timeout: Duration::from_secs(120),
        }
    }
}

/// Complete monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Path to the contract descriptor artifact.
    pub descriptor_path: PathBuf,
    /// Chart window size in points.
    pub chart_window: usize,
    /// Ledger gateway endpoints.
    pub gateway: GatewaySettings,
    /// Signing agent bridge endpoint.
    pub agent: AgentSettings,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            descriptor_path: PathBuf::from("contract_info/SensorData.json"),
            chart_window: DEFAULT_CHART_WINDOW,
            gateway: GatewaySettings::default(),
            agent: AgentSettings::default(),
        }
    }
}

impl MonitorConfig {
    /// Create configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let gateway = GatewaySettings {
            http_url: env_string(
                "SMARTINE_GATEWAY_HTTP_URL",
                &defaults.gateway.http_url,
            ),
            ws_url: env_string("SMARTINE_GATEWAY_WS_URL", &defaults.gateway.ws_url),
            request_timeout: parse_env_duration_secs(
                "SMARTINE_QUERY_TIMEOUT_SECS",
                defaults.gateway.request_timeout,
            ),
        };

        let agent = AgentSettings {
            ws_url: env_string("SMARTINE_AGENT_WS_URL", &defaults.agent.ws_url),
            call_timeout: parse_env_duration_secs(
                "SMARTINE_AGENT_TIMEOUT_SECS",
                defaults.agent.call_timeout,
            ),
        };

        Self {
            descriptor_path: PathBuf::from(env_string(
                "SMARTINE_DESCRIPTOR_PATH",
                "contract_info/SensorData.json",
            )),
            chart_window: parse_env_usize("SMARTINE_CHART_POINTS", defaults.chart_window),
            gateway,
            agent,
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}
