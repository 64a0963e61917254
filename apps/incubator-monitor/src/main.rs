//! Incubator Monitor Binary
//!
//! Starts the Smartine incubator telemetry console.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p incubator-monitor
//! ```
//!
//! # Environment Variables
//!
//! - `SMARTINE_DESCRIPTOR_PATH`: Contract descriptor artifact
//!   (default: contract_info/SensorData.json)
//! - `SMARTINE_GATEWAY_HTTP_URL`: Ledger gateway HTTP endpoint
//!   (default: <http://127.0.0.1:8545>)
//! - `SMARTINE_GATEWAY_WS_URL`: Ledger gateway WebSocket endpoint
//!   (default: ws://127.0.0.1:8545)
//! - `SMARTINE_AGENT_WS_URL`: Signing agent endpoint (default: ws://127.0.0.1:8601)
//! - `SMARTINE_QUERY_TIMEOUT_SECS`: Historical query timeout (default: 10)
//! - `SMARTINE_AGENT_TIMEOUT_SECS`: Agent call timeout (default: 120)
//! - `SMARTINE_CHART_POINTS`: Chart window size (default: 20)
//! - `SMARTINE_LOG_ANSI`: Set to "false" to disable ANSI colors
//! - `RUST_LOG`: Log level (default: info)
//!
//! # Commands
//!
//! The monitor reads one command per stdin line:
//! `c` connect, `r` refresh history, `q` quit.

use std::sync::Arc;

use incubator_monitor::application::session::{
    MonitorEngine, SessionCommand, SessionExit, SessionSnapshot,
};
use incubator_monitor::infrastructure::agent::WalletBridge;
use incubator_monitor::infrastructure::config::MonitorConfig;
use incubator_monitor::infrastructure::console;
use incubator_monitor::infrastructure::descriptor::load_descriptor;
use incubator_monitor::infrastructure::ledger::GatewayConnector;
use incubator_monitor::infrastructure::telemetry;
use tokio::io::AsyncBufReadExt;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Commands queued from stdin towards the engine.
const COMMAND_BUFFER: usize = 8;

#[tokio::main]
#[allow(clippy::expect_used)]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();
    telemetry::init_tracing();

    tracing::info!("Starting incubator monitor");

    let config = MonitorConfig::from_env();
    log_config(&config);

    let shutdown = CancellationToken::new();
    let (command_tx, mut command_rx) = mpsc::channel::<SessionCommand>(COMMAND_BUFFER);
    let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());

    // The view, the command reader and the signal listener outlive any
    // single session generation.
    tokio::spawn(console::run_view(snapshot_rx, shutdown.clone()));
    tokio::spawn(read_commands(command_tx, shutdown.clone()));
    tokio::spawn(await_shutdown(shutdown.clone()));

    // One engine generation per ledger network. A network switch tears
    // the session down completely and builds a fresh one, the same
    // recovery a page reload used to provide.
    loop {
        let descriptor = load_descriptor(&config.descriptor_path)?;
        let agent = Arc::new(WalletBridge::new(config.agent.clone()));
        let connector = Arc::new(GatewayConnector::new(config.gateway.clone()));

        let mut engine = MonitorEngine::new(
            agent,
            connector,
            descriptor,
            config.chart_window,
            snapshot_tx.clone(),
            shutdown.clone(),
        );

        match engine.run(&mut command_rx).await {
            SessionExit::ChainChanged(chain) => {
                tracing::warn!(chain = %chain, "Ledger network changed, rebuilding session");
            }
            SessionExit::Shutdown => break,
        }
    }

    tracing::info!("Incubator monitor stopped");
    Ok(())
}

/// Read one command per stdin line until EOF, quit or cancellation.
async fn read_commands(commands: mpsc::Sender<SessionCommand>, cancel: CancellationToken) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => return,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(input)) => {
                let command = match input.trim() {
                    "c" | "connect" => Some(SessionCommand::Connect),
                    "r" | "refresh" => Some(SessionCommand::RefreshHistory),
                    "q" | "quit" => {
                        cancel.cancel();
                        return;
                    }
                    "" => None,
                    other => {
                        tracing::warn!(input = %other, "Unknown command, use c / r / q");
                        None
                    }
                };
                if let Some(command) = command
                    && commands.send(command).await.is_err()
                {
                    return;
                }
            }
            Ok(None) => {
                tracing::debug!("Stdin closed, commands disabled");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Stdin read failed, commands disabled");
                return;
            }
        }
    }
}

/// Load .env file from the current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &MonitorConfig) {
    tracing::info!(
        descriptor = %config.descriptor_path.display(),
        chart_window = config.chart_window,
        gateway_http = %config.gateway.http_url,
        gateway_ws = %config.gateway.ws_url,
        agent_ws = %config.agent.ws_url,
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }

    shutdown.cancel();
}
