//! Tracing Setup
//!
//! Console tracing for an operator workstation process.
//!
//! # Configuration
//!
//! - `RUST_LOG`: standard env-filter directives (default: `info`)
//! - `SMARTINE_LOG_ANSI`: set to `false` to disable colored output

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber.
///
/// # Panics
///
/// Panics if a global subscriber is already set; call once from `main`.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let ansi = std::env::var("SMARTINE_LOG_ANSI")
        .map(|v| v != "false")
        .unwrap_or(true);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(ansi)
        .init();
}
