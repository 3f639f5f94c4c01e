// Telemetry Module
//
// This module provides:
// - Well-known span attribute names for connections, turns and snapshots
// - Initialization helpers for the tracing subscriber
// - Span name helpers

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// ============================================================================
// Attribute Names
// ============================================================================

/// Span attribute names
///
/// Span fields are declared with these literal names; the constants are used
/// when recording values after the span is created.
pub mod attrs {
    /// Identifier of the snapshot created inside the span
    pub const SNAPSHOT_ID: &str = "sessionflow.snapshot.id";
    /// Name of the action or agent that owns the snapshot
    pub const AGENT_NAME: &str = "sessionflow.agent.name";
    /// Name of the action a connection runs
    pub const ACTION_NAME: &str = "sessionflow.action.name";
    /// Connection identifier
    pub const CONNECTION_ID: &str = "sessionflow.connection.id";
    /// Session identifier
    pub const SESSION_ID: &str = "sessionflow.session.id";
    /// Zero-based index of the turn being processed
    pub const TURN_INDEX: &str = "sessionflow.turn.index";
    /// Lifecycle event that triggered a snapshot attempt
    pub const SNAPSHOT_EVENT: &str = "sessionflow.snapshot.event";
}

// ============================================================================
// Telemetry Configuration
// ============================================================================

/// Configuration for the tracing subscriber
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Log filter (e.g., "info", "sessionflow_runtime=debug")
    pub log_filter: Option<String>,
    /// Whether to emit ANSI colors
    pub ansi: bool,
    /// Whether to include the event target
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: None,
            ansi: true,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter
    /// - `SESSIONFLOW_LOG_ANSI`: "false" to disable colors
    pub fn from_env() -> Self {
        Self {
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
            ansi: std::env::var("SESSIONFLOW_LOG_ANSI")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(true),
            with_target: true,
        }
    }
}

/// Install a global fmt subscriber filtered by `config.log_filter`
///
/// Falls back to `info` when the filter is missing or invalid. Returns an error
/// when a global subscriber is already installed.
///
/// # Example
///
/// ```ignore
/// use sessionflow_runtime::telemetry::{init_tracing, TelemetryConfig};
///
/// init_tracing(TelemetryConfig::from_env())?;
/// ```
pub fn init_tracing(
    config: TelemetryConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = config
        .log_filter
        .as_ref()
        .and_then(|f| EnvFilter::try_new(f).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .with_filter(filter);

    tracing_subscriber::registry().with(fmt_layer).try_init()
}

// ============================================================================
// Span Helpers
// ============================================================================

/// Span name for a connection
///
/// Format: `bidi {action_name}`
pub fn connection_span_name(action_name: &str) -> String {
    format!("bidi {}", action_name)
}

/// Span name for one turn of a session flow
///
/// Format: `turn {agent_name} #{turn_index}`
pub fn turn_span_name(agent_name: &str, turn_index: u64) -> String {
    format!("turn {} #{}", agent_name, turn_index)
}
