// Runtime configuration
//
// RuntimeConfig can be:
// - Created directly (defaults: unbuffered channels, lenient snapshots)
// - Loaded from environment variables via `from_env`

use serde::{Deserialize, Serialize};

/// Environment variable for the default channel capacity
pub const ENV_CHANNEL_CAPACITY: &str = "SESSIONFLOW_CHANNEL_CAPACITY";

/// Environment variable toggling strict snapshot failures
pub const ENV_STRICT_SNAPSHOTS: &str = "SESSIONFLOW_STRICT_SNAPSHOTS";

/// Configuration shared by actions and session flows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Capacity of the inbound and outbound channels.
    ///
    /// `0` means unbuffered: `send()` waits until the worker takes the value
    /// and the worker's emit waits until a `receive()` view reads it.
    #[serde(default)]
    pub channel_capacity: usize,

    /// Treat snapshot store failures on the policy path as fatal.
    ///
    /// When false, the failure is logged and the turn continues without a snapshot.
    #[serde(default)]
    pub strict_snapshots: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 0,
            strict_snapshots: false,
        }
    }
}

impl RuntimeConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `SESSIONFLOW_CHANNEL_CAPACITY`: channel capacity (default: 0, unbuffered)
    /// - `SESSIONFLOW_STRICT_SNAPSHOTS`: "true" to fail connections on store errors
    pub fn from_env() -> Self {
        let channel_capacity = std::env::var(ENV_CHANNEL_CAPACITY)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);

        let strict_snapshots = std::env::var(ENV_STRICT_SNAPSHOTS)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            channel_capacity,
            strict_snapshots,
        }
    }

    /// Set the channel capacity (0 = unbuffered)
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set strict snapshot failure handling
    pub fn with_strict_snapshots(mut self, strict: bool) -> Self {
        self.strict_snapshots = strict;
        self
    }

    /// Whether channels use rendezvous hand-off
    pub fn is_unbuffered(&self) -> bool {
        self.channel_capacity == 0
    }
}
