//! Configuration for the client connector.

use std::time::Duration;
use tracing::warn;

/// Default defer window of the command batcher.
pub const DEFAULT_DEFER_WINDOW: Duration = Duration::from_millis(10);

/// Default maximum number of commands per batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Default connection timeout.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Configuration of a client connector and its context.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Remoting endpoint URL (e.g., "http://localhost:8080/dolphin").
    pub server_url: String,
    /// How long blind commands wait for company before they are sent.
    pub defer_window: Duration,
    /// Maximum number of commands per batch.
    pub max_batch_size: usize,
    /// Fold consecutive value changes of one attribute into one command.
    pub merge_value_changes: bool,
    /// Upper bound for blocking calls.
    pub connection_timeout: Duration,
    /// Keep a long poll outstanding for server push.
    pub push_enabled: bool,
    /// Ignore server value changes whose old value does not match ours.
    pub strict_mode: bool,
}

impl ClientConfig {
    /// Creates a configuration for the given endpoint.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            defer_window: DEFAULT_DEFER_WINDOW,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            merge_value_changes: false,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            push_enabled: true,
            strict_mode: false,
        }
    }

    /// Sets the defer window.
    pub fn with_defer_window(mut self, window: Duration) -> Self {
        self.defer_window = window;
        self
    }

    /// Sets the maximum batch size. Zero is treated as one.
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }

    /// Enables or disables value change merging.
    pub fn with_merge_value_changes(mut self, merge: bool) -> Self {
        self.merge_value_changes = merge;
        self
    }

    /// Sets the connection timeout.
    ///
    /// A zero timeout falls back to the default.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        if timeout.is_zero() {
            warn!(
                default_ms = DEFAULT_CONNECTION_TIMEOUT.as_millis() as u64,
                "connection timeout must be positive, using default"
            );
            self.connection_timeout = DEFAULT_CONNECTION_TIMEOUT;
        } else {
            self.connection_timeout = timeout;
        }
        self
    }

    /// Enables or disables server push.
    pub fn with_push_enabled(mut self, enabled: bool) -> Self {
        self.push_enabled = enabled;
        self
    }

    /// Enables or disables strict mode.
    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://localhost:8080/dolphin")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.defer_window, Duration::from_millis(10));
        assert_eq!(config.max_batch_size, 100);
        assert!(!config.merge_value_changes);
        assert_eq!(config.connection_timeout, Duration::from_secs(15));
        assert!(config.push_enabled);
        assert!(!config.strict_mode);
    }

    #[test]
    fn builder() {
        let config = ClientConfig::new("http://example.com/dolphin")
            .with_defer_window(Duration::from_millis(50))
            .with_max_batch_size(0)
            .with_merge_value_changes(true)
            .with_push_enabled(false);

        assert_eq!(config.server_url, "http://example.com/dolphin");
        assert_eq!(config.defer_window, Duration::from_millis(50));
        assert_eq!(config.max_batch_size, 1);
        assert!(config.merge_value_changes);
        assert!(!config.push_enabled);
    }

    #[test]
    fn zero_timeout_falls_back() {
        let config = ClientConfig::default().with_connection_timeout(Duration::ZERO);
        assert_eq!(config.connection_timeout, DEFAULT_CONNECTION_TIMEOUT);

        let config = ClientConfig::default().with_connection_timeout(Duration::from_secs(2));
        assert_eq!(config.connection_timeout, Duration::from_secs(2));
    }
}
