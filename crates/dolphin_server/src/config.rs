//! Server configuration.

use dolphin_protocol::DEFAULT_ENDPOINT;
use std::net::SocketAddr;
use std::time::Duration;

/// Default maximum time a long poll blocks.
pub const DEFAULT_MAX_POLL_TIME: Duration = Duration::from_secs(5);

/// Default bound on beans removed by one garbage collection pass.
pub const DEFAULT_GC_MAX_REMOVALS: usize = 10_000;

/// Default maximum number of concurrent sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

/// Default idle time after which a session expires.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Configuration for the Dolphin server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Path of the remoting endpoint.
    pub endpoint_path: String,
    /// Maximum time a long poll blocks waiting for tasks.
    pub max_poll_time: Duration,
    /// Whether garbage collection runs on every long poll.
    pub use_gc: bool,
    /// Maximum number of beans removed by one garbage collection pass.
    pub gc_max_removals_per_pass: usize,
    /// Maximum number of concurrent sessions.
    pub max_sessions: usize,
    /// Idle time after which a session is discarded.
    pub session_timeout: Duration,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            endpoint_path: DEFAULT_ENDPOINT.to_string(),
            max_poll_time: DEFAULT_MAX_POLL_TIME,
            use_gc: true,
            gc_max_removals_per_pass: DEFAULT_GC_MAX_REMOVALS,
            max_sessions: DEFAULT_MAX_SESSIONS,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }

    /// Sets the endpoint path.
    pub fn with_endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.endpoint_path = path.into();
        self
    }

    /// Sets the maximum long-poll time.
    pub fn with_max_poll_time(mut self, time: Duration) -> Self {
        self.max_poll_time = time;
        self
    }

    /// Enables or disables garbage collection.
    pub fn with_gc(mut self, enabled: bool) -> Self {
        self.use_gc = enabled;
        self
    }

    /// Sets the per-pass removal bound of the garbage collector.
    pub fn with_gc_max_removals_per_pass(mut self, max: usize) -> Self {
        self.gc_max_removals_per_pass = max.max(1);
        self
    }

    /// Sets the maximum number of concurrent sessions.
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Sets the idle time after which a session expires.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}
