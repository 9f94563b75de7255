//! WebSocket provider configuration.

use std::time::Duration;

/// Configuration for a [`WsProvider`](crate::WsProvider).
#[derive(Clone, Debug)]
pub struct WsConfig {
    // URL
    /// WebSocket endpoint URL (`ws://` or `wss://`).
    pub url: String,

    // Connection
    /// Timeout for the opening handshake.
    pub connect_timeout: Duration,
    /// Maximum inbound frame size in bytes (0 = unlimited).
    pub max_message_size: usize,

    // Request handling
    /// Optional timeout for correlated requests (None = wait until disconnect).
    pub request_timeout: Option<Duration>,
    /// Maximum number of pending requests.
    pub max_pending_requests: usize,
    /// Interval for sweeping timed out pending requests.
    pub pending_cleanup_interval: Duration,
    /// Delay before retrying a flush after a failed send.
    pub flush_retry_interval: Duration,

    // Channels
    /// Capacity of the caller → actor command channel.
    pub command_channel_capacity: usize,
    /// Capacity of the transport → actor event channel.
    pub event_channel_capacity: usize,
    /// Capacity of channel-backed subscription listeners.
    pub subscription_channel_capacity: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
            max_message_size: 16 * 1024 * 1024, // 16 MB
            request_timeout: None,
            max_pending_requests: 1000,
            pending_cleanup_interval: Duration::from_secs(5),
            flush_retry_interval: Duration::from_millis(100),
            command_channel_capacity: 64,
            event_channel_capacity: 256,
            subscription_channel_capacity: 256,
        }
    }
}

impl WsConfig {
    /// Create a new configuration with the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the maximum inbound message size.
    #[must_use]
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the maximum pending requests.
    #[must_use]
    pub fn max_pending_requests(mut self, max: usize) -> Self {
        self.max_pending_requests = max;
        self
    }

    /// Set the pending request sweep interval.
    #[must_use]
    pub fn pending_cleanup_interval(mut self, interval: Duration) -> Self {
        self.pending_cleanup_interval = interval;
        self
    }

    /// Set the delay before a failed send is retried.
    #[must_use]
    pub fn flush_retry_interval(mut self, interval: Duration) -> Self {
        self.flush_retry_interval = interval;
        self
    }

    /// Set the command channel capacity.
    #[must_use]
    pub fn command_channel_capacity(mut self, capacity: usize) -> Self {
        self.command_channel_capacity = capacity;
        self
    }

    /// Set the event channel capacity.
    #[must_use]
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Set the capacity of channel-backed subscription listeners.
    #[must_use]
    pub fn subscription_channel_capacity(mut self, capacity: usize) -> Self {
        self.subscription_channel_capacity = capacity;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(format!("URL must use ws:// or wss://, got {}", self.url));
        }
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be > 0".to_string());
        }
        if self.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err("Request timeout must be > 0".to_string());
        }
        if self.pending_cleanup_interval.is_zero() {
            return Err("Pending cleanup interval must be > 0".to_string());
        }
        if self.flush_retry_interval.is_zero() {
            return Err("Flush retry interval must be > 0".to_string());
        }
        if self.max_pending_requests == 0 {
            return Err("Max pending requests must be > 0".to_string());
        }
        if self.command_channel_capacity == 0 {
            return Err("Command channel capacity must be > 0".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err("Event channel capacity must be > 0".to_string());
        }
        if self.subscription_channel_capacity == 0 {
            return Err("Subscription channel capacity must be > 0".to_string());
        }
        Ok(())
    }
}
