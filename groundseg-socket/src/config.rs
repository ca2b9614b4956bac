//! Client configuration.

use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket address (`ws://` or `wss://`)
    pub address: String,
    /// Cookie container the session id is read from
    pub session_cookie: String,
    /// Cookie name holding the session id
    pub session_key: String,
    /// Length of generated request ids
    pub request_id_len: usize,
    /// Fixed delay between a close and the next connection attempt
    pub reconnect_delay: Duration,
    /// Consecutive failed attempts before giving up (None = retry forever)
    pub max_reconnect_attempts: Option<u32>,
    /// How long a send waits for its acknowledgment (None = forever)
    pub ack_timeout: Option<Duration>,
    /// Lifecycle event channel capacity
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "ws://127.0.0.1:3000/ws".to_string(),
            session_cookie: String::new(),
            session_key: "sessionid".to_string(),
            request_id_len: 16,
            reconnect_delay: Duration::from_millis(1000),
            max_reconnect_attempts: None,
            ack_timeout: None,
            event_capacity: 256,
        }
    }
}

impl ClientConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = cookie.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = Some(timeout);
        self
    }
}
