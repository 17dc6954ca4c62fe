//! Configuration for PPT connections

use crate::config::{env_duration_secs, env_parse};
use std::time::Duration;

/// Connection-level settings for a [`Client`](crate::ppt::Client).
///
/// There is no read timeout unless one is configured: a BES that stops
/// responding suspends the caller indefinitely.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// Timeout for establishing the TCP connection
    pub connect_timeout: Duration,

    /// Optional bound on reading one response message (None = wait forever)
    pub read_timeout: Option<Duration>,

    /// How often an end-of-stream before the handshake reply is retried
    pub handshake_eof_retries: u32,

    /// Delay between handshake retries
    pub handshake_retry_delay: Duration,

    /// Size of the buffer used to move chunk payloads into sinks
    pub read_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: None,
            handshake_eof_retries: 10,
            handshake_retry_delay: Duration::from_secs(1),
            read_buffer_size: 10_240,
        }
    }
}

impl TransportConfig {
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::default()
    }

    /// Load from `BES_CONNECT_TIMEOUT`, `BES_READ_TIMEOUT`,
    /// `BES_HANDSHAKE_RETRIES` and `BES_HANDSHAKE_RETRY_DELAY` (seconds).
    pub fn from_env() -> Self {
        crate::config::load_dotenv();
        let defaults = Self::default();
        Self {
            connect_timeout: env_duration_secs("BES_CONNECT_TIMEOUT")
                .unwrap_or(defaults.connect_timeout),
            read_timeout: env_duration_secs("BES_READ_TIMEOUT").or(defaults.read_timeout),
            handshake_eof_retries: env_parse("BES_HANDSHAKE_RETRIES")
                .unwrap_or(defaults.handshake_eof_retries),
            handshake_retry_delay: env_duration_secs("BES_HANDSHAKE_RETRY_DELAY")
                .unwrap_or(defaults.handshake_retry_delay),
            read_buffer_size: defaults.read_buffer_size,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be greater than 0".to_string());
        }
        if self.read_buffer_size == 0 {
            return Err("read_buffer_size must be greater than 0".to_string());
        }
        if matches!(self.read_timeout, Some(t) if t.is_zero()) {
            return Err("read_timeout must be greater than 0 when set".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct TransportConfigBuilder {
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    handshake_eof_retries: Option<u32>,
    handshake_retry_delay: Option<Duration>,
    read_buffer_size: Option<usize>,
}

impl TransportConfigBuilder {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn handshake_eof_retries(mut self, retries: u32) -> Self {
        self.handshake_eof_retries = Some(retries);
        self
    }

    pub fn handshake_retry_delay(mut self, delay: Duration) -> Self {
        self.handshake_retry_delay = Some(delay);
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = Some(size);
        self
    }

    pub fn build(self) -> TransportConfig {
        let defaults = TransportConfig::default();

        TransportConfig {
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            read_timeout: self.read_timeout.or(defaults.read_timeout),
            handshake_eof_retries: self
                .handshake_eof_retries
                .unwrap_or(defaults.handshake_eof_retries),
            handshake_retry_delay: self
                .handshake_retry_delay
                .unwrap_or(defaults.handshake_retry_delay),
            read_buffer_size: self.read_buffer_size.unwrap_or(defaults.read_buffer_size),
        }
    }
}
