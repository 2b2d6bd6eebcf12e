// MIT License - Copyright (c) 2026 Peter Wright
// Relay client configuration

use std::fmt;
use std::time::Duration;

use crate::constants::{
    BODY_READ_TIMEOUT, CONNECT_TIMEOUT, DEFAULT_PARTITION, DEFAULT_RELAY_PORT, IDLE_READ_TIMEOUT,
    RECONNECT_DELAY, ZONE_OFF_DELAY,
};

/// Connection settings for the relay.
#[derive(Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Relay host name or IP address
    pub host: String,
    /// Relay TCP port (default: 3073)
    pub port: u16,
    /// Shared passphrase the session key is derived from
    pub secret: String,
    /// TCP connect timeout in milliseconds (default: 10000)
    pub connect_timeout_ms: u64,
    /// Maximum silence between frames in milliseconds (default: 300000)
    pub idle_timeout_ms: u64,
    /// Time allowed for a frame body after its length prefix (default: 30000)
    pub body_timeout_ms: u64,
    /// Fixed delay between reconnect attempts (default: 10000)
    pub reconnect_delay_ms: u64,
    /// Zone hold after close in milliseconds (default: 5000)
    pub zone_off_delay_ms: u64,
    /// Partition created on connect (default: 1)
    pub default_partition: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_RELAY_PORT,
            secret: String::new(),
            connect_timeout_ms: CONNECT_TIMEOUT.as_millis() as u64,
            idle_timeout_ms: IDLE_READ_TIMEOUT.as_millis() as u64,
            body_timeout_ms: BODY_READ_TIMEOUT.as_millis() as u64,
            reconnect_delay_ms: RECONNECT_DELAY.as_millis() as u64,
            zone_off_delay_ms: ZONE_OFF_DELAY.as_millis() as u64,
            default_partition: DEFAULT_PARTITION,
        }
    }
}

impl RelayConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder::default()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn body_timeout(&self) -> Duration {
        Duration::from_millis(self.body_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn zone_off_delay(&self) -> Duration {
        Duration::from_millis(self.zone_off_delay_ms)
    }

    /// `host:port`, for logs.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secret", &"<redacted>")
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("idle_timeout_ms", &self.idle_timeout_ms)
            .field("body_timeout_ms", &self.body_timeout_ms)
            .field("reconnect_delay_ms", &self.reconnect_delay_ms)
            .field("zone_off_delay_ms", &self.zone_off_delay_ms)
            .field("default_partition", &self.default_partition)
            .finish()
    }
}

/// Builder for RelayConfig.
#[derive(Debug, Clone, Default)]
pub struct RelayConfigBuilder {
    config: RelayConfig,
}

impl RelayConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.config.secret = secret.into();
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    pub fn idle_timeout_ms(mut self, ms: u64) -> Self {
        self.config.idle_timeout_ms = ms;
        self
    }

    pub fn body_timeout_ms(mut self, ms: u64) -> Self {
        self.config.body_timeout_ms = ms;
        self
    }

    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    pub fn zone_off_delay_ms(mut self, ms: u64) -> Self {
        self.config.zone_off_delay_ms = ms;
        self
    }

    pub fn default_partition(mut self, id: u32) -> Self {
        self.config.default_partition = id;
        self
    }

    pub fn build(self) -> RelayConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 3073);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.idle_timeout(), Duration::from_secs(300));
        assert_eq!(config.body_timeout(), Duration::from_secs(30));
        assert_eq!(config.reconnect_delay(), Duration::from_secs(10));
        assert_eq!(config.zone_off_delay(), Duration::from_secs(5));
        assert_eq!(config.default_partition, 1);
    }

    #[test]
    fn test_config_builder() {
        let config = RelayConfig::builder()
            .host("10.0.0.5")
            .port(4000)
            .secret("hunter2")
            .reconnect_delay_ms(2500)
            .default_partition(2)
            .build();
        assert_eq!(config.address(), "10.0.0.5:4000");
        assert_eq!(config.secret, "hunter2");
        assert_eq!(config.reconnect_delay(), Duration::from_millis(2500));
        assert_eq!(config.default_partition, 2);
        // Untouched fields keep their defaults
        assert_eq!(config.idle_timeout_ms, 300_000);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = RelayConfig::builder().secret("hunter2").build();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
