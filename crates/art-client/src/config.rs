//! Connection settings for an [`ArtClient`](crate::ArtClient).

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use frameart_data_channel::SideChannel;
use frameart_protocol::constants::{ART_ENDPOINT, DEFAULT_TIMEOUT, REST_PORT, TLS_PORT};

/// Display name announced to the device when none is configured.
pub const DEFAULT_CLIENT_NAME: &str = "FrameArt";

/// Linear retry schedule for store-content thumbnail transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay unit; attempt `n` waits `n * base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.max(1))
    }
}

/// Settings for one device.
#[derive(Debug, Clone)]
pub struct ArtConfig {
    pub host: String,
    /// Control port: 8002 (`wss://`, the default) or 8001 (`ws://`).
    pub port: u16,
    /// Pairing token, only sent on the TLS port.
    pub token: Option<String>,
    pub name: String,
    /// Connect and handshake budget; also the default request timeout.
    pub timeout: Duration,
    pub rest_port: u16,
    pub store_retry: RetryPolicy,
    pub side_channel: SideChannel,
}

impl ArtConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: TLS_PORT,
            token: None,
            name: DEFAULT_CLIENT_NAME.into(),
            timeout: DEFAULT_TIMEOUT,
            rest_port: REST_PORT,
            store_retry: RetryPolicy::default(),
            side_channel: SideChannel::default(),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn rest_port(mut self, port: u16) -> Self {
        self.rest_port = port;
        self
    }

    pub fn store_retry(mut self, policy: RetryPolicy) -> Self {
        self.store_retry = policy;
        self
    }

    pub fn side_channel(mut self, side_channel: SideChannel) -> Self {
        self.side_channel = side_channel;
        self
    }

    /// Only the TLS port speaks `wss://`.
    pub fn is_secure(&self) -> bool {
        self.port == TLS_PORT
    }

    /// Control-channel URL. The name is base64 encoded without further
    /// escaping, which is what devices expect.
    pub fn websocket_url(&self) -> String {
        let scheme = if self.is_secure() { "wss" } else { "ws" };
        let name = STANDARD.encode(self.name.as_bytes());
        let mut url = format!(
            "{scheme}://{}:{}/api/v2/channels/{ART_ENDPOINT}?name={name}",
            self.host, self.port
        );
        if self.is_secure()
            && let Some(token) = self.token.as_deref().filter(|t| !t.is_empty())
        {
            url.push_str("&token=");
            url.push_str(token);
        }
        url
    }

    /// URL of the REST status endpoint.
    pub fn rest_url(&self) -> String {
        format!("http://{}:{}/api/v2/", self.host, self.rest_port)
    }
}

impl Default for ArtConfig {
    fn default() -> Self {
        Self::new("127.0.0.1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frameart_protocol::constants::PLAIN_PORT;

    #[test]
    fn plain_url_has_no_token() {
        let cfg = ArtConfig::new("192.168.1.50").port(PLAIN_PORT).token("secret").name("Test");
        assert_eq!(
            cfg.websocket_url(),
            "ws://192.168.1.50:8001/api/v2/channels/com.samsung.art-app?name=VGVzdA=="
        );
        assert!(!cfg.is_secure());
    }

    #[test]
    fn tls_url_carries_token() {
        let cfg = ArtConfig::new("tv.local").token("12345678").name("Test");
        assert_eq!(
            cfg.websocket_url(),
            "wss://tv.local:8002/api/v2/channels/com.samsung.art-app?name=VGVzdA==&token=12345678"
        );
    }

    #[test]
    fn empty_token_is_omitted() {
        let cfg = ArtConfig::new("tv.local").token("");
        assert!(!cfg.websocket_url().contains("token="));
    }

    #[test]
    fn default_is_tls() {
        let cfg = ArtConfig::default();
        assert_eq!(cfg.port, ArtConfig::new("tv.local").port);
        assert_eq!(cfg.port, TLS_PORT);
        assert!(cfg.is_secure());
    }

    #[test]
    fn rest_url() {
        let cfg = ArtConfig::new("10.0.0.2");
        assert_eq!(cfg.rest_url(), "http://10.0.0.2:8001/api/v2/");
    }

    #[test]
    fn retry_delay_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(RetryPolicy::none().delay_for_attempt(3), Duration::ZERO);
    }
}
