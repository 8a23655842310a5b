//! REST status probe (`GET /api/v2/`).

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use frameart_protocol::constants::PROBE_TIMEOUT;
use frameart_protocol::types::{DeviceInfo, DeviceStatus};
use tracing::debug;

use crate::config::ArtConfig;
use crate::error::ProbeError;

/// HTTP probe of the device status endpoint.
///
/// Uses a caller-supplied `reqwest::Client` when given one; otherwise
/// builds its own on first use and drops it on [`release`](Self::release).
pub struct DeviceProbe {
    url: String,
    timeout: Duration,
    shared: Option<reqwest::Client>,
    owned: Mutex<Option<reqwest::Client>>,
}

impl DeviceProbe {
    pub fn new(config: &ArtConfig) -> Self {
        Self {
            url: config.rest_url(),
            timeout: PROBE_TIMEOUT,
            shared: None,
            owned: Mutex::new(None),
        }
    }

    pub fn with_client(config: &ArtConfig, client: reqwest::Client) -> Self {
        Self {
            shared: Some(client),
            ..Self::new(config)
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn client(&self) -> Result<reqwest::Client, ProbeError> {
        if let Some(client) = &self.shared {
            return Ok(client.clone());
        }
        let mut owned = self.owned.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = owned.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        *owned = Some(client.clone());
        Ok(client)
    }

    /// Drops the internally built client. A shared client is kept.
    pub fn release(&self) {
        let released = self
            .owned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            debug!(url = %self.url, "released probe HTTP client");
        }
    }

    pub fn holds_own_client(&self) -> bool {
        self.owned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Fetches the `device` object of the status endpoint.
    pub async fn status(&self) -> Result<DeviceInfo, ProbeError> {
        let resp = self
            .client()?
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status));
        }
        let body: DeviceStatus = resp.json().await?;
        Ok(body.device)
    }
}
