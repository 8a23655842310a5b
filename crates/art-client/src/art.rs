//! Art operation facade.
//!
//! Every verb opens the control channel on demand and resolves to a plain
//! value: `false`, `None` or an empty collection when the device did not
//! answer usefully. Failures are logged, never raised.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use frameart_protocol::constants::{EVENT_FAVORITE_CHANGED, LIST_TIMEOUT};
use frameart_protocol::{
    ArtMode, ArtRequest, ContentItem, CurrentArtwork, DeviceInfo, MatteList, RequestKind,
    ServiceMessage, SlideshowConfig,
};

use crate::channel::ControlChannel;
use crate::config::ArtConfig;
use crate::error::{ChannelError, RequestError};
use crate::probe::DeviceProbe;

/// Client for one device's art app.
pub struct ArtClient {
    pub(crate) channel: ControlChannel,
    pub(crate) probe: DeviceProbe,
    /// Cancels in-flight side-channel transfers on close.
    transfers: Mutex<CancellationToken>,
}

impl ArtClient {
    pub fn new(config: ArtConfig) -> Self {
        Self {
            probe: DeviceProbe::new(&config),
            channel: ControlChannel::new(config),
            transfers: Mutex::new(CancellationToken::new()),
        }
    }

    /// Uses `http` for status probes. The client is never released by
    /// [`close`](Self::close).
    pub fn with_http_client(config: ArtConfig, http: reqwest::Client) -> Self {
        Self {
            probe: DeviceProbe::with_client(&config, http),
            channel: ControlChannel::new(config),
            transfers: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn config(&self) -> &ArtConfig {
        self.channel.config()
    }

    pub fn channel(&self) -> &ControlChannel {
        &self.channel
    }

    pub fn probe(&self) -> &DeviceProbe {
        &self.probe
    }

    /// Opens the control channel now instead of on the first verb.
    pub async fn open(&self) -> Result<(), ChannelError> {
        self.channel.open().await
    }

    /// Closes the channel, aborts transfers, and releases the owned HTTP
    /// client. The next verb reopens.
    pub async fn close(&self) {
        let previous = {
            let mut token = self.transfers.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *token, CancellationToken::new())
        };
        previous.cancel();
        self.channel.close().await;
        self.probe.release();
    }

    pub(crate) fn transfer_token(&self) -> CancellationToken {
        self.transfers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cached art mode, as last reported by the device.
    pub fn art_mode(&self) -> Option<ArtMode> {
        self.channel.art_mode()
    }

    pub fn subscribe_art_mode(&self) -> watch::Receiver<Option<ArtMode>> {
        self.channel.subscribe_art_mode()
    }

    /// Sends `request` and logs instead of returning the failure.
    pub(crate) async fn call(
        &self,
        request: ArtRequest,
        wait_for: Option<&str>,
        timeout: Duration,
    ) -> Option<ServiceMessage> {
        let kind = request.kind();
        match self.channel.request(request, wait_for, timeout).await {
            Ok(msg) => Some(msg),
            Err(e) => {
                debug!(request = %kind, error = %e, "request failed");
                None
            }
        }
    }

    async fn simple(&self, request: ArtRequest) -> Option<ServiceMessage> {
        self.call(request, None, self.config().timeout).await
    }

    // ---- REST ----

    pub async fn device_info(&self) -> Option<DeviceInfo> {
        match self.probe.status().await {
            Ok(info) => Some(info),
            Err(e) => {
                debug!(url = %self.probe.url(), error = %e, "status probe failed");
                None
            }
        }
    }

    /// Whether the device advertises Frame TV support.
    pub async fn supported(&self) -> bool {
        self.device_info()
            .await
            .is_some_and(|info| info.supports_art_mode())
    }

    pub async fn is_on(&self) -> bool {
        self.device_info()
            .await
            .is_some_and(|info| info.is_powered_on())
    }

    /// Powered on and last seen in art mode.
    pub async fn is_artmode(&self) -> bool {
        self.is_on().await && self.art_mode() == Some(ArtMode::On)
    }

    // ---- Content ----

    pub async fn get_api_version(&self) -> Option<String> {
        let msg = match self.simple(ArtRequest::new(RequestKind::GetApiVersion)).await {
            Some(msg) => msg,
            None => self.simple(ArtRequest::new(RequestKind::ApiVersion)).await?,
        };
        msg.get_str("version").map(str::to_owned)
    }

    /// Content list, optionally restricted to one category.
    pub async fn available(&self, category: Option<&str>) -> Vec<ContentItem> {
        let request = ArtRequest::new(RequestKind::GetContentList).with("category", category);
        let Some(msg) = self.call(request, None, LIST_TIMEOUT).await else {
            return Vec::new();
        };
        let items: Vec<ContentItem> = decode_or_default(&msg, "content_list");
        match category {
            Some(category) => items
                .into_iter()
                .filter(|item| item.category_id.as_deref() == Some(category))
                .collect(),
            None => items,
        }
    }

    pub async fn get_current(&self) -> Option<CurrentArtwork> {
        let msg = self
            .simple(ArtRequest::new(RequestKind::GetCurrentArtwork))
            .await?;
        match serde_json::from_value(Value::Object(msg.fields().clone())) {
            Ok(current) => Some(current),
            Err(e) => {
                debug!(error = %e, "unexpected current artwork shape");
                None
            }
        }
    }

    pub async fn select_image(&self, content_id: &str, category: Option<&str>, show: bool) -> bool {
        let request = ArtRequest::new(RequestKind::SelectImage)
            .with("category_id", category)
            .with("content_id", content_id)
            .with("show", show);
        self.simple(request).await.is_some()
    }

    // ---- Art mode ----

    /// Queries the art mode and refreshes the cache.
    pub async fn get_artmode(&self) -> Option<ArtMode> {
        let msg = self
            .simple(ArtRequest::new(RequestKind::GetArtmodeStatus))
            .await?;
        let mode = ArtMode::from_status(msg.get_str("value")?);
        self.channel.record_art_mode(mode);
        Some(mode)
    }

    pub async fn set_artmode(&self, mode: ArtMode) -> bool {
        let request = ArtRequest::new(RequestKind::SetArtmodeStatus).with("value", mode.as_str());
        self.simple(request).await.is_some()
    }

    pub async fn set_favourite(&self, content_id: &str, favourite: bool) -> bool {
        let status = if favourite { "on" } else { "off" };
        let request = ArtRequest::new(RequestKind::ChangeFavorite)
            .with("content_id", content_id)
            .with("status", status);
        self.call(request, Some(EVENT_FAVORITE_CHANGED), self.config().timeout)
            .await
            .is_some()
    }

    // ---- Filters and mattes ----

    pub async fn get_photo_filter_list(&self) -> Vec<Value> {
        match self
            .simple(ArtRequest::new(RequestKind::GetPhotoFilterList))
            .await
        {
            Some(msg) => decode_or_default(&msg, "filter_list"),
            None => Vec::new(),
        }
    }

    pub async fn set_photo_filter(&self, content_id: &str, filter_id: &str) -> bool {
        let request = ArtRequest::new(RequestKind::SetPhotoFilter)
            .with("content_id", content_id)
            .with("filter_id", filter_id);
        self.simple(request).await.is_some()
    }

    pub async fn get_matte_list(&self) -> MatteList {
        match self.simple(ArtRequest::new(RequestKind::GetMatteList)).await {
            Some(msg) => MatteList {
                types: decode_or_default(&msg, "matte_type_list"),
                colors: decode_or_default(&msg, "matte_color_list"),
            },
            None => MatteList::default(),
        }
    }

    /// Sets the landscape matte (`"none"` when unset) and optionally the
    /// portrait one.
    pub async fn change_matte(
        &self,
        content_id: &str,
        matte_id: Option<&str>,
        portrait_matte_id: Option<&str>,
    ) -> bool {
        let mut request = ArtRequest::new(RequestKind::ChangeMatte)
            .with("content_id", content_id)
            .with("matte_id", matte_id.unwrap_or("none"));
        if let Some(portrait) = portrait_matte_id {
            request = request.with("portrait_matte_id", portrait);
        }
        self.simple(request).await.is_some()
    }

    // ---- Settings ----

    pub async fn get_artmode_settings(&self) -> Vec<Value> {
        match self
            .simple(ArtRequest::new(RequestKind::GetArtmodeSettings))
            .await
        {
            Some(msg) => decode_or_default(&msg, "data"),
            None => Vec::new(),
        }
    }

    /// One entry of the settings list, matched on its `item` field.
    pub async fn get_artmode_setting(&self, item: &str) -> Option<Value> {
        self.get_artmode_settings()
            .await
            .into_iter()
            .find(|entry| entry.get("item").and_then(Value::as_str) == Some(item))
    }

    async fn get_setting(&self, kind: RequestKind, item: &str) -> Option<Value> {
        if let Some(msg) = self.simple(ArtRequest::new(kind)).await {
            return Some(Value::Object(msg.fields().clone()));
        }
        self.get_artmode_setting(item).await
    }

    pub async fn get_brightness(&self) -> Option<Value> {
        self.get_setting(RequestKind::GetBrightness, "brightness")
            .await
    }

    pub async fn set_brightness(&self, value: i64) -> bool {
        let request = ArtRequest::new(RequestKind::SetBrightness).with("value", value);
        self.simple(request).await.is_some()
    }

    pub async fn get_color_temperature(&self) -> Option<Value> {
        self.get_setting(RequestKind::GetColorTemperature, "color_temperature")
            .await
    }

    pub async fn set_color_temperature(&self, value: i64) -> bool {
        let request = ArtRequest::new(RequestKind::SetColorTemperature).with("value", value);
        self.simple(request).await.is_some()
    }

    // ---- Rotation ----

    pub async fn get_auto_rotation_status(&self) -> Option<ServiceMessage> {
        self.simple(ArtRequest::new(RequestKind::GetAutoRotationStatus))
            .await
    }

    pub async fn set_auto_rotation_status(&self, config: &SlideshowConfig) -> bool {
        self.simple(rotation_request(RequestKind::SetAutoRotationStatus, config))
            .await
            .is_some()
    }

    pub async fn get_slideshow_status(&self) -> Option<ServiceMessage> {
        self.simple(ArtRequest::new(RequestKind::GetSlideshowStatus))
            .await
    }

    pub async fn set_slideshow_status(&self, config: &SlideshowConfig) -> bool {
        self.simple(rotation_request(RequestKind::SetSlideshowStatus, config))
            .await
            .is_some()
    }

    // ---- Deletion ----

    pub async fn delete(&self, content_id: &str) -> bool {
        self.delete_list(&[content_id]).await
    }

    /// Requests deletion. The device rarely answers, so only a failure to
    /// send counts as failure.
    pub async fn delete_list(&self, content_ids: &[&str]) -> bool {
        let request = ArtRequest::new(RequestKind::DeleteImageList)
            .with("content_id_list", content_id_list(content_ids));
        match self.channel.request(request, None, self.config().timeout).await {
            Ok(_) => true,
            Err(RequestError::Channel(e)) => {
                debug!(error = %e, "delete_image_list not sent");
                false
            }
            Err(e) => {
                debug!(error = %e, "delete_image_list sent without confirmation");
                true
            }
        }
    }
}

impl Drop for ArtClient {
    fn drop(&mut self) {
        self.transfers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}

/// `[{"content_id": ...}, ...]`
pub(crate) fn content_id_list(content_ids: &[&str]) -> Value {
    Value::Array(
        content_ids
            .iter()
            .map(|id| {
                let mut entry = Map::new();
                entry.insert("content_id".into(), Value::String((*id).to_owned()));
                Value::Object(entry)
            })
            .collect(),
    )
}

fn rotation_request(kind: RequestKind, config: &SlideshowConfig) -> ArtRequest {
    ArtRequest::new(kind)
        .with("value", config.value())
        .with("category_id", config.category_id())
        .with("type", config.kind())
}

fn decode_or_default<T: DeserializeOwned + Default>(msg: &ServiceMessage, field: &'static str) -> T {
    match msg.decode(field) {
        Ok(value) => value,
        Err(e) => {
            debug!(field, error = %e, "could not decode list field");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_id_list_shape() {
        let v = content_id_list(&["a", "b"]);
        assert_eq!(v, serde_json::json!([{"content_id": "a"}, {"content_id": "b"}]));
    }

    #[test]
    fn rotation_request_fields() {
        let req = rotation_request(
            RequestKind::SetSlideshowStatus,
            &SlideshowConfig {
                duration: 3,
                shuffle: true,
                category: 8,
            },
        );
        assert_eq!(req.get("value"), Some(&Value::from("3")));
        assert_eq!(req.get("category_id"), Some(&Value::from("MY-C0008")));
        assert_eq!(req.get("type"), Some(&Value::from("shuffleslideshow")));
    }

    #[tokio::test]
    async fn verbs_fail_softly_without_device() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = ArtClient::new(
            ArtConfig::new("127.0.0.1")
                .port(port)
                .rest_port(port)
                .timeout(Duration::from_millis(500)),
        );
        assert!(!client.select_image("MY_F0001", None, true).await);
        assert!(client.available(None).await.is_empty());
        assert_eq!(client.get_artmode().await, None);
        assert!(!client.supported().await);
        assert!(!client.delete("MY_F0001").await);
        assert!(!client.channel().is_connected());
        client.close().await;
    }
}
