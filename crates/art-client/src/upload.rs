//! Image upload: `send_image` exchange, side-channel transfer, `image_added`.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use frameart_data_channel::FrameHeader;
use frameart_protocol::constants::{EVENT_IMAGE_ADDED, LIST_TIMEOUT, UPLOAD_TIMEOUT};
use frameart_protocol::types::ConnInfoRequest;
use frameart_protocol::{ArtRequest, ProtocolError, RequestKind};

use crate::art::ArtClient;
use crate::error::ArtError;

/// `image_date` layout expected by the device.
pub const IMAGE_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

const DEFAULT_MATTE: &str = "shadowbox_polar";

/// Per-upload settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Landscape matte; `None` sends `"none"`.
    pub matte: Option<String>,
    pub portrait_matte: Option<String>,
    pub file_type: String,
    /// `image_date`; the local time when unset.
    pub date: Option<String>,
    /// How long to wait for `image_added` after the transfer.
    pub timeout: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            matte: Some(DEFAULT_MATTE.into()),
            portrait_matte: Some(DEFAULT_MATTE.into()),
            file_type: "png".into(),
            date: None,
            timeout: UPLOAD_TIMEOUT,
        }
    }
}

impl UploadOptions {
    pub fn matte(mut self, matte: Option<&str>) -> Self {
        self.matte = matte.map(str::to_owned);
        self
    }

    pub fn portrait_matte(mut self, matte: Option<&str>) -> Self {
        self.portrait_matte = matte.map(str::to_owned);
        self
    }

    pub fn file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = file_type.into();
        self
    }

    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// File type as the device names it (`jpeg` is `jpg`).
    pub fn normalized_file_type(&self) -> String {
        let file_type = self.file_type.to_ascii_lowercase();
        if file_type == "jpeg" { "jpg".into() } else { file_type }
    }

    fn image_date(&self) -> String {
        self.date
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format(IMAGE_DATE_FORMAT).to_string())
    }
}

impl ArtClient {
    /// Uploads `data` and returns the new content id, or `None` on failure.
    pub async fn upload(&self, data: &[u8], options: &UploadOptions) -> Option<String> {
        match self.try_upload(data, options).await {
            Ok(content_id) => Some(content_id),
            Err(e) => {
                warn!(bytes = data.len(), error = %e, "upload failed");
                None
            }
        }
    }

    /// Uploads a file; its extension overrides the configured file type.
    pub async fn upload_file(&self, path: impl AsRef<Path>, options: &UploadOptions) -> Option<String> {
        let path = path.as_ref();
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read upload");
                return None;
            }
        };
        let mut options = options.clone();
        if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
            options.file_type = ext.to_ascii_lowercase();
        }
        self.upload(&data, &options).await
    }

    pub async fn try_upload(&self, data: &[u8], options: &UploadOptions) -> Result<String, ArtError> {
        let file_type = options.normalized_file_type();
        let id = uuid::Uuid::new_v4().to_string();
        let request = ArtRequest::new(RequestKind::SendImage)
            .with_conn_info(ConnInfoRequest::new(id))
            .with("file_type", file_type.as_str())
            .with("image_date", options.image_date())
            .with("matte_id", options.matte.as_deref().unwrap_or("none"))
            .with(
                "portrait_matte_id",
                options.portrait_matte.as_deref().unwrap_or("none"),
            )
            .with("file_size", data.len());
        debug!(bytes = data.len(), %file_type, "requesting upload slot");

        let reply = self.channel.request(request, None, LIST_TIMEOUT).await?;
        let info = reply.conn_info()?;
        let key = info.key.clone().ok_or(ProtocolError::MissingField("key"))?;
        let header = FrameHeader::upload(data.len() as u64, &file_type, Some(key));

        let added = self.channel.expect_event(EVENT_IMAGE_ADDED)?;
        self.config()
            .side_channel
            .upload(&info, &header, data, &self.transfer_token())
            .await?;

        let event = added.wait(options.timeout).await?;
        let content_id = event
            .get_str("content_id")
            .ok_or(ProtocolError::MissingField("content_id"))?
            .to_owned();
        info!(%content_id, bytes = data.len(), "image uploaded");
        Ok(content_id)
    }
}
