use std::time::Duration;

use serde::{Deserialize, Serialize};

/// WebSocket channel name of the art application.
pub const ART_ENDPOINT: &str = "com.samsung.art-app";

/// Control port for plaintext (`ws://`) connections.
pub const PLAIN_PORT: u16 = 8001;

/// Control port for TLS (`wss://`) connections. Pairing tokens are only
/// sent on this port.
pub const TLS_PORT: u16 = 8002;

/// Port of the device's REST status endpoint.
pub const REST_PORT: u16 = 8001;

/// Outer event carrying art-app payloads.
pub const D2D_SERVICE_MESSAGE_EVENT: &str = "d2d_service_message";
/// Sent by the device when a client attaches to the channel.
pub const MS_CHANNEL_CONNECT_EVENT: &str = "ms.channel.connect";
/// Sent by the device once the channel accepts requests.
pub const MS_CHANNEL_READY_EVENT: &str = "ms.channel.ready";
/// Sent by the device when the pairing token is missing or rejected.
pub const MS_CHANNEL_UNAUTHORIZED_EVENT: &str = "ms.channel.unauthorized";

/// Method of the outbound command envelope.
pub const MS_CHANNEL_EMIT_METHOD: &str = "ms.channel.emit";
/// Event name of the outbound command envelope.
pub const ART_APP_REQUEST_EVENT: &str = "art_app_request";
/// Recipient of the outbound command envelope.
pub const EMIT_TARGET: &str = "host";

/// Maximum number of messages read while waiting for the ready event.
pub const HANDSHAKE_MAX_EVENTS: usize = 5;

/// Default timeout budget for connects and simple requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for list-shaped requests and transfer negotiation.
pub const LIST_TIMEOUT: Duration = Duration::from_secs(15);
/// Timeout for the legacy single-thumbnail request.
pub const THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(10);
/// Time allowed for the device to confirm an upload (matting is slow).
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout of the HTTP status probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Content-id prefix of vendor store (DRM-bearing) artwork.
pub const STORE_CONTENT_PREFIX: &str = "SAM-";

/// Category of favourites.
pub const CATEGORY_FAVOURITES: &str = "MY-C0004";

/// File name placeholder written into upload headers.
pub const UPLOAD_FILE_NAME: &str = "dummy";
/// Header version written into upload headers.
pub const UPLOAD_HEADER_VERSION: &str = "0.0.1";

/// Well-known sub-events used as correlation keys.
pub const EVENT_IMAGE_ADDED: &str = "image_added";
pub const EVENT_FAVORITE_CHANGED: &str = "favorite_changed";

/// Returns `true` for vendor store content ids.
pub fn is_store_content(content_id: &str) -> bool {
    content_id.starts_with(STORE_CONTENT_PREFIX)
}

/// Art-app request name, carried in the inner `request` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    GetApiVersion,
    ApiVersion,
    GetContentList,
    GetCurrentArtwork,
    GetThumbnailList,
    GetThumbnail,
    SelectImage,
    GetArtmodeStatus,
    SetArtmodeStatus,
    ChangeFavorite,
    GetPhotoFilterList,
    SetPhotoFilter,
    GetMatteList,
    ChangeMatte,
    GetArtmodeSettings,
    GetBrightness,
    SetBrightness,
    GetColorTemperature,
    SetColorTemperature,
    GetAutoRotationStatus,
    SetAutoRotationStatus,
    GetSlideshowStatus,
    SetSlideshowStatus,
    SendImage,
    DeleteImageList,
}

impl RequestKind {
    /// Wire name of the request.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetApiVersion => "get_api_version",
            Self::ApiVersion => "api_version",
            Self::GetContentList => "get_content_list",
            Self::GetCurrentArtwork => "get_current_artwork",
            Self::GetThumbnailList => "get_thumbnail_list",
            Self::GetThumbnail => "get_thumbnail",
            Self::SelectImage => "select_image",
            Self::GetArtmodeStatus => "get_artmode_status",
            Self::SetArtmodeStatus => "set_artmode_status",
            Self::ChangeFavorite => "change_favorite",
            Self::GetPhotoFilterList => "get_photo_filter_list",
            Self::SetPhotoFilter => "set_photo_filter",
            Self::GetMatteList => "get_matte_list",
            Self::ChangeMatte => "change_matte",
            Self::GetArtmodeSettings => "get_artmode_settings",
            Self::GetBrightness => "get_brightness",
            Self::SetBrightness => "set_brightness",
            Self::GetColorTemperature => "get_color_temperature",
            Self::SetColorTemperature => "set_color_temperature",
            Self::GetAutoRotationStatus => "get_auto_rotation_status",
            Self::SetAutoRotationStatus => "set_auto_rotation_status",
            Self::GetSlideshowStatus => "get_slideshow_status",
            Self::SetSlideshowStatus => "set_slideshow_status",
            Self::SendImage => "send_image",
            Self::DeleteImageList => "delete_image_list",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
