use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::json::lenient;

/// Display mode of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtMode {
    On,
    Off,
}

impl ArtMode {
    /// Interprets a device status string. Anything but `"on"` is off.
    pub fn from_status(status: &str) -> Self {
        if status == "on" { Self::On } else { Self::Off }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

impl std::fmt::Display for ArtMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side-channel descriptor attached to transfer requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnInfoRequest {
    pub d2d_mode: String,
    pub connection_id: u32,
    pub id: String,
}

impl ConnInfoRequest {
    /// Socket-mode descriptor with a random connection id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            d2d_mode: "socket".into(),
            connection_id: rand::random(),
            id: id.into(),
        }
    }
}

/// Side-channel endpoint returned by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnInfo {
    pub ip: String,
    #[serde(deserialize_with = "lenient::u16")]
    pub port: u16,
    #[serde(default, deserialize_with = "lenient::bool")]
    pub secured: bool,
    /// Session key echoed in upload headers.
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl ConnInfo {
    /// `ip:port`, for logging and connecting.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// Returns `true` if the descriptor names a usable endpoint.
    pub fn is_valid(&self) -> bool {
        !self.ip.is_empty() && self.port != 0
    }
}

/// One entry of a content list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(default)]
    pub content_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Artwork currently shown by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentArtwork {
    #[serde(default)]
    pub content_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matte_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portrait_matte_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `GET /api/v2/`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceStatus {
    #[serde(default)]
    pub device: DeviceInfo,
}

/// The `device` object of the REST status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(rename = "FrameTVSupport", default, skip_serializing_if = "Option::is_none")]
    pub frame_tv_support: Option<String>,
    #[serde(rename = "PowerState", default, skip_serializing_if = "Option::is_none")]
    pub power_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "modelName", default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceInfo {
    pub fn supports_art_mode(&self) -> bool {
        self.frame_tv_support.as_deref() == Some("true")
    }

    /// Missing power state counts as off.
    pub fn is_powered_on(&self) -> bool {
        self.power_state.as_deref().unwrap_or("off") == "on"
    }
}

/// Matte types and colours offered by the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatteList {
    pub types: Vec<Value>,
    pub colors: Vec<Value>,
}

/// Slideshow / auto-rotation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideshowConfig {
    /// Minutes per image; 0 turns the slideshow off.
    pub duration: u32,
    pub shuffle: bool,
    /// Category digit: 2 = my pictures, 4 = favourites, 8 = store.
    pub category: u8,
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self {
            duration: 0,
            shuffle: true,
            category: 2,
        }
    }
}

impl SlideshowConfig {
    pub fn value(&self) -> String {
        if self.duration > 0 {
            self.duration.to_string()
        } else {
            "off".into()
        }
    }

    pub fn category_id(&self) -> String {
        format!("MY-C000{}", self.category)
    }

    pub fn kind(&self) -> &'static str {
        if self.shuffle { "shuffleslideshow" } else { "slideshow" }
    }
}
