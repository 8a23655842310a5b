//! Inner art-app requests and the service messages the device answers with.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::constants::{EVENT_FAVORITE_CHANGED, EVENT_IMAGE_ADDED, RequestKind};
use crate::json::{ProtocolError, decode_if_string, scalar_to_string};
use crate::types::{ArtMode, ConnInfo, ConnInfoRequest};

/// Inner request object, serialized into the `data` string of an
/// [`OutboundCommand`](crate::OutboundCommand).
#[derive(Debug, Clone, PartialEq)]
pub struct ArtRequest {
    kind: RequestKind,
    fields: Map<String, Value>,
}

impl ArtRequest {
    pub fn new(kind: RequestKind) -> Self {
        let mut fields = Map::new();
        fields.insert("request".into(), Value::String(kind.as_str().into()));
        Self { kind, fields }
    }

    /// Adds a verb-specific field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Attaches a side-channel descriptor and reuses its id as request id.
    pub fn with_conn_info(mut self, conn_info: ConnInfoRequest) -> Self {
        let id = conn_info.id.clone();
        let value = serde_json::to_value(&conn_info).unwrap_or(Value::Null);
        self.fields.insert("conn_info".into(), value);
        self.fields.insert("id".into(), Value::String(id));
        self
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn id(&self) -> Option<&str> {
        self.fields
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Assigns an id from `generate` if none is set, and mirrors it into
    /// `request_id`. Returns the id.
    pub fn ensure_id(&mut self, generate: impl FnOnce() -> String) -> String {
        let id = match self.id() {
            Some(id) => id.to_owned(),
            None => generate(),
        };
        self.fields.insert("id".into(), Value::String(id.clone()));
        self.fields.insert("request_id".into(), Value::String(id.clone()));
        id
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.fields)
    }
}

/// Decoded inner `data` of a `d2d_service_message` envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceMessage {
    fields: Map<String, Value>,
}

impl ServiceMessage {
    /// Decodes the envelope's `data`, which may be an object or a JSON
    /// string holding one.
    pub fn from_data(data: &Value) -> Result<Self, ProtocolError> {
        match decode_if_string::<Value>(data)? {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(ProtocolError::NotAnObject),
        }
    }

    /// Sub-event name, empty if absent.
    pub fn sub_event(&self) -> &str {
        self.get_str("event").unwrap_or_default()
    }

    /// Correlation id: `request_id`, else `id`. Numbers are rendered.
    pub fn request_id(&self) -> Option<String> {
        ["request_id", "id"]
            .iter()
            .filter_map(|k| self.fields.get(*k))
            .filter_map(scalar_to_string)
            .find(|s| !s.is_empty())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Decodes field `key`, which may be double-encoded.
    pub fn decode<T: DeserializeOwned>(&self, key: &'static str) -> Result<T, ProtocolError> {
        let value = self
            .fields
            .get(key)
            .ok_or(ProtocolError::MissingField(key))?;
        Ok(decode_if_string(value)?)
    }

    /// Side-channel descriptor of a transfer response.
    pub fn conn_info(&self) -> Result<ConnInfo, ProtocolError> {
        let info: ConnInfo = self.decode("conn_info")?;
        if !info.is_valid() {
            return Err(ProtocolError::InvalidField {
                field: "conn_info",
                reason: format!("unusable endpoint {:?}", info.addr()),
            });
        }
        Ok(info)
    }

    pub fn event(&self) -> ServiceEvent {
        ServiceEvent::classify(self)
    }
}

/// Inbound sub-events the client acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    /// Any `*artmode_status*` sub-event. `None` when `value` is missing.
    ArtModeStatus(Option<ArtMode>),
    ArtModeChanged(Option<ArtMode>),
    GoToStandby,
    ImageAdded { content_id: Option<String> },
    ImageDeleted,
    FavoriteChanged,
    Error { code: Option<String> },
    Other(String),
}

impl ServiceEvent {
    fn classify(msg: &ServiceMessage) -> Self {
        let sub_event = msg.sub_event();
        if sub_event.contains("artmode_status") {
            return Self::ArtModeStatus(msg.get_str("value").map(ArtMode::from_status));
        }
        match sub_event {
            "art_mode_changed" => Self::ArtModeChanged(msg.get_str("status").map(ArtMode::from_status)),
            "go_to_standby" => Self::GoToStandby,
            EVENT_IMAGE_ADDED => Self::ImageAdded {
                content_id: msg.get_str("content_id").map(str::to_owned),
            },
            "image_deleted" => Self::ImageDeleted,
            EVENT_FAVORITE_CHANGED => Self::FavoriteChanged,
            "error" => Self::Error {
                code: msg.get("error_code").and_then(scalar_to_string),
            },
            other => Self::Other(other.to_owned()),
        }
    }

    /// New art-mode value this event implies, if any.
    pub fn art_mode_update(&self) -> Option<ArtMode> {
        match self {
            Self::ArtModeStatus(mode) | Self::ArtModeChanged(mode) => *mode,
            Self::GoToStandby => Some(ArtMode::Off),
            _ => None,
        }
    }
}
