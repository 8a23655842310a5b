use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{
    ART_APP_REQUEST_EVENT, D2D_SERVICE_MESSAGE_EVENT, EMIT_TARGET, MS_CHANNEL_EMIT_METHOD,
};
use crate::json::ProtocolError;
use crate::messages::{ArtRequest, ServiceMessage};

/// Outer envelope of every request sent on the control channel.
///
/// The inner request travels as a JSON *string* in `params.data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundCommand {
    pub method: String,
    pub params: EmitParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitParams {
    pub event: String,
    pub to: String,
    pub data: String,
}

impl OutboundCommand {
    /// Wraps `request` in an `ms.channel.emit` envelope.
    pub fn emit(request: &ArtRequest) -> Result<Self, serde_json::Error> {
        Ok(Self {
            method: MS_CHANNEL_EMIT_METHOD.into(),
            params: EmitParams {
                event: ART_APP_REQUEST_EVENT.into(),
                to: EMIT_TARGET.into(),
                data: request.to_json()?,
            },
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Any message received on the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    #[serde(default)]
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ChannelMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn is_service_message(&self) -> bool {
        self.event == D2D_SERVICE_MESSAGE_EVENT
    }

    /// Inner payload of a service message; `Ok(None)` for any other event.
    pub fn service_payload(&self) -> Result<Option<ServiceMessage>, ProtocolError> {
        if !self.is_service_message() {
            return Ok(None);
        }
        let data = self.data.as_ref().ok_or(ProtocolError::MissingField("data"))?;
        ServiceMessage::from_data(data).map(Some)
    }
}
