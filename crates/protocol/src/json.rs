//! JSON helpers for the loosely-typed device payloads.
//!
//! The device nests JSON documents inside JSON strings in several places
//! (`data`, `content_list`, `conn_info`, ...) and is inconsistent about
//! whether numbers and booleans arrive as strings. Every such boundary goes
//! through [`decode_if_string`] or one of the [`lenient`] deserializers.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Errors decoding protocol payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Decodes `value` as `T`, parsing it a second time first if the device
/// sent it as a JSON-encoded string.
pub fn decode_if_string<T: DeserializeOwned>(value: &Value) -> Result<T, serde_json::Error> {
    match value {
        Value::String(s) => serde_json::from_str(s),
        other => T::deserialize(other),
    }
}

/// Renders a scalar JSON value as a string (`"7"` and `7` both give `7`).
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Serde `deserialize_with` helpers accepting numbers or numeric strings.
pub mod lenient {
    use serde::de::{Deserializer, Error};
    use serde::Deserialize;
    use serde_json::Value;

    fn to_u64<E: Error>(value: &Value) -> Result<u64, E> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| E::custom(format!("not an unsigned integer: {n}"))),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("not an unsigned integer: {s:?}"))),
            other => Err(E::custom(format!("expected number, got {other}"))),
        }
    }

    pub fn u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        to_u64(&Value::deserialize(d)?)
    }

    pub fn u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        let n = to_u64::<D::Error>(&Value::deserialize(d)?)?;
        u32::try_from(n).map_err(|_| D::Error::custom(format!("out of range: {n}")))
    }

    pub fn u16<'de, D: Deserializer<'de>>(d: D) -> Result<u16, D::Error> {
        let n = to_u64::<D::Error>(&Value::deserialize(d)?)?;
        u16::try_from(n).map_err(|_| D::Error::custom(format!("out of range: {n}")))
    }

    /// Accepts `true`, `"true"`, `1` and their negatives. `null` is `false`.
    pub fn bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        match Value::deserialize(d)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" | "" => Ok(false),
                _ => Err(D::Error::custom(format!("not a boolean: {s:?}"))),
            },
            Value::Number(n) => Ok(n.as_u64().is_some_and(|v| v != 0)),
            other => Err(D::Error::custom(format!("expected boolean, got {other}"))),
        }
    }

    /// Optional string that may arrive as a number.
    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(super::scalar_to_string(&Value::deserialize(d)?))
    }
}
