//! Message shapes exchanged with the backend.

use crate::service::codec::is_truthy;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Error code the backend uses for internal failures; such errors are also
/// broadcast to request-error subscribers.
pub const SERVER_ERROR_CODE: &str = "SERVER_ERROR";

pub type RequestId = String;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: RequestId, method: String, params: Option<Value>) -> Self {
        Request { id, method, params }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Response {
    #[serde(deserialize_with = "id_as_string")]
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(
        default,
        deserialize_with = "lenient_error",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<ResponseError>,
}

/// The `error` object of a failed response.
///
/// Fields other than `code` and `message` are kept in `data` so nothing the
/// backend reported is lost. `method` is filled in locally with the name of
/// the request that failed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ResponseError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ResponseError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        ResponseError {
            code: code.into(),
            message: message.into(),
            method: None,
            data: Map::new(),
        }
    }

    /// Build an error from whatever the backend put in `error`.
    ///
    /// Non-string `code`/`message` values are stringified. A bare string
    /// becomes the message; any other non-object is kept under `data.error`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut fields) => {
                let code = fields.remove("code").map(into_text).unwrap_or_default();
                let message = fields.remove("message").map(into_text).unwrap_or_default();
                let method = match fields.remove("method") {
                    Some(Value::String(method)) => Some(method),
                    Some(other) => {
                        fields.insert("method".to_string(), other);
                        None
                    }
                    None => None,
                };
                ResponseError {
                    code,
                    message,
                    method,
                    data: fields,
                }
            }
            Value::String(message) => ResponseError::new("", message),
            other => {
                let mut error = ResponseError::new("", other.to_string());
                error.data.insert("error".to_string(), other);
                error
            }
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.code == SERVER_ERROR_CODE
    }
}

fn into_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A falsy `error` means success; anything else is an error, whatever its
/// shape.
fn lenient_error<'de, D>(deserializer: D) -> Result<Option<ResponseError>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(is_truthy(Some(&value)).then(|| ResponseError::from_value(value)))
}

/// A notification with untyped params. Protocols that don't need a typed
/// notification enum can use this as their `ProtocolHandler::Notification`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Notification {
    pub event: String,
    #[serde(default)]
    pub params: Value,
}

impl Notification {
    pub fn new(event: String, params: Value) -> Self {
        Notification { event, params }
    }
}

/// A parsed inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Notification(Value),
    Response(Response),
    Unrecognized(Value),
}

fn id_as_string<'de, D>(deserializer: D) -> Result<RequestId, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "request id must be a string or number, got {}",
            other
        ))),
    }
}
