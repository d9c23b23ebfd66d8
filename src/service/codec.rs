//! Classification of framed lines and encoding of requests.

use crate::error::{Error, Result};
use crate::service::types::{Envelope, Request, Response};
use serde_json::Value;

/// Converts between framed lines and protocol messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCodec {
    /// Every message travels as the only element of a JSON array.
    wrapped: bool,
}

impl MessageCodec {
    pub fn new(wrapped: bool) -> Self {
        MessageCodec { wrapped }
    }

    /// Parse a framed message into an `Envelope`.
    pub fn parse(&self, message: &str) -> Result<Envelope> {
        let json: Value =
            serde_json::from_str(message).map_err(|e| Error::json_parse(e, message))?;
        self.classify(json)
    }

    pub fn classify(&self, json: Value) -> Result<Envelope> {
        let json = match json {
            Value::Array(mut items) if self.wrapped && items.len() == 1 => items.remove(0),
            other => other,
        };

        if is_truthy(json.get("event")) {
            return Ok(Envelope::Notification(json));
        }
        if is_truthy(json.get("id")) {
            let response: Response = serde_json::from_value(json)
                .map_err(|e| Error::InvalidMessage(format!("malformed response: {}", e)))?;
            return Ok(Envelope::Response(response));
        }
        Ok(Envelope::Unrecognized(json))
    }

    /// Serialize a request as one CRLF-terminated line.
    pub fn encode_request(&self, request: &Request) -> Result<String> {
        let json = serde_json::to_string(request).map_err(Error::Serialization)?;
        Ok(if self.wrapped {
            format!("[{}]\r\n", json)
        } else {
            format!("{}\r\n", json)
        })
    }
}

/// JavaScript truthiness, which is what backends speaking this protocol
/// assume when they leave fields empty.
pub(crate) fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(true, |f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
