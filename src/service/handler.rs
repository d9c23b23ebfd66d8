use crate::service::types::Notification;
use serde::de::DeserializeOwned;

/// The protocol-specific half of a stdio service.
///
/// The transport frames, parses and correlates messages; everything that
/// depends on what the backend actually says is delegated here.
pub trait ProtocolHandler: Send + Sync + 'static {
    /// The shape notifications are deserialized into before
    /// `handle_notification` sees them.
    type Notification: DeserializeOwned;

    /// Whether a framed line should be treated as protocol traffic at all.
    /// Lines rejected here go straight to `process_unhandled_message`.
    fn should_handle_message(&self, message: &str) -> bool;

    fn handle_notification(&self, notification: Self::Notification) -> anyhow::Result<()>;

    /// Output that is not part of the protocol, e.g. stray stdout text.
    fn process_unhandled_message(&self, _message: &str) {}
}

/// Accepts every JSON-looking line and ignores notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl ProtocolHandler for NullHandler {
    type Notification = Notification;

    fn should_handle_message(&self, message: &str) -> bool {
        looks_like_json(message)
    }

    fn handle_notification(&self, _notification: Notification) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Cheap pre-filter for `should_handle_message`: JSON messages start with
/// `{` or `[`.
pub fn looks_like_json(message: &str) -> bool {
    message.starts_with('{') || message.starts_with('[')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_json() {
        assert!(looks_like_json(r#"{"event":"x"}"#));
        assert!(looks_like_json(r#"[{"id":"1"}]"#));
        assert!(!looks_like_json("Observatory listening"));
        assert!(!looks_like_json(""));
    }

    #[test]
    fn test_null_handler() {
        let handler = NullHandler;
        assert!(handler.should_handle_message("{}"));
        assert!(!handler.should_handle_message("Listening"));
        let notification = Notification::new("x".into(), serde_json::Value::Null);
        assert!(handler.handle_notification(notification).is_ok());
        handler.process_unhandled_message("ignored");
    }
}
