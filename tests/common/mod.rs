//! Test utilities for stdio_service integration tests.

use std::time::Duration;

use parking_lot::Mutex;
use stdio_service::service::looks_like_json;
use stdio_service::{Notification, ProtocolHandler};

/// A backend written in portable `sh`.
///
/// Prints a banner and a `server.connected` notification, then answers
/// every request line: `crash` gets a server error, `shutdown` is answered
/// and ends the process, anything else gets `"ok-<id>"`.
pub const SCRIPTED_BACKEND: &str = r#"
echo "backend starting up"
echo '{"event":"server.connected","params":{"version":"1.0"}}'
echo "diagnostics on stderr" >&2
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":"\([0-9]*\)".*/\1/p')
  case "$line" in
    *'"method":"shutdown"'*)
      printf '{"id":"%s","result":null}\n' "$id"
      exit 0
      ;;
    *'"method":"crash"'*)
      printf '{"id":"%s","error":{"code":"SERVER_ERROR","message":"boom"}}\n' "$id"
      ;;
    *)
      printf '{"id":"%s","result":"ok-%s"}\n' "$id" "$id"
      ;;
  esac
done
"#;

/// Records what the service hands to the protocol layer.
#[derive(Default)]
pub struct RecordingHandler {
    pub notifications: Mutex<Vec<Notification>>,
    pub unhandled: Mutex<Vec<String>>,
}

impl ProtocolHandler for RecordingHandler {
    type Notification = Notification;

    fn should_handle_message(&self, message: &str) -> bool {
        looks_like_json(message)
    }

    fn handle_notification(&self, notification: Notification) -> anyhow::Result<()> {
        self.notifications.lock().push(notification);
        Ok(())
    }

    fn process_unhandled_message(&self, message: &str) {
        self.unhandled.lock().push(message.to_string());
    }
}

pub fn sh_args(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string()]
}

/// Poll `check` until it holds, failing the test after about two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}
