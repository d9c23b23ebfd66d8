use crate::service::traffic_log::{fixed_log_file, LogFileResolver};
use std::path::PathBuf;

/// Per-service behaviour switches.
#[derive(Clone, Default)]
pub struct ServiceOptions {
    /// Every message is the only element of a JSON array, in both directions.
    pub wrapped_messages: bool,
    /// Treat malformed input and handling failures as stray output instead
    /// of transport faults.
    pub treat_handling_errors_as_unhandled: bool,
    /// Fail pending requests with `Error::Disposed` on dispose and with
    /// `Error::ProcessExited` when the backend's stdout closes. When unset,
    /// pending requests are abandoned.
    pub fail_pending_on_close: bool,
    /// Where traffic is logged; `None` disables the traffic log.
    pub log_file: Option<LogFileResolver>,
}

impl ServiceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wrapped_messages(mut self, wrapped: bool) -> Self {
        self.wrapped_messages = wrapped;
        self
    }

    pub fn with_treat_handling_errors_as_unhandled(mut self, tolerant: bool) -> Self {
        self.treat_handling_errors_as_unhandled = tolerant;
        self
    }

    pub fn with_fail_pending_on_close(mut self, fail: bool) -> Self {
        self.fail_pending_on_close = fail;
        self
    }

    pub fn with_log_file_resolver(mut self, resolver: LogFileResolver) -> Self {
        self.log_file = Some(resolver);
        self
    }

    pub fn with_log_file(self, path: impl Into<PathBuf>) -> Self {
        self.with_log_file_resolver(fixed_log_file(path.into()))
    }
}

impl std::fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceOptions")
            .field("wrapped_messages", &self.wrapped_messages)
            .field(
                "treat_handling_errors_as_unhandled",
                &self.treat_handling_errors_as_unhandled,
            )
            .field("fail_pending_on_close", &self.fail_pending_on_close)
            .field("log_file", &self.log_file.as_ref().map(|_| "<resolver>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_strict_and_silent() {
        let options = ServiceOptions::new();
        assert!(!options.wrapped_messages);
        assert!(!options.treat_handling_errors_as_unhandled);
        assert!(!options.fail_pending_on_close);
        assert!(options.log_file.is_none());
    }

    #[test]
    fn test_builders() {
        let options = ServiceOptions::new()
            .with_wrapped_messages(true)
            .with_treat_handling_errors_as_unhandled(true)
            .with_log_file("/tmp/traffic.log");
        assert!(options.wrapped_messages);
        assert!(options.treat_handling_errors_as_unhandled);
        let resolve = options.log_file.clone().unwrap();
        assert_eq!(resolve(), Some(PathBuf::from("/tmp/traffic.log")));
        assert!(format!("{:?}", options).contains("<resolver>"));
    }
}
