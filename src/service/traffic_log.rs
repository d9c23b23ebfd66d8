//! Mirrors protocol traffic into a log file chosen at runtime.

use parking_lot::Mutex;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Messages longer than this many characters are cut off in the log.
pub const MAX_LOGGED_MESSAGE_CHARS: usize = 2000;

/// Returns the file traffic should currently be written to, or `None` to
/// disable traffic logging. Called before every entry.
pub type LogFileResolver = Arc<dyn Fn() -> Option<PathBuf> + Send + Sync>;

enum LogState {
    Closed,
    Open { path: PathBuf, file: File },
    /// `close` was called; nothing is written any more.
    Finished,
}

pub struct TrafficLogger {
    resolve: Option<LogFileResolver>,
    state: Mutex<LogState>,
}

impl TrafficLogger {
    pub fn new(resolve: Option<LogFileResolver>) -> Self {
        TrafficLogger {
            resolve,
            state: Mutex::new(LogState::Closed),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Append one timestamped entry. Failures are reported through
    /// `tracing` and otherwise ignored.
    pub fn log(&self, message: &str) {
        tracing::trace!(target: "stdio_service::traffic", "{}", message.trim_end());

        let mut state = self.state.lock();
        if let LogState::Finished = *state {
            return;
        }
        let destination = self.resolve.as_ref().and_then(|resolve| resolve());

        if let LogState::Open { path, .. } = &*state {
            if destination.as_deref() != Some(path.as_path()) {
                *state = LogState::Closed;
            }
        }

        let Some(destination) = destination else {
            return;
        };

        if let LogState::Closed = *state {
            match File::create(&destination) {
                Ok(file) => {
                    *state = LogState::Open {
                        path: destination,
                        file,
                    }
                }
                Err(e) => {
                    tracing::warn!("failed to open traffic log {}: {}", destination.display(), e);
                    return;
                }
            }
        }

        if let LogState::Open { path, file } = &mut *state {
            let entry = format_entry(&chrono::Local::now().format("%H:%M:%S").to_string(), message);
            if let Err(e) = file.write_all(entry.as_bytes()) {
                tracing::warn!("failed to write traffic log {}: {}", path.display(), e);
                *state = LogState::Closed;
            }
        }
    }

    /// Flush and close the current file, if any. Entries logged afterwards
    /// are dropped, so a closed log is never reopened and truncated.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if let LogState::Open { file, .. } = &mut *state {
            let _ = file.flush();
        }
        *state = LogState::Finished;
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state.lock(), LogState::Finished)
    }

    /// The file currently open, if any.
    pub fn current_path(&self) -> Option<PathBuf> {
        match &*self.state.lock() {
            LogState::Open { path, .. } => Some(path.clone()),
            LogState::Closed | LogState::Finished => None,
        }
    }
}

/// Convenience resolver for a destination that never changes.
pub fn fixed_log_file(path: impl AsRef<Path>) -> LogFileResolver {
    let path = path.as_ref().to_path_buf();
    Arc::new(move || Some(path.clone()))
}

fn format_entry(time: &str, message: &str) -> String {
    match message.char_indices().nth(MAX_LOGGED_MESSAGE_CHARS) {
        Some((cut, _)) => format!("[{}]: {}…\r\n", time, &message[..cut]),
        None => format!("[{}]: {}\r\n", time, message.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_format_entry_trims_short_messages() {
        assert_eq!(format_entry("10:00:00", "  ==> hi\r\n"), "[10:00:00]: ==> hi\r\n");
    }

    #[test]
    fn test_format_entry_truncates() {
        let long = "é".repeat(MAX_LOGGED_MESSAGE_CHARS + 5);
        let entry = format_entry("t", &long);
        let expected = format!("[t]: {}…\r\n", "é".repeat(MAX_LOGGED_MESSAGE_CHARS));
        assert_eq!(entry, expected);

        let exact = "x".repeat(MAX_LOGGED_MESSAGE_CHARS);
        assert_eq!(format_entry("t", &exact), format!("[t]: {}\r\n", exact));
    }

    #[test]
    fn test_disabled_logger_is_noop() {
        let logger = TrafficLogger::disabled();
        logger.log("==> anything");
        assert!(logger.current_path().is_none());
    }

    #[test]
    fn test_writes_lazily_to_resolved_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traffic.txt");
        let logger = TrafficLogger::new(Some(fixed_log_file(&path)));

        assert!(!path.exists());
        logger.log("==> one");
        logger.log("<== two");
        logger.close();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('[') && lines[0].ends_with("]: ==> one"));
        assert!(lines[1].ends_with("]: <== two"));
    }

    #[test]
    fn test_close_is_final() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traffic.txt");
        let logger = TrafficLogger::new(Some(fixed_log_file(&path)));

        logger.log("==> kept");
        logger.close();
        assert!(logger.is_closed());
        logger.log("Process exited (signal: 9)");
        logger.close();

        assert!(logger.current_path().is_none());
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("]: ==> kept\r\n"));
        assert!(!contents.contains("Process exited"));
    }

    #[test]
    fn test_switches_destination_at_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.txt");
        let current = Arc::new(Mutex::new(Some(first.clone())));

        let current_in_resolver = current.clone();
        let logger = TrafficLogger::new(Some(Arc::new(move || current_in_resolver.lock().clone())));

        logger.log("a");
        assert_eq!(logger.current_path(), Some(first.clone()));

        *current.lock() = Some(second.clone());
        logger.log("b");
        assert_eq!(logger.current_path(), Some(second.clone()));

        *current.lock() = None;
        logger.log("c");
        assert!(logger.current_path().is_none());

        let first_contents = fs::read_to_string(&first).unwrap();
        let second_contents = fs::read_to_string(&second).unwrap();
        assert!(first_contents.contains("]: a\r\n") && !first_contents.contains("]: b"));
        assert!(second_contents.contains("]: b\r\n") && !second_contents.contains("]: c"));
    }

    #[test]
    fn test_unwritable_destination_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("traffic.txt");
        let logger = TrafficLogger::new(Some(fixed_log_file(&path)));
        logger.log("==> dropped");
        assert!(logger.current_path().is_none());
    }
}
