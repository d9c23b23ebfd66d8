use crate::service::types::ResponseError;

/// Errors produced by the stdio transport.
///
/// Errors are organized by category:
/// - Spawn errors: failed to start the backend process
/// - IO errors: writing to or reading from the process streams
/// - Transport faults: malformed or unmatched inbound messages
/// - Protocol errors: the backend answered a request with an `error`
/// - Lifecycle errors: the service or the process went away
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    // -------------------------------------------------------------------------
    // Spawn errors
    // -------------------------------------------------------------------------
    /// Failed to spawn the backend process.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // IO errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),

    /// A value supplied by or returned to the caller could not be converted
    /// to or from JSON.
    #[error("serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    // -------------------------------------------------------------------------
    // Transport faults
    // -------------------------------------------------------------------------
    /// Inbound text was not valid JSON, or a value could not be (de)serialized.
    #[error("failed to parse JSON: {message}")]
    JsonParse {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// JSON was valid but did not have the shape of a protocol message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A response arrived for an id with no pending request.
    #[error("no pending request with id {id}")]
    UnknownRequestId { id: String },

    /// The protocol handler failed to process a notification.
    #[error("failed to handle `{event}` notification: {source}")]
    Handler {
        event: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    // -------------------------------------------------------------------------
    // Protocol errors
    // -------------------------------------------------------------------------
    /// The backend answered the request with an error object.
    #[error("request failed: {0}")]
    Request(#[source] ResponseError),

    // -------------------------------------------------------------------------
    // Lifecycle errors
    // -------------------------------------------------------------------------
    #[error("service disposed")]
    Disposed,

    #[error("backend process exited")]
    ProcessExited,

    #[error("backend stdin is closed")]
    StdinClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a JSON parse error that quotes the start of the offending text.
    pub fn json_parse(source: serde_json::Error, raw: &str) -> Self {
        Self::JsonParse {
            message: format!(
                "at column {}: {}",
                source.column(),
                raw.chars().take(100).collect::<String>()
            ),
            source,
        }
    }

    pub fn handler(event: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Handler {
            event: event.into(),
            source: source.into(),
        }
    }

    /// The error object the backend sent, if this is a protocol error.
    pub fn response_error(&self) -> Option<&ResponseError> {
        match self {
            Error::Request(err) => Some(err),
            _ => None,
        }
    }

    /// Whether this error is a transport fault, i.e. subject to the
    /// tolerant/strict handling policy.
    pub fn is_transport_fault(&self) -> bool {
        matches!(
            self,
            Error::JsonParse { .. }
                | Error::InvalidMessage(_)
                | Error::UnknownRequestId { .. }
                | Error::Handler { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonParse {
            message: err.to_string(),
            source: err,
        }
    }
}
