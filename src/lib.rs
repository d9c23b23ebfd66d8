//! # stdio_service
//!
//! Drives a long-lived backend process over its standard streams using
//! line-delimited JSON: requests go to stdin, responses and notifications
//! come back on stdout.
//!
//! ```ignore
//! use stdio_service::{NullHandler, ServiceOptions, StdioService};
//!
//! let service = StdioService::spawn(
//!     NullHandler,
//!     ServiceOptions::new().with_log_file("/tmp/analyzer.log"),
//!     None,
//!     "dart",
//!     &["language-server".to_string()],
//! )?;
//! let version: String = service.send_request("server.getVersion", ()).await?;
//! service.dispose();
//! ```

pub mod error;
pub mod service;

pub use error::{Error, Result};
pub use service::{
    LogFileResolver, Notification, NullHandler, ProtocolHandler, ResponseError, ServiceOptions,
    StdioService, Subscription,
};
