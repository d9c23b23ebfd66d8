pub mod bus;
pub mod codec;
pub mod correlator;
pub mod framer;
pub mod handler;
pub mod options;
pub mod process;
pub mod stdio_service;
pub mod traffic_log;
pub mod transport;
pub mod types;

pub use bus::{SubscriberList, Subscription};
pub use handler::{looks_like_json, NullHandler, ProtocolHandler};
pub use options::ServiceOptions;
pub use stdio_service::StdioService;
pub use traffic_log::{fixed_log_file, LogFileResolver, TrafficLogger};
pub use types::{Notification, Request, RequestId, Response, ResponseError, SERVER_ERROR_CODE};
