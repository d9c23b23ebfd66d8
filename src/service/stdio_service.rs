//! Request/response/notification protocol over a child's standard streams.
//!
//! ```text
//! host                                   backend
//! ┌──────────────┐                      ┌─────────┐
//! │ StdioService │───stdin  (requests)──▶│         │
//! │              │◀──stdout (messages)───│         │
//! │              │◀──stderr (logged)─────│         │
//! └──────────────┘                      └─────────┘
//! ```
//!
//! Requests are written as CRLF-terminated JSON lines. Stdout is framed on
//! `\n`; each line is either a response to one of our requests, a
//! notification for the `ProtocolHandler`, or stray output.

use crate::error::{Error, Result};
use crate::service::bus::{SubscriberList, Subscription};
use crate::service::codec::MessageCodec;
use crate::service::correlator::RequestCorrelator;
use crate::service::framer::LineFramer;
use crate::service::handler::ProtocolHandler;
use crate::service::options::ServiceOptions;
use crate::service::process::ChildProcess;
use crate::service::traffic_log::TrafficLogger;
use crate::service::transport::{MessageWriter, StreamWriter};
use crate::service::types::{Envelope, Request, ResponseError};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::task::JoinHandle;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// State shared between the service handle and its reader tasks.
struct Shared<H: ProtocolHandler> {
    handler: H,
    codec: MessageCodec,
    tolerant: bool,
    fail_pending_on_close: bool,
    correlator: Mutex<RequestCorrelator>,
    request_errors: SubscriberList<ResponseError>,
    faults: SubscriberList<Error>,
    traffic: TrafficLogger,
    disposed: AtomicBool,
}

impl<H: ProtocolHandler> Shared<H> {
    fn new(handler: H, options: ServiceOptions) -> Self {
        Shared {
            handler,
            codec: MessageCodec::new(options.wrapped_messages),
            tolerant: options.treat_handling_errors_as_unhandled,
            fail_pending_on_close: options.fail_pending_on_close,
            correlator: Mutex::new(RequestCorrelator::new()),
            request_errors: SubscriberList::new(),
            faults: SubscriberList::new(),
            traffic: TrafficLogger::new(options.log_file),
            disposed: AtomicBool::new(false),
        }
    }

    /// Run one framed message through parse, classify and dispatch.
    /// Returns `Err` only for faults the handling policy treats as fatal.
    fn handle_message(&self, message: &str) -> Result<()> {
        let message = message.trim();
        self.traffic.log(&format!("<== {}\r\n", message));

        if !self.handler.should_handle_message(message) {
            self.handler.process_unhandled_message(message);
            return Ok(());
        }

        let envelope = match self.codec.parse(message) {
            Ok(envelope) => envelope,
            Err(e) => {
                return self.tolerate(message, e, "unexpected non-JSON message, assuming normal stdout")
            }
        };

        match self.dispatch(message, envelope) {
            Ok(()) => Ok(()),
            Err(e) => self.tolerate(message, e, "failed to handle JSON message, assuming normal stdout"),
        }
    }

    fn dispatch(&self, message: &str, envelope: Envelope) -> Result<()> {
        match envelope {
            Envelope::Notification(json) => {
                let event = json
                    .get("event")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let notification: H::Notification = serde_json::from_value(json)
                    .map_err(|e| Error::handler(event.clone(), e.into()))?;
                self.handler
                    .handle_notification(notification)
                    .map_err(|e| Error::handler(event, e))
            }
            Envelope::Response(response) => {
                let pending = self.correlator.lock().take(&response.id)?;
                pending.settle(response, &self.request_errors);
                Ok(())
            }
            Envelope::Unrecognized(_) => {
                tracing::debug!("unexpected JSON message, assuming normal stdout: {}", message);
                self.handler.process_unhandled_message(message);
                Ok(())
            }
        }
    }

    fn tolerate(&self, message: &str, error: Error, context: &str) -> Result<()> {
        if self.tolerant {
            tracing::warn!("{} ({}): {}", context, error, message);
            self.handler.process_unhandled_message(message);
            Ok(())
        } else {
            Err(error)
        }
    }

    fn report_fault(&self, error: Error) {
        tracing::error!("transport fault: {}", error);
        self.faults.publish(&error);
    }

    fn fail_pending(&self, error: impl Fn() -> Error) {
        let drained = self.correlator.lock().drain();
        for pending in drained {
            tracing::debug!(id = pending.id(), method = pending.method(), "failing pending request");
            pending.fail(error());
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// A running stdio service: owns the backend process (if it spawned one),
/// its reader tasks and the table of in-flight requests.
///
/// Dropping the service disposes it.
pub struct StdioService<H: ProtocolHandler> {
    shared: Arc<Shared<H>>,
    writer: tokio::sync::Mutex<Option<Box<dyn MessageWriter>>>,
    process: Option<ChildProcess>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<H: ProtocolHandler> StdioService<H> {
    /// Spawn `program` and start talking to it. Must be called within a
    /// tokio runtime.
    pub fn spawn(
        handler: H,
        options: ServiceOptions,
        working_dir: Option<&Path>,
        program: &str,
        args: &[String],
    ) -> Result<Self> {
        let shared = Arc::new(Shared::new(handler, options));

        shared.traffic.log(&format!(
            "Spawning {} with args {}",
            program,
            serde_json::to_string(args).map_err(Error::Serialization)?
        ));
        if let Some(dir) = working_dir {
            shared.traffic.log(&format!("..  in {}", dir.display()));
        }

        let weak: Weak<Shared<H>> = Arc::downgrade(&shared);
        let (process, streams) = ChildProcess::spawn(
            working_dir,
            program,
            args,
            Box::new(move |status| {
                let status = status.map_or_else(|| "unknown status".to_string(), |s| s.to_string());
                tracing::info!("backend process exited: {}", status);
                if let Some(shared) = weak.upgrade() {
                    shared.traffic.log(&format!("Process exited ({})", status));
                }
            }),
        )?;

        let tasks = vec![
            tokio::spawn(read_stdout(streams.stdout, shared.clone())),
            tokio::spawn(read_stderr(streams.stderr, shared.clone())),
        ];

        Ok(StdioService {
            shared,
            writer: tokio::sync::Mutex::new(Some(boxed_writer(streams.stdin))),
            process: Some(process),
            tasks: Mutex::new(tasks),
        })
    }

    /// Run the service over arbitrary streams instead of a spawned process.
    /// Must be called within a tokio runtime.
    pub fn from_streams<R, W>(handler: H, options: ServiceOptions, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let shared = Arc::new(Shared::new(handler, options));
        let tasks = vec![tokio::spawn(read_stdout(reader, shared.clone()))];

        StdioService {
            shared,
            writer: tokio::sync::Mutex::new(Some(boxed_writer(writer))),
            process: None,
            tasks: Mutex::new(tasks),
        }
    }

    /// Send a request and wait for its result.
    ///
    /// `params` serializing to `null` (e.g. `()`) sends no params at all.
    pub async fn send_request<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = match serde_json::to_value(params).map_err(Error::Serialization)? {
            Value::Null => None,
            value => Some(value),
        };
        let result = self.send_request_value(method, params).await?;
        serde_json::from_value(result).map_err(Error::Serialization)
    }

    pub async fn send_request_value(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }

        let (id, rx) = self.shared.correlator.lock().register(method);
        let request = Request::new(id.clone(), method.to_string(), params);

        let sent = match self.shared.codec.encode_request(&request) {
            Ok(line) => self.send_message(&line).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            self.shared.correlator.lock().cancel(&id);
            return Err(e);
        }

        // The sender only goes away without answering when the service is
        // torn down.
        rx.await.unwrap_or(Err(Error::Disposed))
    }

    /// Write an already-encoded line to the backend.
    pub async fn send_message(&self, json: &str) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        self.shared.traffic.log(&format!("==> {}", json));
        match self.writer.lock().await.as_mut() {
            Some(writer) => Ok(writer.write(json).await?),
            None => Err(Error::StdinClosed),
        }
    }

    /// Close the backend's stdin so it sees end-of-input. Further sends
    /// fail with `Error::StdinClosed`.
    pub async fn close_stdin(&self) -> Result<()> {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            self.shared.traffic.log("Closing stdin");
            writer.shutdown().await?;
        }
        Ok(())
    }

    /// Observe `SERVER_ERROR` responses to any request. The request itself
    /// still fails normally.
    pub fn register_for_request_error<F>(&self, subscriber: F) -> Subscription
    where
        F: Fn(&ResponseError) + Send + Sync + 'static,
    {
        self.shared.request_errors.subscribe(subscriber)
    }

    /// Observe transport faults, i.e. malformed input or unmatched responses
    /// when the service is not tolerant.
    pub fn register_for_transport_fault<F>(&self, subscriber: F) -> Subscription
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.shared.faults.subscribe(subscriber)
    }

    pub fn handler(&self) -> &H {
        &self.shared.handler
    }

    pub fn process(&self) -> Option<&ChildProcess> {
        self.process.as_ref()
    }

    pub fn has_exited(&self) -> bool {
        self.process.as_ref().is_some_and(ChildProcess::has_exited)
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    pub fn pending_requests(&self) -> usize {
        self.shared.correlator.lock().len()
    }

    /// Stop the service: close the traffic log, stop reading, and kill the
    /// backend if it is still running. Safe to call more than once.
    ///
    /// Pending requests are abandoned unless `fail_pending_on_close` is set.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shared.traffic.close();

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        if let Some(process) = &self.process {
            if process.kill() {
                tracing::debug!(pid = ?process.id(), "killed backend process");
            }
        }

        if self.shared.fail_pending_on_close {
            self.shared.fail_pending(|| Error::Disposed);
        }
    }
}

impl<H: ProtocolHandler> Drop for StdioService<H> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn boxed_writer<W>(writer: W) -> Box<dyn MessageWriter>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    Box::new(StreamWriter::new(writer))
}

async fn read_stdout<R, H>(mut reader: R, shared: Arc<Shared<H>>)
where
    R: AsyncRead + Unpin,
    H: ProtocolHandler,
{
    let mut framer = LineFramer::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("failed to read backend stdout: {}", e);
                break;
            }
        };

        for message in framer.feed(&buf[..n]) {
            if shared.is_disposed() {
                return;
            }
            if let Err(e) = shared.handle_message(&message) {
                shared.report_fault(e);
            }
        }
    }

    if let Some(fragment) = framer.take_remainder() {
        tracing::debug!("discarding unterminated output: {}", fragment);
    }
    tracing::debug!("backend stdout closed");

    if shared.fail_pending_on_close && !shared.is_disposed() {
        shared.fail_pending(|| Error::ProcessExited);
    }
}

async fn read_stderr<R, H>(mut reader: R, shared: Arc<Shared<H>>)
where
    R: AsyncRead + Unpin,
    H: ProtocolHandler,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]);
                tracing::debug!("backend stderr: {}", text.trim_end());
                shared.traffic.log(&format!("ERR {}", text));
            }
            Err(e) => {
                tracing::warn!("failed to read backend stderr: {}", e);
                break;
            }
        }
    }
}
