//! Tracking of requests awaiting a response from the backend.

use crate::error::{Error, Result};
use crate::service::bus::SubscriberList;
use crate::service::types::{RequestId, Response, ResponseError};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::oneshot;

pub type Outcome = Result<Value>;

/// A request that has been sent and not yet answered.
#[derive(Debug)]
pub struct PendingRequest {
    id: RequestId,
    method: String,
    responder: oneshot::Sender<Outcome>,
}

impl PendingRequest {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Complete the request with the backend's response.
    ///
    /// Server errors are published to `request_errors` before the request
    /// itself is failed.
    pub fn settle(self, response: Response, request_errors: &SubscriberList<ResponseError>) {
        match response.error {
            Some(mut error) => {
                error.method = Some(self.method.clone());
                if error.is_server_error() {
                    request_errors.publish(&error);
                }
                self.fail(Error::Request(error));
            }
            None => self.resolve(response.result.unwrap_or(Value::Null)),
        }
    }

    pub fn resolve(self, result: Value) {
        // The caller may have stopped waiting; that is not our problem.
        let _ = self.responder.send(Ok(result));
    }

    pub fn fail(self, error: Error) {
        let _ = self.responder.send(Err(error));
    }
}

/// Assigns request ids and maps them back to waiting callers.
#[derive(Debug)]
pub struct RequestCorrelator {
    next_id: u64,
    pending: HashMap<RequestId, PendingRequest>,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        RequestCorrelator {
            next_id: 1,
            pending: HashMap::new(),
        }
    }

    /// Allocate the next id and start tracking a request for `method`.
    pub fn register(&mut self, method: &str) -> (RequestId, oneshot::Receiver<Outcome>) {
        let id = self.next_id.to_string();
        self.next_id += 1;

        let (responder, rx) = oneshot::channel();
        self.pending.insert(
            id.clone(),
            PendingRequest {
                id: id.clone(),
                method: method.to_string(),
                responder,
            },
        );
        (id, rx)
    }

    /// Remove and return the request a response with `id` belongs to.
    pub fn take(&mut self, id: &str) -> Result<PendingRequest> {
        self.pending
            .remove(id)
            .ok_or_else(|| Error::UnknownRequestId { id: id.to_string() })
    }

    /// Forget a request without completing it.
    pub fn cancel(&mut self, id: &str) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Remove every pending request, in id order.
    pub fn drain(&mut self) -> Vec<PendingRequest> {
        let mut drained: Vec<PendingRequest> = self.pending.drain().map(|(_, p)| p).collect();
        drained.sort_by_key(|p| p.id.parse::<u64>().unwrap_or(u64::MAX));
        drained
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new()
    }
}
