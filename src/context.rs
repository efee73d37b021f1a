//! Per-request context threaded through the middleware chain.

use std::time::{Duration, Instant};

use crate::message::{ErrorInfo, Message};
use crate::request::Request;
use crate::response::Response;

/// Request-scoped tracking data.
///
/// Filled in by the [`Tracker`](crate::middleware::Tracker) and read by later
/// stages and handlers. Lives exactly as long as the request.
#[derive(Clone, Debug, Default)]
pub struct RequestState {
    pub request_id: Option<String>,
    pub transaction_id: Option<String>,
    pub request_time_start: Option<Instant>,
    pub request_time_total: Option<Duration>,
}

/// The mutable state of one request as it moves down and back up the chain.
///
/// Each stage gets `&mut Context`; no two stages run at the same time for
/// the same request.
#[derive(Debug)]
pub struct Context {
    request: Request,
    response: Response,
    error: Option<ErrorInfo>,
}

impl Context {
    /// A fresh context with an empty `404` response.
    pub fn new(request: Request) -> Self {
        Self { request, response: Response::default(), error: None }
    }

    pub fn request(&self) -> &Request { &self.request }
    pub fn request_mut(&mut self) -> &mut Request { &mut self.request }
    pub fn response(&self) -> &Response { &self.response }
    pub fn response_mut(&mut self) -> &mut Response { &mut self.response }

    pub fn state(&self) -> &RequestState { &self.request.state }
    pub fn state_mut(&mut self) -> &mut RequestState { &mut self.request.state }

    /// Shortcut for `response_mut().set_header(..)`.
    pub fn set(&mut self, name: &str, value: &str) {
        self.response.set_header(name, value);
    }

    /// Writes an envelope as the response.
    pub fn respond(&mut self, status: u16, message: &Message) {
        self.response.set_message(status, message);
    }

    /// The full, unredacted error caught by the
    /// [`ErrorTranslator`](crate::middleware::ErrorTranslator), if any.
    pub fn error(&self) -> Option<&ErrorInfo> { self.error.as_ref() }

    pub(crate) fn set_error(&mut self, error: ErrorInfo) {
        self.error = Some(error);
    }

    pub fn into_response(self) -> Response { self.response }
}
