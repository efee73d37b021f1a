//! Structured request logging.
//!
//! [`RequestLogger`] wraps the rest of the chain and emits exactly one
//! [`RequestRecord`] per request, whether it succeeded or failed. Install it
//! outermost: the ids set by the tracker and the error caught by the
//! translator are both visible to it on the way back up. A panic below it is
//! logged as a `Panic` error and returned as `Err`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::api_error::{ApiError, Exposure, DEFAULT_ERROR_MESSAGE};
use crate::context::Context;
use crate::message::ErrorInfo;

use super::{BoxFuture, LogError, Middleware, Next};

/// One log line's worth of request and response metadata.
#[derive(Clone, Debug, Serialize)]
pub struct RequestRecord {
    pub method: String,
    pub path: String,
    pub url: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub status: u16,
    pub request_id: Option<String>,
    pub transaction_id: Option<String>,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl RequestRecord {
    /// Snapshots `ctx` after the chain returned `result`.
    ///
    /// A propagating `Err` wins over an error the translator stored, since it
    /// is the one that decides the response.
    fn capture(ctx: &Context, result: &Result<(), ApiError>, started: Instant) -> Self {
        let request = ctx.request();
        let state = ctx.state();
        let (status, error) = match result {
            Err(err) => (
                err.status_or_default(),
                Some(err.to_info(Exposure::Fields, DEFAULT_ERROR_MESSAGE)),
            ),
            Ok(()) => (ctx.response().status_code(), ctx.error().cloned()),
        };

        Self {
            method: request.method().to_string(),
            path: request.path().to_owned(),
            url: request.url().to_owned(),
            ip: request.ip().map(|ip| ip.to_string()),
            user_agent: request.header("user-agent").map(str::to_owned),
            status,
            request_id: state.request_id.clone(),
            transaction_id: state.transaction_id.clone(),
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            error,
        }
    }
}

/// Destination for [`RequestRecord`]s.
///
/// Implemented for closures `Fn(&RequestRecord) -> Result<(), LogError>`.
pub trait LogSink: Send + Sync + 'static {
    fn record(&self, record: &RequestRecord) -> Result<(), LogError>;
}

impl<F> LogSink for F
where
    F: Fn(&RequestRecord) -> Result<(), LogError> + Send + Sync + 'static,
{
    fn record(&self, record: &RequestRecord) -> Result<(), LogError> {
        self(record)
    }
}

/// Emits records as `tracing` events: `info` for 1xx-3xx, `warn` for 4xx,
/// `error` for 5xx.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, r: &RequestRecord) -> Result<(), LogError> {
        let request_id = r.request_id.as_deref().unwrap_or("-");
        let transaction_id = r.transaction_id.as_deref().unwrap_or("-");
        let ip = r.ip.as_deref().unwrap_or("-");
        let user_agent = r.user_agent.as_deref().unwrap_or("-");
        let duration_ms = format!("{:.2}", r.duration_ms);
        let error_id = r.error.as_ref().map_or("-", |e| e.id.as_str());
        let error_message = r.error.as_ref().map_or("-", |e| e.message.as_str());

        match r.status {
            500.. => error!(
                method = %r.method, path = %r.path, status = r.status, %duration_ms,
                request_id, transaction_id, ip, user_agent, error_id, error_message,
                "server error"
            ),
            400..=499 => warn!(
                method = %r.method, path = %r.path, status = r.status, %duration_ms,
                request_id, transaction_id, ip, user_agent, error_id, error_message,
                "client error"
            ),
            _ => info!(
                method = %r.method, path = %r.path, status = r.status, %duration_ms,
                request_id, transaction_id, ip, user_agent,
                "request completed"
            ),
        }
        Ok(())
    }
}

/// Wraps the chain and logs one record per request.
///
/// ```rust
/// use handles::middleware::RequestLogger;
///
/// let logger = RequestLogger::from_fn(|record| {
///     println!("{} {} {}", record.method, record.path, record.status);
///     Ok(())
/// });
/// ```
#[derive(Clone)]
pub struct RequestLogger {
    sink: Arc<dyn LogSink>,
}

impl RequestLogger {
    pub fn new(sink: impl LogSink) -> Self {
        Self { sink: Arc::new(sink) }
    }

    /// Same as [`new`](Self::new), with closure argument types inferred.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&RequestRecord) -> Result<(), LogError> + Send + Sync + 'static,
    {
        Self::new(f)
    }

    /// Logs through [`TracingSink`].
    pub fn tracing() -> Self {
        Self::new(TracingSink)
    }

    /// Hands `record` to the sink. A failing or panicking sink is reported
    /// and swallowed.
    fn emit(&self, record: &RequestRecord) {
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.sink.record(record))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(method = %record.method, path = %record.path, status = record.status, "request log sink failed: {e}"),
            Err(_) => error!(method = %record.method, path = %record.path, status = record.status, "request log sink panicked"),
        }
    }
}

impl Default for RequestLogger {
    fn default() -> Self { Self::tracing() }
}

impl Middleware for RequestLogger {
    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            let started = Instant::now();
            let mut result = match AssertUnwindSafe(next.run(ctx)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(ApiError::from_panic(panic)),
            };

            // An id given here is the one an outer translator will reuse, so
            // the log line and the response agree.
            if let Err(err) = &mut result {
                err.ensure_id();
            }

            let record = RequestRecord::capture(ctx, &result, started);
            self.emit(&record);
            result
        })
    }
}
