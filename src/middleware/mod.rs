//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns. Every stage has the same contract:
//!
//! ```text
//! handle(&self, ctx: &mut Context, next: Next) -> Future<Result<(), ApiError>>
//! ```
//!
//! A stage does its "before" work, calls `next.run(ctx).await` to hand the
//! request to the rest of the chain, then does its "after" work with the
//! result. A terminal stage simply never calls `next`.
//!
//! Built-in stages, in the order an API usually installs them:
//!
//! | Stage | Job |
//! |---|---|
//! | [`RequestLogger`] | one structured log record per request |
//! | [`ErrorTranslator`] | turns any `Err` or panic below it into an error envelope |
//! | [`Tracker`] | request/transaction ids, `x-response-time` |
//! | [`Router`](crate::Router) with [`response`] handlers | the actual API |
//! | [`NotFound`] | 404 envelope for everything the router did not match |

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::api_error::ApiError;
use crate::context::Context;

mod errors;
mod logger;
mod not_found;
mod respond;
mod tracking;

pub use errors::{ErrorConfig, ErrorLog, ErrorLogger, ErrorTranslator, TracingLogger};
pub use logger::{LogSink, RequestLogger, RequestRecord, TracingSink};
pub use not_found::{not_found, NotFound};
pub use respond::{custom_response, response, CustomRespond, Respond};
pub use tracking::{
    TrackingConfig, Tracker, TransactionTrust, POWERED_BY, REQUEST_ID, RESPONSE_TIME,
    TRANSACTION_ID,
};

/// A heap-allocated, type-erased future borrowing from the current stage.
///
/// `Send` lets tokio move the request task across worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a failing logger or sink returns. Always caught, never propagated.
pub type LogError = Box<dyn std::error::Error + Send + Sync>;

/// One stage of the request pipeline.
pub trait Middleware: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), ApiError>>;
}

/// A shared, type-erased middleware stage.
pub type BoxedMiddleware = Arc<dyn Middleware>;

impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        (**self).handle(ctx, next)
    }
}

/// The remainder of the chain after the current stage.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    rest: &'a [BoxedMiddleware],
}

impl<'a> Next<'a> {
    pub(crate) fn new(rest: &'a [BoxedMiddleware]) -> Self {
        Self { rest }
    }

    /// A `Next` with nothing after it. Useful for calling a stage directly.
    pub fn empty() -> Next<'static> {
        Next { rest: &[] }
    }

    /// Runs the rest of the chain. An exhausted chain is a no-op.
    pub async fn run(self, ctx: &mut Context) -> Result<(), ApiError> {
        match self.rest.split_first() {
            Some((head, rest)) => head.handle(ctx, Next { rest }).await,
            None => Ok(()),
        }
    }
}
