//! The ordered middleware chain.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use http::StatusCode;
use tracing::error;

use crate::api_error::ApiError;
use crate::context::Context;
use crate::middleware::{BoxedMiddleware, Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// An application: middleware stages run in the order they were added.
///
/// ```rust
/// use handles::{middleware, ApiError, App, Request, Router};
///
/// async fn ok(_req: Request) -> Result<&'static str, ApiError> {
///     Ok("ok")
/// }
///
/// let routes = Router::new().get("/ok", middleware::response(ok));
///
/// let app = App::new()
///     .with(middleware::ErrorTranslator::new())
///     .with(middleware::Tracker::default())
///     .with(routes)
///     .with(middleware::not_found());
/// ```
#[derive(Clone, Default)]
pub struct App {
    chain: Vec<BoxedMiddleware>,
}

impl App {
    pub fn new() -> Self {
        Self { chain: Vec::new() }
    }

    /// Appends a stage. Returns `self` for chaining.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.chain.push(Arc::new(middleware));
        self
    }

    /// Runs `ctx` through the whole chain and returns what the first stage
    /// returned.
    pub async fn handle(&self, ctx: &mut Context) -> Result<(), ApiError> {
        Next::new(&self.chain).run(ctx).await
    }

    /// Runs one request through the chain and produces the response to send.
    ///
    /// An error or panic that escapes every stage (no [`ErrorTranslator`]
    /// installed) becomes a bare status response and an error log line; it
    /// never reaches the connection.
    ///
    /// [`ErrorTranslator`]: crate::middleware::ErrorTranslator
    pub async fn call(&self, request: Request) -> Response {
        let mut ctx = Context::new(request);
        let result = match AssertUnwindSafe(self.handle(&mut ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(ApiError::from_panic(panic)),
        };
        if let Err(err) = result {
            error!(name = %err.name(), "unhandled error escaped the middleware chain: {err}");
            let status = err.status_or_default();
            let reason = StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Error");
            ctx.response_mut().merge(Response::builder().status(status).text(reason));
        }
        ctx.into_response()
    }
}
