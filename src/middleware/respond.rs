//! Response normalizer.
//!
//! [`response`] turns a handler into a stage that always answers with the
//! standard JSON envelope; [`custom_response`] lets the handler build the
//! response itself.

use std::marker::PhantomData;

use tracing::debug;

use crate::api_error::ApiError;
use crate::context::Context;
use crate::handler::Handler;
use crate::message::IntoReply;
use crate::response::IntoResponse;

use super::{BoxFuture, Middleware, Next};

/// Wraps `handler` so its result is sent as an envelope.
///
/// The handler's `Err` propagates untouched; put an
/// [`ErrorTranslator`](super::ErrorTranslator) in front to turn it into a
/// response.
pub fn response<H, T>(handler: H) -> Respond<H, T>
where
    H: Handler<T>,
    T: IntoReply + Send + 'static,
{
    Respond { handler, _reply: PhantomData }
}

/// Wraps `handler` so its result replaces the response body verbatim.
///
/// Headers already set by earlier stages are kept.
pub fn custom_response<H, T>(handler: H) -> CustomRespond<H, T>
where
    H: Handler<T>,
    T: IntoResponse + Send + 'static,
{
    CustomRespond { handler, _response: PhantomData }
}

/// Stage built by [`response`].
pub struct Respond<H, T> {
    handler: H,
    _reply: PhantomData<fn() -> T>,
}

impl<H, T> Middleware for Respond<H, T>
where
    H: Handler<T>,
    T: IntoReply + Send + 'static,
{
    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        _next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            let result = self.handler.call(ctx.request().clone()).await?;
            let response = result.into_reply()?.into_api_response();

            for (name, value) in response.headers() {
                ctx.set(name, value);
            }
            ctx.respond(response.status_code(), response.message());
            debug!(status = response.status_code(), path = %ctx.request().path(), "response sent");
            Ok(())
        })
    }
}

/// Stage built by [`custom_response`].
pub struct CustomRespond<H, T> {
    handler: H,
    _response: PhantomData<fn() -> T>,
}

impl<H, T> Middleware for CustomRespond<H, T>
where
    H: Handler<T>,
    T: IntoResponse + Send + 'static,
{
    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        _next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            let result = self.handler.call(ctx.request().clone()).await?;
            ctx.response_mut().merge(result.into_response());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::message::{ApiResponse, Message};
    use crate::request::Request;

    async fn run(mw: &impl Middleware) -> (Context, Result<(), ApiError>) {
        let mut ctx = Context::new(Request::builder().uri("/ok").build());
        let result = mw.handle(&mut ctx, Next::empty()).await;
        (ctx, result)
    }

    fn body(ctx: &Context) -> Value {
        serde_json::from_slice(ctx.response().body()).unwrap()
    }

    #[tokio::test]
    async fn plain_data_is_wrapped() {
        let mw = response(|_req: Request| async { Ok::<_, ApiError>("ok") });
        let (ctx, result) = run(&mw).await;
        assert!(result.is_ok());
        assert_eq!(ctx.response().status_code(), 200);
        assert_eq!(ctx.response().header("content-type"), Some("application/json; charset=utf-8"));
        assert_eq!(body(&ctx), json!({"data": "ok"}));
    }

    #[tokio::test]
    async fn api_response_passes_through() {
        let mw = response(|_req: Request| async {
            Ok::<_, ApiError>(
                ApiResponse::new(Message::Data(json!({"id": 9})))
                    .status(201)
                    .header("location", "/things/9"),
            )
        });
        let (ctx, _) = run(&mw).await;
        assert_eq!(ctx.response().status_code(), 201);
        assert_eq!(ctx.response().header("location"), Some("/things/9"));
        assert_eq!(body(&ctx), json!({"data": {"id": 9}}));
    }

    #[tokio::test]
    async fn handler_errors_propagate() {
        let mw = response(|_req: Request| async {
            Err::<String, _>(ApiError::new("nope").with_status(409))
        });
        let (ctx, result) = run(&mw).await;
        assert_eq!(result.unwrap_err().status(), Some(409));
        // nothing was written
        assert_eq!(ctx.response().status_code(), 404);
    }

    #[tokio::test]
    async fn custom_response_sets_body_verbatim() {
        let mw = custom_response(|_req: Request| async { Ok::<_, ApiError>("one") });
        let (ctx, _) = run(&mw).await;
        assert_eq!(ctx.response().status_code(), 200);
        assert_eq!(ctx.response().body(), b"one");
    }
}
