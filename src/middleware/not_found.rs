//! Terminal 404 stage.

use serde_json::{Map, Value};
use tracing::debug;

use crate::api_error::ApiError;
use crate::context::Context;
use crate::id;
use crate::message::{ErrorInfo, Message};

use super::{BoxFuture, Middleware, Next};

/// Answers every request that reaches it with a 404 error envelope whose
/// `details` is the unmatched path. Never calls `next`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NotFound;

pub fn not_found() -> NotFound {
    NotFound
}

impl Middleware for NotFound {
    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        _next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            let request = ctx.request();
            let simple = format!("{} not found", request.url());
            let info = ErrorInfo {
                id: ctx.state().request_id.clone().unwrap_or_else(id::error_id),
                name: "NotFound".to_owned(),
                status: 404,
                label: "Not Found".to_owned(),
                message: simple.clone(),
                simple,
                details: Some(Value::String(request.path().to_owned())),
                stack: None,
                extra: Map::new(),
            };
            debug!(method = %request.method(), url = %request.url(), "no route matched");
            ctx.respond(404, &Message::Error(info));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::request::Request;

    #[tokio::test]
    async fn responds_404_with_path_details() {
        let mut ctx = Context::new(Request::builder().uri("/missing?x=1").build());
        not_found().handle(&mut ctx, Next::empty()).await.unwrap();

        assert_eq!(ctx.response().status_code(), 404);
        let body: Value = serde_json::from_slice(ctx.response().body()).unwrap();
        assert_eq!(body["error"]["details"], json!("/missing"));
        assert_eq!(body["error"]["label"], json!("Not Found"));
        assert_eq!(body["error"]["simple"], json!("/missing?x=1 not found"));
        assert!(body["error"]["id"].as_str().unwrap().starts_with("e-"));
    }

    #[tokio::test]
    async fn reuses_tracked_request_id() {
        let mut ctx = Context::new(Request::builder().uri("/gone").build());
        ctx.state_mut().request_id = Some("req123".into());
        not_found().handle(&mut ctx, Next::empty()).await.unwrap();

        let body: Value = serde_json::from_slice(ctx.response().body()).unwrap();
        assert_eq!(body["error"]["id"], json!("req123"));
    }
}
