//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. A router is itself a
//! middleware stage: a matched route runs in its place, an unmatched request
//! falls through to `next`, which is where a
//! [`NotFound`](crate::middleware::NotFound) stage belongs.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::api_error::ApiError;
use crate::context::Context;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, Next};

/// The application router.
///
/// Build it once at startup and add it to an [`App`](crate::App). Each
/// registration returns `self` so routes chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedMiddleware>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a stage for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust
    /// # use handles::{middleware::response, ApiError, Method, Request, Router};
    /// # async fn get_user(_: Request) -> Result<String, ApiError> { Ok(String::new()) }
    /// # async fn create_user(_: Request) -> Result<String, ApiError> { Ok(String::new()) }
    /// Router::new()
    ///     .on(Method::GET,  "/users/{id}", response(get_user))
    ///     .on(Method::POST, "/users",      response(create_user));
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered. Routes are fixed at startup, so this is a programming error.
    pub fn on(mut self, method: Method, path: &str, route: impl Middleware) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, Arc::new(route) as BoxedMiddleware)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, route: impl Middleware) -> Self {
        self.on(Method::GET, path, route)
    }

    pub fn post(self, path: &str, route: impl Middleware) -> Self {
        self.on(Method::POST, path, route)
    }

    pub fn put(self, path: &str, route: impl Middleware) -> Self {
        self.on(Method::PUT, path, route)
    }

    pub fn patch(self, path: &str, route: impl Middleware) -> Self {
        self.on(Method::PATCH, path, route)
    }

    pub fn delete(self, path: &str, route: impl Middleware) -> Self {
        self.on(Method::DELETE, path, route)
    }

    fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(&BoxedMiddleware, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((matched.value, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl Middleware for Router {
    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            let found = self.lookup(ctx.request().method(), ctx.request().path());
            match found {
                Some((route, params)) => {
                    ctx.request_mut().set_params(params);
                    route.handle(ctx, next).await
                }
                None => {
                    debug!(method = %ctx.request().method(), path = %ctx.request().path(), "no route");
                    next.run(ctx).await
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::middleware::{not_found, response};
    use crate::request::Request;
    use crate::App;

    async fn user(req: Request) -> Result<Value, ApiError> {
        Ok(json!({"id": req.param("id")}))
    }

    fn app() -> App {
        App::new()
            .with(Router::new().get("/users/{id}", response(user)))
            .with(not_found())
    }

    #[tokio::test]
    async fn matched_route_receives_params() {
        let res = app().call(Request::builder().uri("/users/42").build()).await;
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body, json!({"data": {"id": "42"}}));
    }

    #[tokio::test]
    async fn unmatched_method_falls_through() {
        let req = Request::builder().method(Method::POST).uri("/users/42").build();
        assert_eq!(app().call(req).await.status_code(), 404);
    }

    #[tokio::test]
    async fn unmatched_path_falls_through() {
        let res = app().call(Request::builder().uri("/nope").build()).await;
        assert_eq!(res.status_code(), 404);
    }
}
