//! Error translator: the failure boundary of the chain.
//!
//! Everything below an [`ErrorTranslator`] can fail freely. An `Err` or a
//! panic is caught here and turned into an `{"error": ...}` envelope. What
//! that envelope reveals is decided by an allow-list of error names:
//!
//! | Error | Fields sent |
//! |---|---|
//! | not allowed (default) | `id`, `name`, `status`, `label`, `simple`, `message` = `simple` |
//! | name in `allowed_errors` | the above plus its own `message`, `details`, extra fields |
//! | `send_full_errors` | everything, `stack` included |
//!
//! Caught errors can be reported to an injected [`ErrorLogger`]. A logger
//! that fails is reported through `tracing` and otherwise ignored.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::api_error::{ApiError, Exposure, DEFAULT_ERROR_MESSAGE};
use crate::context::Context;
use crate::message::Message;

use super::{BoxFuture, LogError, Middleware, Next};

// ── Configuration ─────────────────────────────────────────────────────────────

/// Plain-data options of an [`ErrorTranslator`].
///
/// Deserialisable, so it can live in an application's config file:
///
/// ```rust
/// use handles::middleware::ErrorConfig;
///
/// let config: ErrorConfig = serde_json::from_str(r#"{
///     "allowed_errors": ["ValidationError"],
///     "default_error_message": "Something went wrong"
/// }"#).unwrap();
/// assert!(!config.send_full_errors);
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ErrorConfig {
    /// Call the logger with `(context, error)`.
    pub logger_pass_args: bool,
    /// Call the logger with one structured JSON object.
    pub logger_pass_object: bool,
    /// Expose every field of every error, stack included. Development only.
    pub send_full_errors: bool,
    /// Error names whose own fields may be sent to clients.
    pub allowed_errors: HashSet<String>,
    /// `simple`/`message` used when an error has nothing safe to show.
    pub default_error_message: String,
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self {
            logger_pass_args: false,
            logger_pass_object: false,
            send_full_errors: false,
            allowed_errors: HashSet::new(),
            default_error_message: DEFAULT_ERROR_MESSAGE.to_owned(),
        }
    }
}

// ── Logger capability ─────────────────────────────────────────────────────────

/// What an [`ErrorLogger`] is called with, chosen by the config flags.
pub enum ErrorLog<'a> {
    /// `logger_pass_args`: the raw context and error.
    Context { ctx: &'a Context, error: &'a ApiError },
    /// `logger_pass_object`: request metadata and the full error as JSON.
    Object(&'a Value),
    /// Default: `Error in [GET /path] rid[..] tid[..]` and the error.
    Message { message: &'a str, error: &'a ApiError },
}

/// Receives errors caught by an [`ErrorTranslator`].
///
/// Implemented for closures `Fn(ErrorLog<'_>) -> Result<(), LogError>`.
pub trait ErrorLogger: Send + Sync + 'static {
    fn log(&self, entry: ErrorLog<'_>) -> Result<(), LogError>;
}

impl<F> ErrorLogger for F
where
    F: Fn(ErrorLog<'_>) -> Result<(), LogError> + Send + Sync + 'static,
{
    fn log(&self, entry: ErrorLog<'_>) -> Result<(), LogError> {
        self(entry)
    }
}

/// Logs caught errors at `error` level through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl ErrorLogger for TracingLogger {
    fn log(&self, entry: ErrorLog<'_>) -> Result<(), LogError> {
        match entry {
            ErrorLog::Context { ctx, error } => error!(
                method = %ctx.request().method(),
                path = %ctx.request().path(),
                request_id = ctx.state().request_id.as_deref().unwrap_or("-"),
                error_id = error.id().unwrap_or("-"),
                "{error}"
            ),
            ErrorLog::Object(object) => error!(%object, "request error"),
            ErrorLog::Message { message, error } => error!(error_id = error.id().unwrap_or("-"), "{message}: {error}"),
        }
        Ok(())
    }
}

// ── ErrorTranslator ───────────────────────────────────────────────────────────

/// Catches failures from the rest of the chain and answers with an error
/// envelope. Never lets an error, or a panic, escape.
///
/// ```rust
/// use handles::middleware::{ErrorTranslator, TracingLogger};
///
/// let errors = ErrorTranslator::new()
///     .allow("ValidationError")
///     .logger(TracingLogger);
/// ```
#[derive(Clone, Default)]
pub struct ErrorTranslator {
    config: ErrorConfig,
    logger: Option<Arc<dyn ErrorLogger>>,
}

impl ErrorTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ErrorConfig) -> Self {
        Self { config, logger: None }
    }

    pub fn logger(mut self, logger: impl ErrorLogger) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Same as [`logger`](Self::logger), with closure argument types inferred.
    pub fn logger_fn<F>(self, f: F) -> Self
    where
        F: Fn(ErrorLog<'_>) -> Result<(), LogError> + Send + Sync + 'static,
    {
        self.logger(f)
    }

    pub fn logger_pass_args(mut self, on: bool) -> Self {
        self.config.logger_pass_args = on;
        self
    }

    pub fn logger_pass_object(mut self, on: bool) -> Self {
        self.config.logger_pass_object = on;
        self
    }

    pub fn send_full_errors(mut self, on: bool) -> Self {
        self.config.send_full_errors = on;
        self
    }

    /// Adds an error name to the allow-list.
    pub fn allow(mut self, name: impl Into<String>) -> Self {
        self.config.allowed_errors.insert(name.into());
        self
    }

    pub fn default_error_message(mut self, message: impl Into<String>) -> Self {
        self.config.default_error_message = message.into();
        self
    }

    pub fn config(&self) -> &ErrorConfig {
        &self.config
    }

    fn exposure(&self, error: &ApiError) -> Exposure {
        if self.config.send_full_errors {
            Exposure::Full
        } else if self.config.allowed_errors.contains(error.name()) {
            Exposure::Fields
        } else {
            Exposure::Defaults
        }
    }

    /// Writes the error envelope and records the unredacted error on the
    /// context. The stack is rendered only when it is sent.
    fn recover(&self, ctx: &mut Context, error: &ApiError) {
        let default_message = &self.config.default_error_message;
        let public = error.to_info(self.exposure(error), default_message);
        let internal = if self.config.send_full_errors {
            public.clone()
        } else {
            error.to_info(Exposure::Fields, default_message)
        };

        ctx.respond(public.status, &Message::Error(public));
        ctx.set_error(internal);
    }

    fn report(&self, ctx: &Context, error: &ApiError) {
        let Some(logger) = &self.logger else { return };

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            if self.config.logger_pass_args {
                logger.log(ErrorLog::Context { ctx, error })
            } else if self.config.logger_pass_object {
                let object = self.log_object(ctx, error);
                logger.log(ErrorLog::Object(&object))
            } else {
                let message = log_message(ctx);
                logger.log(ErrorLog::Message { message: &message, error })
            }
        }));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error_id = error.id().unwrap_or("-"), "error logger failed: {e}; original error: {error}"),
            Err(_) => error!(error_id = error.id().unwrap_or("-"), "error logger panicked; original error: {error}"),
        }
    }

    fn log_object(&self, ctx: &Context, error: &ApiError) -> Value {
        let request = ctx.request();
        let state = ctx.state();
        json!({
            "message": log_message(ctx),
            "request_id": state.request_id,
            "transaction_id": state.transaction_id,
            "method": request.method().as_str(),
            "path": request.path(),
            "url": request.url(),
            "ip": request.ip().map(|ip| ip.to_string()),
            "status": ctx.response().status_code(),
            "error": error.to_info(Exposure::Full, &self.config.default_error_message),
        })
    }
}

/// `Error in [GET /path] rid[abc] tid[xyz]`; id parts only when tracked.
fn log_message(ctx: &Context) -> String {
    let request = ctx.request();
    let state = ctx.state();
    let mut msg = format!("Error in [{} {}]", request.method(), request.path());
    if let Some(rid) = &state.request_id {
        msg.push_str(&format!(" rid[{rid}]"));
    }
    if let Some(tid) = &state.transaction_id {
        msg.push_str(&format!(" tid[{tid}]"));
    }
    msg
}

impl Middleware for ErrorTranslator {
    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            let outcome = AssertUnwindSafe(next.run(ctx)).catch_unwind().await;
            let mut error = match outcome {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(error)) => error,
                Err(panic) => ApiError::from_panic(panic),
            };
            error.ensure_id();

            debug!(
                method = %ctx.request().method(),
                path = %ctx.request().path(),
                name = %error.name(),
                "api error: {error}"
            );
            self.recover(ctx, &error);
            self.report(ctx, &error);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::backtrace::Backtrace;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::middleware::response;
    use crate::request::Request;
    use crate::App;

    fn failing(error: ApiError) -> impl Middleware {
        response(move |_req: Request| {
            let error = error.clone();
            async move { Err::<String, _>(error) }
        })
    }

    async fn run(app: App) -> Context {
        let mut ctx = Context::new(Request::builder().uri("/boom").build());
        app.handle(&mut ctx).await.unwrap();
        ctx
    }

    fn error_body(ctx: &Context) -> Value {
        let body: Value = serde_json::from_slice(ctx.response().body()).unwrap();
        body["error"].clone()
    }

    #[tokio::test]
    async fn plain_errors_get_defaults() {
        let app = App::new()
            .with(ErrorTranslator::new())
            .with(failing(ApiError::new("connection refused")));
        let ctx = run(app).await;

        assert_eq!(ctx.response().status_code(), 500);
        let err = error_body(&ctx);
        assert_eq!(err["label"], "Request Error");
        assert_eq!(err["simple"], "Request Error");
        assert_eq!(err["message"], "Request Error");
        assert_eq!(err["name"], "Error");
        assert!(err["id"].as_str().unwrap().starts_with("e-"));
        assert!(err.get("stack").is_none());
    }

    #[tokio::test]
    async fn explicit_status_and_label_are_kept() {
        let app = App::new()
            .with(ErrorTranslator::new())
            .with(failing(ApiError::named("Conflict", "dup").with_status(409).with_label("Conflict")));
        let ctx = run(app).await;

        assert_eq!(ctx.response().status_code(), 409);
        assert_eq!(error_body(&ctx)["label"], "Conflict");
        assert_eq!(error_body(&ctx)["message"], "Request Error");
    }

    #[tokio::test]
    async fn allowed_errors_expose_their_fields() {
        let app = App::new()
            .with(ErrorTranslator::new().allow("ValidationError"))
            .with(failing(
                ApiError::named("ValidationError", "email is required")
                    .with_status(400)
                    .with_details(json!({"field": "email"}))
                    .with_field("code", "E_EMAIL"),
            ));
        let ctx = run(app).await;

        let err = error_body(&ctx);
        assert_eq!(err["status"], 400);
        assert_eq!(err["message"], "email is required");
        assert_eq!(err["details"], json!({"field": "email"}));
        assert_eq!(err["code"], "E_EMAIL");
    }

    #[tokio::test]
    async fn unlisted_errors_hide_their_fields() {
        let app = App::new()
            .with(ErrorTranslator::new().allow("ValidationError"))
            .with(failing(ApiError::named("DbError", "secret").with_field("query", "select 1")));
        let err = error_body(&run(app).await);
        assert!(err.get("query").is_none());
        assert_eq!(err["message"], "Request Error");
    }

    #[tokio::test]
    async fn custom_default_message() {
        let app = App::new()
            .with(ErrorTranslator::new().default_error_message("Oops"))
            .with(failing(ApiError::new("secret")));
        let err = error_body(&run(app).await);
        assert_eq!(err["simple"], "Oops");
        assert_eq!(err["message"], "Oops");
    }

    #[tokio::test]
    async fn full_errors_expose_everything() {
        let app = App::new()
            .with(ErrorTranslator::new().send_full_errors(true))
            .with(failing(
                ApiError::named("DbError", "secret")
                    .with_backtrace(Backtrace::force_capture())
                    .with_field("query", "select 1"),
            ));
        let ctx = run(app).await;

        let err = error_body(&ctx);
        assert_eq!(err["message"], "secret");
        assert_eq!(err["query"], "select 1");
        assert!(!err["stack"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stack_needs_full_errors() {
        let app = App::new()
            .with(ErrorTranslator::new().allow("ValidationError"))
            .with(failing(
                ApiError::named("ValidationError", "bad input")
                    .with_backtrace(Backtrace::force_capture()),
            ));
        let ctx = run(app).await;

        let err = error_body(&ctx);
        assert_eq!(err["message"], "bad input");
        assert!(err.get("stack").is_none());
        assert!(ctx.error().unwrap().stack.is_none());
    }

    #[tokio::test]
    async fn panics_are_caught() {
        let app = App::new()
            .with(ErrorTranslator::new())
            .with(response(|_req: Request| async {
                if true {
                    panic!("kaboom");
                }
                Ok::<_, ApiError>("unreachable")
            }));
        let ctx = run(app).await;
        assert_eq!(ctx.response().status_code(), 500);
        assert_eq!(error_body(&ctx)["name"], "Panic");
        assert_eq!(ctx.error().unwrap().message, "kaboom");
    }

    #[tokio::test]
    async fn full_error_is_kept_on_context() {
        let app = App::new()
            .with(ErrorTranslator::new())
            .with(failing(ApiError::new("internal detail").with_id("e-known")));
        let ctx = run(app).await;
        let full = ctx.error().unwrap();
        assert_eq!(full.id, "e-known");
        assert_eq!(full.message, "internal detail");
        assert_eq!(error_body(&ctx)["id"], "e-known");
    }

    #[tokio::test]
    async fn logs_message_and_error_by_default() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let app = App::new()
            .with(ErrorTranslator::new().logger_fn(move |entry| {
                if let ErrorLog::Message { message, error } = entry {
                    sink.lock().unwrap().push(format!("{message} | {}", error.message()));
                }
                Ok(())
            }))
            .with(failing(ApiError::new("bad thing")));
        run(app).await;

        let lines = seen.lock().unwrap();
        assert_eq!(*lines, vec!["Error in [GET /boom] | bad thing".to_owned()]);
    }

    #[tokio::test]
    async fn logs_structured_object() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let app = App::new()
            .with(ErrorTranslator::new().logger_pass_object(true).logger_fn(move |entry| {
                if let ErrorLog::Object(object) = entry {
                    *sink.lock().unwrap() = Some(object.clone());
                }
                Ok(())
            }))
            .with(failing(ApiError::new("bad thing")));
        run(app).await;

        let object = seen.lock().unwrap().clone().unwrap();
        assert_eq!(object["path"], "/boom");
        assert_eq!(object["status"], 500);
        assert_eq!(object["error"]["message"], "bad thing");
    }

    #[tokio::test]
    async fn logs_context_when_passing_args() {
        let seen = Arc::new(Mutex::new(false));
        let sink = Arc::clone(&seen);
        let app = App::new()
            .with(ErrorTranslator::new().logger_pass_args(true).logger_fn(move |entry| {
                if let ErrorLog::Context { ctx, .. } = entry {
                    *sink.lock().unwrap() = ctx.response().status_code() == 500;
                }
                Ok(())
            }))
            .with(failing(ApiError::new("x")));
        run(app).await;
        assert!(*seen.lock().unwrap());
    }

    #[tokio::test]
    async fn failing_logger_does_not_escape() {
        let app = App::new()
            .with(ErrorTranslator::new().logger_fn(|_entry| Err("sink down".into())))
            .with(failing(ApiError::new("x").with_status(418)));
        let ctx = run(app).await;
        assert_eq!(ctx.response().status_code(), 418);
    }

    #[tokio::test]
    async fn panicking_logger_does_not_escape() {
        let app = App::new()
            .with(ErrorTranslator::new().logger_fn(|_entry| panic!("logger exploded")))
            .with(failing(ApiError::new("x")));
        let ctx = run(app).await;
        assert_eq!(ctx.response().status_code(), 500);
    }

    #[test]
    fn config_defaults() {
        let config: ErrorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.default_error_message, "Request Error");
        assert!(config.allowed_errors.is_empty());
    }
}
