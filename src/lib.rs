//! # handles
//!
//! Uniform JSON API plumbing for hyper services: every response is an
//! envelope, every error is safe to show, every request is traceable.
//!
//! ## The contract
//!
//! A client of an API built with handles only ever sees two body shapes:
//!
//! ```text
//! {"data": ...}
//! {"error": {"id", "name", "status", "label", "simple", "message"}}
//! ```
//!
//! and every response carries `x-request-id`, `x-transaction-id` and
//! `x-response-time` headers.
//!
//! That contract is produced by five small [`middleware`] stages composed in
//! an [`App`]:
//!
//! - [`RequestLogger`](middleware::RequestLogger): one structured record per request
//! - [`ErrorTranslator`](middleware::ErrorTranslator): errors and panics → error envelope
//! - [`Tracker`](middleware::Tracker): correlation ids and timing
//! - [`response`](middleware::response): handler results → data envelope
//! - [`NotFound`](middleware::NotFound): 404 envelope for unmatched paths
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use handles::middleware::{self, ErrorTranslator, RequestLogger, Tracker};
//! use handles::{ApiError, App, Request, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), handles::Error> {
//!     let routes = Router::new()
//!         .get("/ok", middleware::response(ok))
//!         .get("/users/{id}", middleware::response(get_user));
//!
//!     let app = App::new()
//!         .with(RequestLogger::tracing())
//!         .with(ErrorTranslator::new())
//!         .with(Tracker::default())
//!         .with(routes)
//!         .with(middleware::not_found());
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! async fn ok(_req: Request) -> Result<&'static str, ApiError> {
//!     Ok("ok")
//! }
//!
//! async fn get_user(req: Request) -> Result<serde_json::Value, ApiError> {
//!     let id: u64 = req.param("id").unwrap_or_default().parse()?;
//!     Ok(serde_json::json!({ "id": id, "request_id": req.state().request_id }))
//! }
//! ```

mod api_error;
mod app;
mod context;
mod error;
mod id;
mod message;
mod request;
mod response;
mod router;
mod server;

pub mod handler;
pub mod middleware;

pub use api_error::{
    ApiError, Exposure, DEFAULT_ERROR_LABEL, DEFAULT_ERROR_MESSAGE, DEFAULT_ERROR_STATUS,
};
pub use app::App;
pub use context::{Context, RequestState};
pub use error::Error;
pub use handler::Handler;
pub use id::base62;
pub use message::{ApiResponse, Data, ErrorInfo, IntoReply, Message, Reply};
pub use request::{Request, RequestBuilder};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;

// Re-exported so handler code can name methods and statuses without a direct
// `http` dependency.
pub use http::{Method, StatusCode};
