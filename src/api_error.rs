//! Request-path failures.
//!
//! Anything a handler or middleware returns as `Err` is an [`ApiError`]. Any
//! `std::error::Error` converts into one, so `?` works in handlers:
//!
//! ```rust
//! use handles::{ApiError, Request};
//!
//! async fn parse(req: Request) -> Result<u64, ApiError> {
//!     let id = req.param("id").unwrap_or("0").parse::<u64>()?;
//!     Ok(id)
//! }
//! ```
//!
//! Errors that are meant for clients carry their own `status`, `label` and
//! `simple` text:
//!
//! ```rust
//! use handles::ApiError;
//!
//! let err = ApiError::named("ValidationError", "email is required")
//!     .with_status(400)
//!     .with_label("Validation Error")
//!     .with_simple("Please supply an email address")
//!     .with_field("field", "email");
//! assert_eq!(err.status(), Some(400));
//! ```

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::id;
use crate::message::ErrorInfo;

/// Label used when an error has none.
pub const DEFAULT_ERROR_LABEL: &str = "Request Error";

/// Client-facing message used when an error has none.
pub const DEFAULT_ERROR_MESSAGE: &str = "Request Error";

/// Status used when an error has none, or an invalid one.
pub const DEFAULT_ERROR_STATUS: u16 = 500;

/// Keys that belong to [`ErrorInfo`] itself and can never be set as extra fields.
const RESERVED_FIELDS: &[&str] = &[
    "id", "name", "status", "label", "simple", "message", "details", "stack",
];

/// A failure raised while handling a request.
///
/// Does not implement `std::error::Error`: the blanket
/// `From<E: std::error::Error>` below would overlap the reflexive
/// `From<ApiError>`.
#[derive(Debug, Clone)]
pub struct ApiError {
    name: String,
    message: String,
    status: Option<u16>,
    label: Option<String>,
    simple: Option<String>,
    id: Option<String>,
    details: Option<Value>,
    fields: Map<String, Value>,
    /// Unresolved; symbols are looked up only when the stack is rendered.
    backtrace: Option<Arc<Backtrace>>,
}

/// How much of an error a projection into [`ErrorInfo`] may reveal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exposure {
    /// `id`, `name`, `status`, `label` and `simple` only. `message` falls back
    /// to `simple`.
    Defaults,
    /// Every field the error carries except the stack.
    Fields,
    /// Every field, stack included.
    Full,
}

impl ApiError {
    /// A generic `Error` with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self::named("Error", message)
    }

    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            status: None,
            label: None,
            simple: None,
            id: None,
            details: None,
            fields: Map::new(),
            backtrace: capture_backtrace(),
        }
    }

    /// Builds an error from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_owned()
        };
        Self::named("Panic", message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_simple(mut self, simple: impl Into<String>) -> Self {
        self.simple = Some(simple.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Replaces the captured backtrace, e.g. with one taken where the
    /// underlying failure happened. Ignored unless `bt` was captured.
    pub fn with_backtrace(mut self, bt: Backtrace) -> Self {
        self.backtrace = captured(bt);
        self
    }

    pub fn with_details(mut self, details: impl Into<Value>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Attaches an extra field. Names reserved by [`ErrorInfo`] are ignored.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if !RESERVED_FIELDS.contains(&key.as_str()) {
            self.fields.insert(key, value.into());
        }
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn message(&self) -> &str { &self.message }
    pub fn status(&self) -> Option<u16> { self.status }
    pub fn label(&self) -> Option<&str> { self.label.as_deref() }
    pub fn simple(&self) -> Option<&str> { self.simple.as_deref() }
    pub fn id(&self) -> Option<&str> { self.id.as_deref() }
    pub fn details(&self) -> Option<&Value> { self.details.as_ref() }
    pub fn fields(&self) -> &Map<String, Value> { &self.fields }
    pub fn backtrace(&self) -> Option<&Backtrace> { self.backtrace.as_deref() }

    /// The rendered backtrace, if one was captured.
    pub fn stack(&self) -> Option<String> {
        self.backtrace.as_ref().map(|bt| bt.to_string())
    }

    /// The status to answer with: the error's own if it is a valid HTTP
    /// status, otherwise 500.
    pub fn status_or_default(&self) -> u16 {
        self.status
            .filter(|s| http::StatusCode::from_u16(*s).is_ok())
            .unwrap_or(DEFAULT_ERROR_STATUS)
    }

    /// Assigns a fresh `e-` id if the error has none and returns it.
    pub fn ensure_id(&mut self) -> &str {
        self.id.get_or_insert_with(id::error_id)
    }

    /// Projects the error into its wire shape.
    ///
    /// `message` precedence: an explicit, non-empty message (only when fields
    /// are exposed), then `simple`, then `default_message`.
    pub fn to_info(&self, exposure: Exposure, default_message: &str) -> ErrorInfo {
        let exposed = exposure != Exposure::Defaults;
        let simple = non_empty(self.simple.as_deref()).unwrap_or(default_message);
        let message = if exposed {
            non_empty(Some(self.message.as_str())).unwrap_or(simple)
        } else {
            simple
        };

        ErrorInfo {
            id: self.id.clone().unwrap_or_else(id::error_id),
            name: self.name.clone(),
            status: self.status_or_default(),
            label: non_empty(self.label.as_deref())
                .unwrap_or(DEFAULT_ERROR_LABEL)
                .to_owned(),
            simple: simple.to_owned(),
            message: message.to_owned(),
            details: if exposed { self.details.clone() } else { None },
            stack: if exposure == Exposure::Full { self.stack() } else { None },
            extra: if exposed { self.fields.clone() } else { Map::new() },
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl<E> From<E> for ApiError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::named(short_type_name::<E>(), err.to_string())
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

/// `core::num::error::ParseIntError` → `ParseIntError`.
fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_owned()
}

/// Frames only, per `RUST_BACKTRACE`. Symbol resolution waits for [`ApiError::stack`].
fn capture_backtrace() -> Option<Arc<Backtrace>> {
    captured(Backtrace::capture())
}

fn captured(bt: Backtrace) -> Option<Arc<Backtrace>> {
    match bt.status() {
        BacktraceStatus::Captured => Some(Arc::new(bt)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_std_errors_with_type_name() {
        let err: ApiError = "x".parse::<u32>().unwrap_err().into();
        assert_eq!(err.name(), "ParseIntError");
        assert_eq!(err.message(), "invalid digit found in string");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let info = ApiError::new("db connection refused")
            .with_id("e-fixed")
            .to_info(Exposure::Defaults, DEFAULT_ERROR_MESSAGE);
        assert_eq!(info.id, "e-fixed");
        assert_eq!(info.name, "Error");
        assert_eq!(info.status, 500);
        assert_eq!(info.label, "Request Error");
        assert_eq!(info.simple, "Request Error");
        // the internal message never leaks without exposure
        assert_eq!(info.message, "Request Error");
    }

    #[test]
    fn exposed_message_precedence() {
        let explicit = ApiError::new("explicit").with_simple("simple");
        assert_eq!(explicit.to_info(Exposure::Fields, "d").message, "explicit");

        let simple_only = ApiError::new("").with_simple("simple");
        assert_eq!(simple_only.to_info(Exposure::Fields, "d").message, "simple");

        let neither = ApiError::new("");
        assert_eq!(neither.to_info(Exposure::Fields, "d").message, "d");
    }

    #[test]
    fn invalid_status_falls_back_to_500() {
        assert_eq!(ApiError::new("x").with_status(42).status_or_default(), 500);
        assert_eq!(ApiError::new("x").with_status(409).status_or_default(), 409);
    }

    #[test]
    fn reserved_fields_are_ignored() {
        let err = ApiError::new("x").with_field("status", 200).with_field("code", "E1");
        assert!(!err.fields().contains_key("status"));
        assert_eq!(err.fields().get("code"), Some(&Value::from("E1")));
    }

    #[test]
    fn ensure_id_is_stable() {
        let mut err = ApiError::new("x");
        let first = err.ensure_id().to_owned();
        assert!(first.starts_with("e-"));
        assert_eq!(err.ensure_id(), first);
    }

    #[test]
    fn stack_is_rendered_for_full_exposure_only() {
        let err = ApiError::new("x").with_backtrace(Backtrace::force_capture());
        assert!(err.backtrace().is_some());
        assert!(err.to_info(Exposure::Full, "d").stack.is_some());
        assert!(err.to_info(Exposure::Fields, "d").stack.is_none());
        assert!(err.to_info(Exposure::Defaults, "d").stack.is_none());

        let disabled = ApiError::new("x").with_backtrace(Backtrace::disabled());
        assert!(disabled.backtrace().is_none());
        assert!(disabled.to_info(Exposure::Full, "d").stack.is_none());
    }

    #[test]
    fn panic_payloads_become_messages() {
        let err = ApiError::from_panic(Box::new("boom"));
        assert_eq!(err.name(), "Panic");
        assert_eq!(err.message(), "boom");
    }
}
