//! The JSON envelope every API response is wrapped in.
//!
//! On the wire there are exactly two shapes:
//!
//! ```text
//! {"data": <anything>}
//! {"error": {"id", "name", "status", "label", "simple", "message", ...}}
//! ```
//!
//! Handlers passed to [`middleware::response`](crate::middleware::response)
//! return anything that implements [`IntoReply`]. What comes back decides how
//! much wrapping happens:
//!
//! | Handler returns | Sent as |
//! |---|---|
//! | [`ApiResponse`] | as-is, its own status and headers |
//! | [`Message`] | wrapped, 200 for data, the error's status for errors |
//! | anything else | `{"data": value}`, 200 |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::error;

use crate::api_error::ApiError;

// ── ErrorInfo ─────────────────────────────────────────────────────────────────

/// The `error` half of the envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub id: String,
    pub name: String,
    pub status: u16,
    pub label: String,
    pub simple: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Extra fields of an exposed error, flattened next to the fixed ones.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Message ───────────────────────────────────────────────────────────────────

/// A `{"data": ...}` or `{"error": ...}` envelope. Exactly one of the two.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Message {
    Data(Value),
    Error(ErrorInfo),
}

impl Message {
    /// Wraps any serialisable value as `{"data": value}`.
    pub fn data(value: impl Serialize) -> Result<Self, ApiError> {
        Ok(Self::Data(serde_json::to_value(value)?))
    }

    /// 200 for data, the carried status for errors.
    pub fn status(&self) -> u16 {
        match self {
            Self::Data(_) => 200,
            Self::Error(info) => info.status,
        }
    }

    /// Serialises the envelope.
    ///
    /// A `Value`/`ErrorInfo` tree always has string keys, so this cannot fail
    /// in practice. If it ever does, a fixed error body is sent instead.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|e| {
            error!("failed to serialise response envelope: {e}");
            br#"{"error":{"name":"Error","status":500,"label":"Request Error","simple":"Request Error","message":"Request Error"}}"#.to_vec()
        })
    }
}

// ── ApiResponse ───────────────────────────────────────────────────────────────

/// A fully built envelope response. Returned from a handler, it is sent
/// untouched.
///
/// ```rust
/// use handles::{ApiResponse, Message};
/// use serde_json::json;
///
/// let created = ApiResponse::new(Message::Data(json!({"id": 42})))
///     .status(201)
///     .header("location", "/users/42");
/// assert_eq!(created.status_code(), 201);
/// ```
#[derive(Clone, Debug)]
pub struct ApiResponse {
    status: u16,
    headers: Vec<(String, String)>,
    message: Message,
}

impl ApiResponse {
    pub fn new(message: Message) -> Self {
        Self { status: message.status(), headers: Vec::new(), message }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn status_code(&self) -> u16 { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn message(&self) -> &Message { &self.message }
}

// ── Reply / IntoReply ─────────────────────────────────────────────────────────

/// What a handler produced, before it is turned into a response.
#[derive(Debug)]
pub enum Reply {
    Response(ApiResponse),
    Message(Message),
    Data(Value),
}

impl Reply {
    /// Applies the classification rule from the module docs.
    pub fn into_api_response(self) -> ApiResponse {
        match self {
            Self::Response(response) => response,
            Self::Message(message) => ApiResponse::new(message),
            Self::Data(value) => ApiResponse::new(Message::Data(value)),
        }
    }
}

/// Conversion of a handler's return value into a [`Reply`].
///
/// Implemented for the envelope types, `serde_json::Value`, strings and
/// scalars. Wrap any other `Serialize` type in [`Data`].
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, ApiError>;
}

/// Wraps a serialisable value so it can be returned from a handler.
///
/// ```rust,ignore
/// #[derive(Serialize)]
/// struct User { id: u64, name: String }
///
/// async fn get_user(_req: Request) -> Result<Data<User>, ApiError> {
///     Ok(Data(User { id: 1, name: "alice".into() }))
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Data<T>(pub T);

impl<T: Serialize> IntoReply for Data<T> {
    fn into_reply(self) -> Result<Reply, ApiError> {
        Ok(Reply::Data(serde_json::to_value(self.0)?))
    }
}

impl IntoReply for ApiResponse {
    fn into_reply(self) -> Result<Reply, ApiError> { Ok(Reply::Response(self)) }
}

impl IntoReply for Message {
    fn into_reply(self) -> Result<Reply, ApiError> { Ok(Reply::Message(self)) }
}

impl IntoReply for Value {
    fn into_reply(self) -> Result<Reply, ApiError> { Ok(Reply::Data(self)) }
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply, ApiError> { Ok(Reply::Data(Value::Null)) }
}

macro_rules! into_reply_via_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoReply for $ty {
                fn into_reply(self) -> Result<Reply, ApiError> {
                    Ok(Reply::Data(Value::from(self)))
                }
            }
        )*
    };
}

into_reply_via_value!(String, &'static str, bool, i32, i64, u32, u64, f64);

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_error() -> ErrorInfo {
        ErrorInfo {
            id: "e-abc".into(),
            name: "Error".into(),
            status: 418,
            label: "Request Error".into(),
            simple: "Request Error".into(),
            message: "Request Error".into(),
            details: None,
            stack: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn data_envelope_shape() {
        let bytes = Message::Data(json!("ok")).to_bytes();
        assert_eq!(bytes, br#"{"data":"ok"}"#);
    }

    #[test]
    fn error_envelope_omits_absent_optionals() {
        let value: Value = serde_json::from_slice(&Message::Error(sample_error()).to_bytes()).unwrap();
        let error = &value["error"];
        assert_eq!(error["status"], 418);
        assert!(error.get("stack").is_none());
        assert!(error.get("details").is_none());
        assert!(value.get("data").is_none());
    }

    #[test]
    fn extra_fields_are_flattened() {
        let mut info = sample_error();
        info.extra.insert("field".into(), json!("email"));
        let value = serde_json::to_value(Message::Error(info)).unwrap();
        assert_eq!(value["error"]["field"], "email");
    }

    #[test]
    fn classification() {
        let passthrough = ApiResponse::new(Message::Data(json!(1))).status(202);
        let r = passthrough.into_reply().unwrap().into_api_response();
        assert_eq!(r.status_code(), 202);

        let r = Message::Error(sample_error()).into_reply().unwrap().into_api_response();
        assert_eq!(r.status_code(), 418);

        let r = "ok".into_reply().unwrap().into_api_response();
        assert_eq!(r.status_code(), 200);
        assert_eq!(r.message(), &Message::Data(json!("ok")));
    }

    #[test]
    fn data_wrapper_serialises() {
        #[derive(Serialize)]
        struct User { id: u64 }
        let reply = Data(User { id: 7 }).into_reply().unwrap();
        assert!(matches!(reply, Reply::Data(v) if v == json!({"id": 7})));
    }
}
