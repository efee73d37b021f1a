//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::IpAddr;

use bytes::Bytes;
use http::Method;

use crate::context::RequestState;

/// An incoming HTTP request.
///
/// Cheap to clone: the body is a reference-counted [`Bytes`]. Handlers receive
/// their own clone, including the [`RequestState`] the tracker attached.
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) url: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) ip: Option<IpAddr>,
    pub(crate) state: RequestState,
}

impl Request {
    /// Starts building a request by hand. The server does this for you; tests
    /// and embedders use it to drive an [`App`](crate::App) without a socket.
    pub fn builder() -> RequestBuilder {
        RequestBuilder {
            method: Method::GET,
            url: "/".to_owned(),
            headers: Vec::new(),
            body: Bytes::new(),
            ip: None,
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn ip(&self) -> Option<IpAddr> { self.ip }

    /// Path plus query string, as the client sent it (`/users?page=2`).
    pub fn url(&self) -> &str { &self.url }

    pub fn query(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, q)| q)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Request-scoped tracking state (ids, timing).
    pub fn state(&self) -> &RequestState { &self.state }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }
}

// ── RequestBuilder ────────────────────────────────────────────────────────────

/// Fluent builder for [`Request`]. Defaults to `GET /` with no peer address.
pub struct RequestBuilder {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    body: Bytes,
    ip: Option<IpAddr>,
}

impl RequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Path with an optional query string.
    pub fn uri(mut self, url: &str) -> Self {
        self.url = url.to_owned();
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Request {
        let path = match self.url.split_once('?') {
            Some((path, _)) => path.to_owned(),
            None => self.url.clone(),
        };
        Request {
            method: self.method,
            path,
            url: self.url,
            headers: self.headers,
            body: self.body,
            params: HashMap::new(),
            ip: self.ip,
            state: RequestState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_path_and_query() {
        let req = Request::builder().uri("/users?page=2").build();
        assert_eq!(req.path(), "/users");
        assert_eq!(req.url(), "/users?page=2");
        assert_eq!(req.query(), Some("page=2"));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = Request::builder().header("X-Transaction-Id", "abc").build();
        assert_eq!(req.header("x-transaction-id"), Some("abc"));
        assert_eq!(req.header("x-request-id"), None);
    }
}
