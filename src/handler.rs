//! Handler trait.
//!
//! A handler is any async function or closure of the shape
//!
//! ```text
//! async fn name(req: Request) -> Result<T, E>
//! ```
//!
//! where `E` converts into [`ApiError`]. What `T` must be depends on the
//! middleware that wraps it: [`IntoReply`](crate::IntoReply) for
//! [`response`](crate::middleware::response),
//! [`IntoResponse`](crate::IntoResponse) for
//! [`custom_response`](crate::middleware::custom_response).
//!
//! The call path per request is one boxed future:
//!
//! ```text
//! async fn ok(req: Request) -> Result<&str, ApiError>   ← user writes this
//!        ↓ middleware::response(ok)
//! Respond { handler: ok }                               ← stored in the router
//!        ↓ handler.call(req) at request time
//! Box::pin(async { ok(req).await.map_err(Into::into) })
//! ```
//!
//! Handlers living on an object are bound once, up front, with [`bind`].

use std::future::Future;
use std::sync::Arc;

use crate::api_error::ApiError;
use crate::middleware::BoxFuture;
use crate::request::Request;

/// Implemented for every valid handler producing `T`.
///
/// You never implement this yourself. The trait is **sealed**: only the
/// blanket impl below can satisfy it.
pub trait Handler<T>: private::Sealed<T> + Send + Sync + 'static {
    #[doc(hidden)]
    fn call(&self, req: Request) -> BoxFuture<'static, Result<T, ApiError>>;
}

mod private {
    pub trait Sealed<T> {}
}

impl<F, Fut, T, E> private::Sealed<T> for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError>,
{
}

impl<F, Fut, T, E> Handler<T> for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError>,
{
    fn call(&self, req: Request) -> BoxFuture<'static, Result<T, ApiError>> {
        let fut = (self)(req);
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}

/// Binds a method to a shared object, producing a plain handler.
///
/// The object/method pair is resolved here, once, into a single closure;
/// nothing is looked up per request.
///
/// ```rust
/// use std::sync::Arc;
/// use handles::{handler, middleware, ApiError, Request};
///
/// struct Users { greeting: String }
///
/// impl Users {
///     async fn hello(self: Arc<Self>, _req: Request) -> Result<String, ApiError> {
///         Ok(self.greeting.clone())
///     }
/// }
///
/// let users = Arc::new(Users { greeting: "hi".into() });
/// let _mw = middleware::response(handler::bind(users, Users::hello));
/// ```
pub fn bind<O, M, Fut>(object: Arc<O>, method: M) -> impl Fn(Request) -> Fut + Send + Sync + 'static
where
    O: ?Sized + Send + Sync + 'static,
    M: Fn(Arc<O>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
{
    move |req| method(Arc::clone(&object), req)
}
