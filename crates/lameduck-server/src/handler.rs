//! Request handlers.
//!
//! A [`Handler`] is a type-erased async function from a request to a
//! response. The server inserts the exchange's [`RequestHandle`],
//! [`ResponseHandle`] and [`SocketHandle`] into the request extensions so
//! handlers can query the closing state.
//!
//! # Example
//!
//! ```rust,ignore
//! use lameduck_server::{Handler, RequestExt, text};
//!
//! let handler = Handler::new(|req| async move {
//!     if let Some(response) = req.response_handle() {
//!         let _ = lameduck_core::check(response);
//!     }
//!     text(http::StatusCode::OK, "ok")
//! });
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::{header, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use lameduck_core::{RequestHandle, ResponseHandle, SocketHandle};

/// Body type produced by handlers.
pub type ResponseBody = Full<Bytes>;

/// Type alias for a boxed handler future.
pub type BoxedResponse = Pin<Box<dyn Future<Output = Response<ResponseBody>> + Send>>;

type ErasedHandler = Arc<dyn Fn(Request<Incoming>) -> BoxedResponse + Send + Sync>;

/// A type-erased request handler.
#[derive(Clone)]
pub struct Handler {
    inner: ErasedHandler,
}

impl Handler {
    /// Wraps an async function as a handler.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Request<Incoming>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response<ResponseBody>> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |req| Box::pin(handler(req))),
        }
    }

    /// Invokes the handler.
    pub fn call(&self, req: Request<Incoming>) -> BoxedResponse {
        (self.inner)(req)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").finish_non_exhaustive()
    }
}

/// Access to the lameduck handles stored in a request.
pub trait RequestExt {
    /// Returns the handle of this request.
    fn request_handle(&self) -> Option<&RequestHandle>;

    /// Returns the handle of the response being produced for this request.
    fn response_handle(&self) -> Option<&ResponseHandle>;

    /// Returns the handle of the connection this request arrived on.
    fn socket_handle(&self) -> Option<&SocketHandle>;
}

impl<B> RequestExt for Request<B> {
    fn request_handle(&self) -> Option<&RequestHandle> {
        self.extensions().get()
    }

    fn response_handle(&self) -> Option<&ResponseHandle> {
        self.extensions().get()
    }

    fn socket_handle(&self) -> Option<&SocketHandle> {
        self.extensions().get()
    }
}

/// Builds a plain-text response.
pub fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
