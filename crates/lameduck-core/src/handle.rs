//! Socket, request and response handles.
//!
//! Handles identify a connection or an exchange on it and carry a weak
//! back-reference to the [`Graceful`](crate::Graceful) controller that owns
//! them. They never keep the controller alive; once it is dropped, queries
//! on its handles report [`ShutdownError::UnsupportedHandle`](crate::ShutdownError).
//!
//! A [`ResponseHandle`] also stages headers that the controller wants added
//! to the response. The server calls [`ResponseHandle::commit_headers`] at
//! the moment the response head is written; from then on staging is a no-op.

use std::fmt;
use std::sync::{Arc, Weak};

use http::header::{HeaderMap, HeaderValue, CONNECTION};
use parking_lot::Mutex;

use crate::graceful::Shared;

/// Identifier of a connection, allocated by the server primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(pub u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket-{}", self.0)
    }
}

/// Identifier of a request/response exchange, allocated by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResponseId(pub(crate) u64);

impl ResponseId {
    /// Returns the raw identifier.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Handle to a connection.
#[derive(Clone)]
pub struct SocketHandle {
    id: SocketId,
    server: Weak<Shared>,
}

impl SocketHandle {
    pub(crate) fn new(id: SocketId, server: Weak<Shared>) -> Self {
        Self { id, server }
    }

    /// Creates a handle that is not owned by any server.
    ///
    /// Queries on a detached handle fail with `UnsupportedHandle`.
    #[must_use]
    pub fn detached(id: SocketId) -> Self {
        Self::new(id, Weak::new())
    }

    /// Returns the socket identifier.
    #[must_use]
    pub fn id(&self) -> SocketId {
        self.id
    }

    pub(crate) fn server(&self) -> Option<Arc<Shared>> {
        self.server.upgrade()
    }
}

impl fmt::Debug for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketHandle")
            .field("id", &self.id)
            .field("bound", &(self.server.strong_count() > 0))
            .finish()
    }
}

/// Handle to a request currently being served.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    id: ResponseId,
    socket: SocketHandle,
}

impl RequestHandle {
    pub(crate) fn new(id: ResponseId, socket: SocketHandle) -> Self {
        Self { id, socket }
    }

    /// Returns the exchange identifier, shared with the matching response.
    #[must_use]
    pub fn id(&self) -> ResponseId {
        self.id
    }

    /// Returns the connection this request arrived on.
    #[must_use]
    pub fn socket(&self) -> &SocketHandle {
        &self.socket
    }
}

#[derive(Debug, Default)]
struct ResponseHead {
    sent: bool,
    staged: HeaderMap,
}

/// Handle to a response that has not finished yet.
#[derive(Debug, Clone)]
pub struct ResponseHandle {
    id: ResponseId,
    socket: SocketHandle,
    head: Arc<Mutex<ResponseHead>>,
}

impl ResponseHandle {
    pub(crate) fn new(id: ResponseId, socket: SocketHandle) -> Self {
        Self {
            id,
            socket,
            head: Arc::new(Mutex::new(ResponseHead::default())),
        }
    }

    /// Creates a response handle that is not owned by any server.
    ///
    /// Useful for exercising handlers outside a running server; queries on
    /// it fail with `UnsupportedHandle`.
    #[must_use]
    pub fn detached(socket: SocketId) -> Self {
        Self::new(ResponseId(0), SocketHandle::detached(socket))
    }

    /// Returns the exchange identifier.
    #[must_use]
    pub fn id(&self) -> ResponseId {
        self.id
    }

    /// Returns the connection this response will be written to.
    #[must_use]
    pub fn socket(&self) -> &SocketHandle {
        &self.socket
    }

    /// Returns `true` once the response head has been committed.
    #[must_use]
    pub fn headers_sent(&self) -> bool {
        self.head.lock().sent
    }

    /// Returns `true` if `Connection: close` is staged or was committed.
    #[must_use]
    pub fn advertises_close(&self) -> bool {
        self.head.lock().staged.contains_key(CONNECTION)
    }

    /// Marks the head as sent and copies the staged headers into `headers`.
    ///
    /// Staged values replace existing values of the same name. Calling this
    /// more than once leaves `headers` untouched after the first call.
    pub fn commit_headers(&self, headers: &mut HeaderMap) {
        let mut head = self.head.lock();
        if head.sent {
            return;
        }
        head.sent = true;
        for (name, value) in &head.staged {
            headers.insert(name.clone(), value.clone());
        }
    }

    /// Stages `Connection: close`. Returns `false` if the head was already sent.
    pub(crate) fn stage_connection_close(&self) -> bool {
        let mut head = self.head.lock();
        if head.sent {
            return false;
        }
        head.staged.insert(CONNECTION, HeaderValue::from_static("close"));
        true
    }
}

/// Any handle that can be resolved to its owning server.
#[derive(Debug, Clone, Copy)]
pub enum Handle<'a> {
    /// A connection.
    Socket(&'a SocketHandle),
    /// A request.
    Request(&'a RequestHandle),
    /// A response.
    Response(&'a ResponseHandle),
}

impl<'a> Handle<'a> {
    /// Returns a short name of the handle kind, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Socket(_) => "Socket",
            Self::Request(_) => "Request",
            Self::Response(_) => "Response",
        }
    }

    /// Returns the connection the handle belongs to.
    #[must_use]
    pub fn socket(&self) -> &'a SocketHandle {
        match self {
            Self::Socket(socket) => socket,
            Self::Request(request) => request.socket(),
            Self::Response(response) => response.socket(),
        }
    }
}

impl<'a> From<&'a SocketHandle> for Handle<'a> {
    fn from(socket: &'a SocketHandle) -> Self {
        Self::Socket(socket)
    }
}

impl<'a> From<&'a RequestHandle> for Handle<'a> {
    fn from(request: &'a RequestHandle) -> Self {
        Self::Request(request)
    }
}

impl<'a> From<&'a ResponseHandle> for Handle<'a> {
    fn from(response: &'a ResponseHandle) -> Self {
        Self::Response(response)
    }
}
