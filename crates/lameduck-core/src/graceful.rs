//! The shutdown orchestrator.
//!
//! [`Graceful`] owns the shutdown state of one server: the connection
//! ledger, the close advertisements and the in-flight responses. The server
//! primitive reports lifecycle events through it, and [`Graceful::shutdown`]
//! drives the close sequence:
//!
//! 1. Mark the server closing and stage `Connection: close` on every
//!    in-flight response whose head is not sent yet.
//! 2. Arm the idle sweep (if `idle_timeout < force_timeout`) and the force
//!    sweep.
//! 3. Ask the primitive to stop accepting, and resolve once it reports that
//!    every socket is gone.
//!
//! All state lives behind one mutex per server. The primitive is never
//! called while that mutex is held.
//!
//! # Example
//!
//! ```rust,ignore
//! use lameduck_core::{Graceful, ShutdownOptions};
//!
//! let graceful = Graceful::new(primitive, ShutdownOptions::default());
//! let shutdown = graceful.clone();
//!
//! tokio::spawn(async move {
//!     shutdown_signal().await;
//!     if let Err(e) = shutdown.shutdown().await {
//!         tracing::error!("shutdown failed: {e}");
//!     }
//! });
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::advertise::CloseAdvertisements;
use crate::error::{ShutdownError, ShutdownResult};
use crate::handle::{RequestHandle, ResponseHandle, ResponseId, SocketHandle, SocketId};
use crate::inflight::InFlightResponses;
use crate::ledger::ConnectionLedger;
use crate::metrics::{self, EndReason};
use crate::options::ShutdownOptions;
use crate::primitive::{EndMode, ServerPrimitive};

/// Shutdown phase of a server. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Serving normally.
    Running,
    /// Shutdown started; waiting for sockets to drain.
    Draining,
    /// The force sweep fired.
    Forcing,
    /// The primitive reported that every socket is gone.
    Closed,
}

impl Phase {
    /// Returns `true` once shutdown has started.
    #[must_use]
    pub fn is_closing(self) -> bool {
        self != Self::Running
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Forcing => "forcing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct State {
    phase: Phase,
    ledger: ConnectionLedger,
    advertised: CloseAdvertisements,
    in_flight: InFlightResponses,
}

impl State {
    fn tag_if_closing(&mut self, response: &ResponseHandle) -> bool {
        self.phase.is_closing() && self.advertised.advertise(response)
    }
}

pub(crate) struct Shared {
    state: Mutex<State>,
    primitive: Arc<dyn ServerPrimitive>,
    options: ShutdownOptions,
    next_response: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
enum Sweep {
    Idle,
    Force,
}

impl Shared {
    pub(crate) fn is_closing(&self) -> bool {
        self.state.lock().phase.is_closing()
    }

    pub(crate) fn tag_if_closing(&self, response: &ResponseHandle) -> bool {
        self.state.lock().tag_if_closing(response)
    }

    fn sweep(&self, sweep: Sweep) {
        let targets = {
            let mut state = self.state.lock();
            match sweep {
                Sweep::Idle if state.phase == Phase::Draining => state.ledger.idle_sockets(),
                Sweep::Idle => Vec::new(),
                Sweep::Force if state.phase == Phase::Closed => Vec::new(),
                Sweep::Force => {
                    state.phase = Phase::Forcing;
                    state.ledger.sockets()
                }
            }
        };

        let (mode, reason) = match sweep {
            Sweep::Idle => {
                tracing::info!(sockets = targets.len(), "Idle sweep ending quiescent sockets");
                (EndMode::Graceful, EndReason::Idle)
            }
            Sweep::Force => {
                tracing::warn!(
                    sockets = targets.len(),
                    "Force timeout reached, ending all remaining sockets"
                );
                (EndMode::Abort, EndReason::Forced)
            }
        };

        metrics::record_sockets_ended(reason, targets.len());
        for socket in targets {
            self.primitive.end_socket(socket, mode);
        }
    }

    fn socket_closed(&self, socket: SocketId) {
        let mut state = self.state.lock();
        state.ledger.close(socket);
        state.advertised.forget(socket);
    }

    fn response_finished(&self, response: &ResponseHandle) {
        let socket = response.socket().id();
        let (drained, in_flight) = {
            let mut state = self.state.lock();
            state.in_flight.remove(response.id());
            let remaining = state.ledger.request_finished(socket);
            let drained = state.phase.is_closing()
                && remaining == Some(0)
                && state.advertised.is_advertised(socket);
            (drained, state.in_flight.len())
        };

        metrics::set_in_flight(in_flight);
        if drained {
            tracing::debug!(%socket, "Last response on advertised socket finished, ending it");
            metrics::record_sockets_ended(EndReason::Drained, 1);
            self.primitive.end_socket(socket, EndMode::Graceful);
        }
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("state", &*self.state.lock())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Graceful shutdown controller for one server.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Graceful {
    shared: Arc<Shared>,
}

impl Graceful {
    /// Creates a controller driving `primitive`.
    #[must_use]
    pub fn new(primitive: Arc<dyn ServerPrimitive>, options: ShutdownOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    phase: Phase::Running,
                    ledger: ConnectionLedger::default(),
                    advertised: CloseAdvertisements::default(),
                    in_flight: InFlightResponses::default(),
                }),
                primitive,
                options,
                next_response: AtomicU64::new(1),
            }),
        }
    }

    /// Returns the shutdown options.
    #[must_use]
    pub fn options(&self) -> &ShutdownOptions {
        &self.shared.options
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.shared.state.lock().phase
    }

    /// Returns `true` once shutdown has started. Never reverts.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.shared.is_closing()
    }

    /// Returns the pending request count of a socket, if it is tracked.
    #[must_use]
    pub fn pending_count(&self, socket: SocketId) -> Option<usize> {
        self.shared.state.lock().ledger.pending_count(socket)
    }

    /// Returns the number of open sockets.
    #[must_use]
    pub fn tracked_sockets(&self) -> usize {
        self.shared.state.lock().ledger.len()
    }

    /// Returns the number of responses that have not finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }

    /// Returns a handle to `socket` bound to this controller.
    #[must_use]
    pub fn socket_handle(&self, socket: SocketId) -> SocketHandle {
        SocketHandle::new(socket, Arc::downgrade(&self.shared))
    }

    /// Registers a newly accepted connection.
    ///
    /// The connection is forgotten when the returned guard is dropped, which
    /// the primitive should do once the socket has closed.
    #[must_use = "dropping the guard marks the socket closed"]
    pub fn connection_accepted(&self, socket: SocketId) -> ConnectionGuard {
        self.shared.state.lock().ledger.accept(socket);
        tracing::trace!(%socket, "Connection accepted");
        ConnectionGuard {
            socket: self.socket_handle(socket),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Registers a request that started on `socket`.
    ///
    /// If shutdown is already in progress the response is advertised closed
    /// before it is registered as in flight. Dropping the returned guard
    /// marks the response finished.
    #[must_use = "dropping the guard marks the response finished"]
    pub fn request_started(&self, socket: SocketId) -> RequestGuard {
        let id = ResponseId(self.shared.next_response.fetch_add(1, Ordering::Relaxed));
        let socket = self.socket_handle(socket);
        let request = RequestHandle::new(id, socket.clone());
        let response = ResponseHandle::new(id, socket);

        let in_flight = {
            let mut state = self.shared.state.lock();
            state.ledger.request_started(response.socket().id());
            state.tag_if_closing(&response);
            state.in_flight.insert(response.clone());
            state.in_flight.len()
        };
        metrics::set_in_flight(in_flight);

        RequestGuard {
            request,
            response,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Starts shutdown and waits until the server has fully stopped.
    ///
    /// Shutdown is irreversible. The future resolves once the primitive
    /// reports that the listener is closed and every socket is gone; both
    /// sweep timers are cancelled at that point.
    ///
    /// # Errors
    ///
    /// - [`ShutdownError::AlreadyStarted`] if shutdown was already requested.
    /// - [`ShutdownError::Stop`] if the primitive fails while stopping.
    pub async fn shutdown(&self) -> ShutdownResult {
        let (in_flight, sockets, advertised) = {
            let mut state = self.shared.state.lock();
            if state.phase.is_closing() {
                return Err(ShutdownError::AlreadyStarted);
            }
            state.phase = Phase::Draining;

            let pending: Vec<ResponseHandle> = state.in_flight.iter().cloned().collect();
            let advertised = pending
                .iter()
                .filter(|response| state.tag_if_closing(response))
                .count();
            (state.in_flight.len(), state.ledger.len(), advertised)
        };

        let options = self.shared.options;
        tracing::info!(
            in_flight,
            sockets,
            advertised,
            idle_timeout_ms = options.idle_timeout().as_millis() as u64,
            force_timeout_ms = options.force_timeout().as_millis() as u64,
            "Graceful shutdown started"
        );

        let idle = options
            .idle_sweep_armed()
            .then(|| self.arm_sweep(Sweep::Idle, options.idle_timeout()));
        let force = self.arm_sweep(Sweep::Force, options.force_timeout());

        let result = self.shared.primitive.stop_accepting().await;

        if let Some(idle) = idle {
            idle.abort();
        }
        force.abort();

        match result {
            Ok(()) => {
                self.shared.state.lock().phase = Phase::Closed;
                metrics::record_shutdown(true);
                tracing::info!("Graceful shutdown complete");
                Ok(())
            }
            Err(e) => {
                metrics::record_shutdown(false);
                tracing::error!("Server failed to stop: {}", e);
                Err(ShutdownError::Stop(e))
            }
        }
    }

    fn arm_sweep(&self, sweep: Sweep, delay: Duration) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.sweep(sweep);
        })
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

impl fmt::Debug for Graceful {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graceful").field("shared", &self.shared).finish()
    }
}

/// Keeps a connection registered with its controller.
///
/// Dropping the guard removes the connection's ledger record and close
/// advertisement.
#[derive(Debug)]
pub struct ConnectionGuard {
    socket: SocketHandle,
    shared: Arc<Shared>,
}

impl ConnectionGuard {
    /// Returns the socket handle.
    #[must_use]
    pub fn socket(&self) -> &SocketHandle {
        &self.socket
    }

    /// Returns the socket identifier.
    #[must_use]
    pub fn id(&self) -> SocketId {
        self.socket.id()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.shared.socket_closed(self.socket.id());
        tracing::trace!(socket = %self.socket.id(), "Connection closed");
    }
}

/// Keeps a response registered as in flight.
///
/// Dropping the guard marks the response finished and, if the server is
/// closing, ends the socket once its last advertised response is done.
#[derive(Debug)]
pub struct RequestGuard {
    request: RequestHandle,
    response: ResponseHandle,
    shared: Arc<Shared>,
}

impl RequestGuard {
    /// Returns the request handle.
    #[must_use]
    pub fn request(&self) -> &RequestHandle {
        &self.request
    }

    /// Returns the response handle.
    #[must_use]
    pub fn response(&self) -> &ResponseHandle {
        &self.response
    }

    /// Returns the controller this request belongs to.
    #[must_use]
    pub fn graceful(&self) -> Graceful {
        Graceful::from_shared(Arc::clone(&self.shared))
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.shared.response_finished(&self.response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::primitive::StopFuture;
    use http::header::CONNECTION;
    use http::HeaderMap;
    use std::collections::HashMap;
    use tokio::sync::watch;
    use tokio::time::Instant;

    /// Records end requests and closes sockets it owns on demand.
    struct MockPrimitive {
        ended: Mutex<Vec<(SocketId, EndMode)>>,
        guards: Mutex<HashMap<SocketId, ConnectionGuard>>,
        open: watch::Sender<usize>,
        fail_stop: bool,
    }

    impl MockPrimitive {
        fn new() -> Arc<Self> {
            Self::with_failure(false)
        }

        fn with_failure(fail_stop: bool) -> Arc<Self> {
            Arc::new(Self {
                ended: Mutex::new(Vec::new()),
                guards: Mutex::new(HashMap::new()),
                open: watch::channel(0).0,
                fail_stop,
            })
        }

        fn adopt(&self, guard: ConnectionGuard) {
            let mut guards = self.guards.lock();
            guards.insert(guard.id(), guard);
            self.open.send_replace(guards.len());
        }

        fn ended(&self) -> Vec<(SocketId, EndMode)> {
            self.ended.lock().clone()
        }
    }

    impl ServerPrimitive for MockPrimitive {
        fn end_socket(&self, socket: SocketId, mode: EndMode) {
            self.ended.lock().push((socket, mode));
            let removed = {
                let mut guards = self.guards.lock();
                let removed = guards.remove(&socket);
                self.open.send_replace(guards.len());
                removed
            };
            drop(removed);
        }

        fn stop_accepting(&self) -> StopFuture {
            if self.fail_stop {
                return Box::pin(async { Err::<(), BoxError>("server is not running".into()) });
            }
            let mut open = self.open.subscribe();
            Box::pin(async move {
                if open.wait_for(|count| *count == 0).await.is_err() {
                    return Err::<(), BoxError>("socket watch closed".into());
                }
                Ok(())
            })
        }
    }

    fn setup(idle_ms: u64, force_ms: u64) -> (Arc<MockPrimitive>, Graceful) {
        let primitive = MockPrimitive::new();
        let options = ShutdownOptions::new(
            Duration::from_millis(idle_ms),
            Duration::from_millis(force_ms),
        );
        let graceful = Graceful::new(primitive.clone(), options);
        (primitive, graceful)
    }

    fn open_socket(primitive: &MockPrimitive, graceful: &Graceful, id: u64) -> SocketId {
        let socket = SocketId(id);
        primitive.adopt(graceful.connection_accepted(socket));
        socket
    }

    #[test]
    fn test_phase_is_closing() {
        assert!(!Phase::Running.is_closing());
        assert!(Phase::Draining.is_closing());
        assert!(Phase::Forcing.is_closing());
        assert!(Phase::Closed.is_closing());
        assert_eq!(Phase::Forcing.to_string(), "forcing");
    }

    #[test]
    fn test_pending_count_follows_requests() {
        let (primitive, graceful) = setup(1_000, 30_000);
        let socket = open_socket(&primitive, &graceful, 1);

        let first = graceful.request_started(socket);
        let second = graceful.request_started(socket);
        assert_eq!(graceful.pending_count(socket), Some(2));
        assert_eq!(graceful.in_flight(), 2);

        drop(first);
        assert_eq!(graceful.pending_count(socket), Some(1));
        drop(second);
        assert_eq!(graceful.pending_count(socket), Some(0));
        assert_eq!(graceful.in_flight(), 0);
    }

    #[test]
    fn test_connection_guard_drop_forgets_socket() {
        let (_primitive, graceful) = setup(1_000, 30_000);
        let guard = graceful.connection_accepted(SocketId(9));
        assert_eq!(graceful.tracked_sockets(), 1);

        drop(guard);
        assert_eq!(graceful.tracked_sockets(), 0);
        assert_eq!(graceful.pending_count(SocketId(9)), None);
    }

    #[test]
    fn test_requests_not_tagged_while_running() {
        let (primitive, graceful) = setup(1_000, 30_000);
        let socket = open_socket(&primitive, &graceful, 1);

        let request = graceful.request_started(socket);
        assert!(!request.response().advertises_close());
        drop(request);

        assert!(primitive.ended().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_without_sockets_is_immediate() {
        let (primitive, graceful) = setup(1_000, 30_000);
        let started = Instant::now();

        graceful.shutdown().await.unwrap();

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(graceful.phase(), Phase::Closed);
        assert!(primitive.ended().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_pending_until_last_response_finishes() {
        let (primitive, graceful) = setup(1_000, 30_000);
        let socket = open_socket(&primitive, &graceful, 1);
        let request = graceful.request_started(socket);

        let mut shutdown = tokio_test::task::spawn(graceful.shutdown());
        tokio_test::assert_pending!(shutdown.poll());
        assert_eq!(graceful.phase(), Phase::Draining);
        assert!(request.response().advertises_close());

        drop(request);
        assert!(shutdown.is_woken());
        tokio_test::assert_ready_ok!(shutdown.poll());
        assert_eq!(primitive.ended(), vec![(socket, EndMode::Graceful)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_socket_ended_at_idle_timeout() {
        let (primitive, graceful) = setup(1_000, 30_000);
        let socket = open_socket(&primitive, &graceful, 1);
        let started = Instant::now();

        graceful.shutdown().await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(1_000));
        assert_eq!(primitive.ended(), vec![(socket, EndMode::Graceful)]);
        assert_eq!(graceful.tracked_sockets(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_request_bounds_shutdown() {
        let (primitive, graceful) = setup(1_000, 30_000);
        let socket = open_socket(&primitive, &graceful, 1);
        let request = graceful.request_started(socket);
        let response = request.response().clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3_000)).await;
            drop(request);
        });

        let started = Instant::now();
        let shutdown = graceful.clone();
        let task = tokio::spawn(async move { shutdown.shutdown().await });

        tokio::task::yield_now().await;
        assert!(graceful.is_closing());
        assert!(response.advertises_close());

        task.await.unwrap().unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(3_000));
        assert_eq!(primitive.ended(), vec![(socket, EndMode::Graceful)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_request_on_keep_alive_socket_is_advertised() {
        let (primitive, graceful) = setup(1_000, 30_000);
        let socket = open_socket(&primitive, &graceful, 1);

        let late = graceful.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let request = late.request_started(socket);
            assert!(request.response().advertises_close());

            let mut headers = HeaderMap::new();
            request.response().commit_headers(&mut headers);
            assert_eq!(headers.get(CONNECTION).unwrap(), "close");

            tokio::time::sleep(Duration::from_millis(100)).await;
            drop(request);
        });

        let started = Instant::now();
        graceful.shutdown().await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(600));
        assert_eq!(primitive.ended(), vec![(socket, EndMode::Graceful)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_sweep_aborts_in_flight() {
        let (primitive, graceful) = setup(15_000, 1_000);
        let socket = open_socket(&primitive, &graceful, 1);
        let request = graceful.request_started(socket);

        let started = Instant::now();
        graceful.shutdown().await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(1_000));
        assert_eq!(primitive.ended(), vec![(socket, EndMode::Abort)]);

        // The response finishing after the socket is gone ends nothing else.
        drop(request);
        assert_eq!(primitive.ended().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sweep_skips_busy_sockets() {
        let (primitive, graceful) = setup(1_000, 10_000);
        let idle = open_socket(&primitive, &graceful, 1);
        let busy = open_socket(&primitive, &graceful, 2);
        let request = graceful.request_started(busy);

        let started = Instant::now();
        graceful.shutdown().await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(10_000));
        assert_eq!(
            primitive.ended(),
            vec![(idle, EndMode::Graceful), (busy, EndMode::Abort)]
        );
        drop(request);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_not_armed_falls_back_to_force() {
        let (primitive, graceful) = setup(5_000, 5_000);
        let socket = open_socket(&primitive, &graceful, 1);

        let started = Instant::now();
        graceful.shutdown().await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_millis(5_000));
        assert_eq!(primitive.ended(), vec![(socket, EndMode::Abort)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_twice_fails() {
        let (_primitive, graceful) = setup(1_000, 30_000);
        graceful.shutdown().await.unwrap();

        let err = graceful.shutdown().await.unwrap_err();
        assert!(matches!(err, ShutdownError::AlreadyStarted));
        assert!(graceful.is_closing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_error_propagates_and_clears_timers() {
        let primitive = MockPrimitive::with_failure(true);
        let graceful = Graceful::new(
            primitive.clone(),
            ShutdownOptions::new(Duration::from_millis(1_000), Duration::from_millis(2_000)),
        );
        let socket = SocketId(1);
        primitive.adopt(graceful.connection_accepted(socket));

        let err = graceful.shutdown().await.unwrap_err();
        assert!(matches!(err, ShutdownError::Stop(_)));
        assert!(graceful.is_closing());

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert!(primitive.ended().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_with_sent_head_is_not_tagged() {
        let (primitive, graceful) = setup(1_000, 30_000);
        let socket = open_socket(&primitive, &graceful, 1);
        let request = graceful.request_started(socket);
        request.response().commit_headers(&mut HeaderMap::new());

        let shutdown = graceful.clone();
        let task = tokio::spawn(async move { shutdown.shutdown().await });
        tokio::task::yield_now().await;

        assert!(!request.response().advertises_close());

        // Not advertised, so finishing the response leaves the socket to the idle sweep.
        let finished_at = Instant::now();
        drop(request);
        task.await.unwrap().unwrap();
        assert_eq!(finished_at.elapsed(), Duration::from_millis(1_000));
        assert_eq!(primitive.ended(), vec![(socket, EndMode::Graceful)]);
    }
}
