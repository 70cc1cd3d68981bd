//! Registry of live connections; the [`ServerPrimitive`] side of the server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use lameduck_core::{BoxError, EndMode, ServerPrimitive, SocketId, StopFuture};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::ServerError;
use crate::shutdown::{ConnectionToken, ConnectionTracker, StopSignal};

/// Tracks the listener and every connection task of one server.
///
/// Each connection task owns the receiving end of a control channel; ending
/// a socket sends its [`EndMode`] down that channel.
#[derive(Debug)]
pub(crate) struct Connections {
    next_id: AtomicU64,
    controls: Mutex<HashMap<SocketId, mpsc::UnboundedSender<EndMode>>>,
    tracker: ConnectionTracker,
    stop: StopSignal,
    accepting: AtomicBool,
}

impl Connections {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            controls: Mutex::new(HashMap::new()),
            tracker: ConnectionTracker::new(),
            stop: StopSignal::new(),
            accepting: AtomicBool::new(false),
        })
    }

    /// Marks the listener open. The returned guard closes it when dropped.
    pub(crate) fn open_listener(self: &Arc<Self>) -> ListenerGuard {
        self.accepting.store(true, Ordering::SeqCst);
        ListenerGuard {
            connections: Arc::clone(self),
            _token: self.tracker.acquire(),
        }
    }

    pub(crate) fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Registers a new connection task.
    pub(crate) fn register(&self) -> Registration {
        let socket = SocketId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, control) = mpsc::unbounded_channel();
        self.controls.lock().insert(socket, sender);
        Registration {
            socket,
            control,
            token: self.tracker.acquire(),
        }
    }

    pub(crate) fn unregister(&self, socket: SocketId) {
        self.controls.lock().remove(&socket);
    }

    pub(crate) fn active(&self) -> usize {
        self.controls.lock().len()
    }
}

impl ServerPrimitive for Connections {
    fn end_socket(&self, socket: SocketId, mode: EndMode) {
        if let Some(control) = self.controls.lock().get(&socket) {
            // The task may already be exiting
            let _ = control.send(mode);
        }
    }

    fn stop_accepting(&self) -> StopFuture {
        if !self.accepting.load(Ordering::SeqCst) {
            return Box::pin(async { Err::<(), BoxError>(Box::new(ServerError::NotRunning)) });
        }

        self.stop.trigger();
        let tracker = self.tracker.clone();
        Box::pin(async move {
            tracker.wait_idle().await;
            Ok(())
        })
    }
}

/// Keeps the listener counted as open.
#[derive(Debug)]
pub(crate) struct ListenerGuard {
    connections: Arc<Connections>,
    _token: ConnectionToken,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.connections.accepting.store(false, Ordering::SeqCst);
    }
}

/// A registered connection task.
#[derive(Debug)]
pub(crate) struct Registration {
    pub(crate) socket: SocketId,
    pub(crate) control: mpsc::UnboundedReceiver<EndMode>,
    pub(crate) token: ConnectionToken,
}
