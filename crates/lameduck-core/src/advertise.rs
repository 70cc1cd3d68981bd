//! Tracks which sockets were already told they will not be reused.

use std::collections::HashSet;

use crate::handle::{ResponseHandle, SocketId};

#[derive(Debug, Default)]
pub(crate) struct CloseAdvertisements {
    advertised: HashSet<SocketId>,
}

impl CloseAdvertisements {
    /// Stages `Connection: close` on `response` unless its socket already
    /// carries one or the head is gone. Returns `true` if it was staged.
    pub(crate) fn advertise(&mut self, response: &ResponseHandle) -> bool {
        let socket = response.socket().id();
        if self.advertised.contains(&socket) || !response.stage_connection_close() {
            return false;
        }
        self.advertised.insert(socket);
        true
    }

    pub(crate) fn is_advertised(&self, socket: SocketId) -> bool {
        self.advertised.contains(&socket)
    }

    pub(crate) fn forget(&mut self, socket: SocketId) {
        self.advertised.remove(&socket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;

    #[test]
    fn test_advertise_once_per_socket() {
        let mut tracker = CloseAdvertisements::default();
        let first = ResponseHandle::detached(SocketId(1));
        let second = ResponseHandle::detached(SocketId(1));

        assert!(tracker.advertise(&first));
        assert!(!tracker.advertise(&second));
        assert!(!tracker.advertise(&first));

        assert!(first.advertises_close());
        assert!(!second.advertises_close());
        assert!(tracker.is_advertised(SocketId(1)));
    }

    #[test]
    fn test_sent_head_is_not_advertised() {
        let mut tracker = CloseAdvertisements::default();
        let response = ResponseHandle::detached(SocketId(1));
        response.commit_headers(&mut HeaderMap::new());

        assert!(!tracker.advertise(&response));
        assert!(!tracker.is_advertised(SocketId(1)));
    }

    #[test]
    fn test_forget() {
        let mut tracker = CloseAdvertisements::default();
        tracker.advertise(&ResponseHandle::detached(SocketId(3)));
        tracker.forget(SocketId(3));

        assert!(!tracker.is_advertised(SocketId(3)));
    }
}
