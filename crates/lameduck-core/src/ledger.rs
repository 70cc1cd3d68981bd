//! Per-connection pending request counts.
//!
//! Records are created when a connection is accepted and removed explicitly
//! when it closes, so the ledger never outlives the sockets it describes.

use std::collections::HashMap;

use crate::handle::SocketId;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ConnectionRecord {
    pending: usize,
}

#[derive(Debug, Default)]
pub(crate) struct ConnectionLedger {
    records: HashMap<SocketId, ConnectionRecord>,
}

impl ConnectionLedger {
    pub(crate) fn accept(&mut self, socket: SocketId) {
        self.records.insert(socket, ConnectionRecord::default());
    }

    /// Removes the record. Returns `false` if the socket was unknown.
    pub(crate) fn close(&mut self, socket: SocketId) -> bool {
        self.records.remove(&socket).is_some()
    }

    /// Increments the pending count and returns the new value.
    pub(crate) fn request_started(&mut self, socket: SocketId) -> usize {
        let record = self.records.entry(socket).or_insert_with(|| {
            tracing::warn!(%socket, "request started on an untracked socket");
            ConnectionRecord::default()
        });
        record.pending += 1;
        record.pending
    }

    /// Decrements the pending count and returns the new value.
    ///
    /// Returns `None` if the socket already closed.
    pub(crate) fn request_finished(&mut self, socket: SocketId) -> Option<usize> {
        let record = self.records.get_mut(&socket)?;
        debug_assert!(record.pending > 0, "pending request count underflow on {socket}");
        if record.pending == 0 {
            tracing::error!(%socket, "request finished with no pending request");
        }
        record.pending = record.pending.saturating_sub(1);
        Some(record.pending)
    }

    pub(crate) fn pending_count(&self, socket: SocketId) -> Option<usize> {
        self.records.get(&socket).map(|record| record.pending)
    }

    pub(crate) fn idle_sockets(&self) -> Vec<SocketId> {
        self.records
            .iter()
            .filter(|(_, record)| record.pending == 0)
            .map(|(socket, _)| *socket)
            .collect()
    }

    pub(crate) fn sockets(&self) -> Vec<SocketId> {
        self.records.keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_accept_starts_at_zero() {
        let mut ledger = ConnectionLedger::default();
        ledger.accept(SocketId(1));

        assert_eq!(ledger.pending_count(SocketId(1)), Some(0));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_request_counting() {
        let mut ledger = ConnectionLedger::default();
        ledger.accept(SocketId(1));

        assert_eq!(ledger.request_started(SocketId(1)), 1);
        assert_eq!(ledger.request_started(SocketId(1)), 2);
        assert_eq!(ledger.request_finished(SocketId(1)), Some(1));
        assert_eq!(ledger.request_finished(SocketId(1)), Some(0));
    }

    #[test]
    fn test_close_removes_record() {
        let mut ledger = ConnectionLedger::default();
        ledger.accept(SocketId(1));

        assert!(ledger.close(SocketId(1)));
        assert!(!ledger.close(SocketId(1)));
        assert_eq!(ledger.pending_count(SocketId(1)), None);
        assert_eq!(ledger.request_finished(SocketId(1)), None);
    }

    #[test]
    fn test_idle_sockets() {
        let mut ledger = ConnectionLedger::default();
        ledger.accept(SocketId(1));
        ledger.accept(SocketId(2));
        ledger.request_started(SocketId(2));

        assert_eq!(ledger.idle_sockets(), vec![SocketId(1)]);

        let mut all = ledger.sockets();
        all.sort();
        assert_eq!(all, vec![SocketId(1), SocketId(2)]);
    }

    proptest! {
        #[test]
        fn prop_pending_matches_unfinished(ops in proptest::collection::vec(any::<bool>(), 0..64)) {
            let mut ledger = ConnectionLedger::default();
            let socket = SocketId(1);
            ledger.accept(socket);

            let mut outstanding = 0usize;
            for start in ops {
                if start {
                    ledger.request_started(socket);
                    outstanding += 1;
                } else if outstanding > 0 {
                    ledger.request_finished(socket);
                    outstanding -= 1;
                }

                let pending = ledger.pending_count(socket).unwrap();
                prop_assert_eq!(pending, outstanding);
                prop_assert_eq!(pending == 0, ledger.idle_sockets().contains(&socket));
            }
        }
    }
}
