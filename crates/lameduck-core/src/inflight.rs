//! Responses that have started but not finished.

use std::collections::HashMap;

use crate::handle::{ResponseHandle, ResponseId};

#[derive(Debug, Default)]
pub(crate) struct InFlightResponses {
    responses: HashMap<ResponseId, ResponseHandle>,
}

impl InFlightResponses {
    pub(crate) fn insert(&mut self, response: ResponseHandle) {
        self.responses.insert(response.id(), response);
    }

    pub(crate) fn remove(&mut self, id: ResponseId) -> bool {
        self.responses.remove(&id).is_some()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ResponseHandle> {
        self.responses.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.responses.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{SocketHandle, SocketId};

    #[test]
    fn test_insert_and_remove() {
        let mut set = InFlightResponses::default();
        let socket = SocketHandle::detached(SocketId(1));
        set.insert(ResponseHandle::new(ResponseId(1), socket.clone()));
        set.insert(ResponseHandle::new(ResponseId(2), socket));

        assert_eq!(set.len(), 2);
        assert!(set.remove(ResponseId(1)));
        assert!(!set.remove(ResponseId(1)));
        assert_eq!(set.iter().map(ResponseHandle::id).collect::<Vec<_>>(), vec![ResponseId(2)]);
    }
}
