//! Outbound write queue.
//!
//! Frames are queued in enqueue order and leave the queue only while the
//! connection is open. The connection actor flushes on every enqueue and on
//! every transition into `Connected`, so there is no polling timer and at
//! most one flush runs at a time.

use std::collections::VecDeque;

use crate::{protocol::WsMessage, types::RequestId};

/// A frame waiting to be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outbound {
    pub message: WsMessage,
    /// Correlation id when the frame carries a tracked request.
    pub request_id: Option<RequestId>,
}

impl Outbound {
    /// A frame without correlation.
    pub fn message(message: WsMessage) -> Self {
        Self {
            message,
            request_id: None,
        }
    }

    /// A frame carrying the pending request `id`.
    pub fn request(message: WsMessage, id: RequestId) -> Self {
        Self {
            message,
            request_id: Some(id),
        }
    }
}

/// FIFO buffer of unsent frames.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<Outbound>,
}

impl Outbox {
    /// Create an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame.
    pub fn push(&mut self, outbound: Outbound) {
        self.queue.push_back(outbound);
    }

    /// Take the oldest frame.
    pub fn pop(&mut self) -> Option<Outbound> {
        self.queue.pop_front()
    }

    /// Put back a frame whose write failed, ahead of everything else.
    pub fn requeue(&mut self, outbound: Outbound) {
        self.queue.push_front(outbound);
    }

    /// Drop request frames whose pending entry no longer exists.
    ///
    /// Returns the number of dropped frames.
    pub fn discard_orphans(&mut self, mut is_pending: impl FnMut(&RequestId) -> bool) -> usize {
        let before = self.queue.len();
        self.queue
            .retain(|outbound| outbound.request_id.as_ref().is_none_or(&mut is_pending));
        before - self.queue.len()
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut outbox = Outbox::new();
        for text in ["a", "b", "c"] {
            outbox.push(Outbound::message(WsMessage::text(text)));
        }

        let drained: Vec<_> = std::iter::from_fn(|| outbox.pop())
            .map(|o| o.message)
            .collect();
        assert_eq!(
            drained,
            vec![
                WsMessage::text("a"),
                WsMessage::text("b"),
                WsMessage::text("c")
            ]
        );
    }

    #[test]
    fn test_requeue_goes_first() {
        let mut outbox = Outbox::new();
        outbox.push(Outbound::message(WsMessage::text("second")));
        outbox.requeue(Outbound::message(WsMessage::text("first")));

        assert_eq!(outbox.pop().unwrap().message, WsMessage::text("first"));
        assert_eq!(outbox.pop().unwrap().message, WsMessage::text("second"));
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_discard_orphans_keeps_plain_messages() {
        let mut outbox = Outbox::new();
        outbox.push(Outbound::message(WsMessage::text("plain")));
        outbox.push(Outbound::request(WsMessage::text("live"), RequestId::new(1)));
        outbox.push(Outbound::request(WsMessage::text("dead"), RequestId::new(2)));

        let dropped = outbox.discard_orphans(|id| id.get() == 1);
        assert_eq!(dropped, 1);
        assert_eq!(outbox.len(), 2);
    }
}
