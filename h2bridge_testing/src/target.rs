//! Consumer that records every message written to it.

use std::{cell::RefCell, rc::Rc};

use h2bridge::{
    frame::{Begin, Message, StreamId, Window},
    stream::{MessageConsumer, Target},
};

/// Message sink shared between a test and the bridge.
///
/// Clones share the same log.
#[derive(Clone, Debug, Default)]
pub struct RecordingTarget {
    messages: Rc<RefCell<Vec<Message>>>,
}

impl RecordingTarget {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Handle for passing to the bridge.
    #[must_use]
    pub fn target(&self) -> Target { Rc::new(self.clone()) }

    /// Every message recorded so far.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> { self.messages.borrow().clone() }

    /// Remove and return every recorded message.
    pub fn take(&self) -> Vec<Message> { self.messages.borrow_mut().drain(..).collect() }

    /// Recorded begins.
    #[must_use]
    pub fn begins(&self) -> Vec<Begin> {
        self.messages
            .borrow()
            .iter()
            .filter_map(|m| match m {
                Message::Begin(begin) => Some(begin.clone()),
                _ => None,
            })
            .collect()
    }

    /// Recorded window updates.
    #[must_use]
    pub fn windows(&self) -> Vec<Window> {
        self.messages
            .borrow()
            .iter()
            .filter_map(|m| match m {
                Message::Window(window) => Some(*window),
                _ => None,
            })
            .collect()
    }

    /// Streams the recorded ends closed, in order.
    #[must_use]
    pub fn ends(&self) -> Vec<StreamId> {
        self.messages
            .borrow()
            .iter()
            .filter_map(|m| match m {
                Message::End(end) => Some(end.stream_id),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded resets.
    #[must_use]
    pub fn resets(&self) -> usize {
        self.messages
            .borrow()
            .iter()
            .filter(|m| matches!(m, Message::Reset(_)))
            .count()
    }
}

impl MessageConsumer for RecordingTarget {
    fn accept(&self, message: Message) { self.messages.borrow_mut().push(message); }
}
