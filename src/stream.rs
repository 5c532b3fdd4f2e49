//! Plumbing shared by every stream the bridge handles.
//!
//! A [`MessageConsumer`] receives messages; the bridge writes to targets and
//! throttles through the [`Target`] alias. Machines built by the
//! [`StreamFactory`](crate::server::StreamFactory) implement
//! [`StreamHandler`] for their own stream and, on the accept side,
//! [`ThrottleHandler`] for the application stream they open.
//!
//! Dispatch is single-threaded and must not re-enter a handler that is
//! currently running: consumers queue what they receive (see
//! [`ChannelTarget`]) instead of handing it straight back to the bridge.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

use bytes::Bytes;
use log::debug;
use tokio::sync::mpsc;

use crate::frame::{Begin, CorrelationId, End, Message, Reset, StreamId, Window};

/// Receiver of stream and throttle messages.
pub trait MessageConsumer {
    /// Deliver one message.
    fn accept(&self, message: Message);
}

/// Shared handle to a message consumer.
pub type Target = Rc<dyn MessageConsumer>;

/// Machine handling the messages of one stream.
pub trait StreamHandler {
    /// Handle the next message of the stream.
    fn handle_stream(&self, message: Message);

    /// Whether the machine has stopped processing its stream.
    fn is_terminal(&self) -> bool;
}

/// Receiver of credit and resets for a stream the bridge writes to.
pub trait ThrottleHandler {
    /// Handle a [`Window`] or [`Reset`] addressed to the stream.
    fn handle_throttle(&self, message: Message);
}

/// Identity of a stream as seen by the bridge.
///
/// Ids are chosen by whichever component opens a stream, so the same id may
/// be live on the network and application sides at once.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StreamKey {
    /// Component that opened the stream.
    pub source: String,
    /// Id the component chose.
    pub stream_id: StreamId,
}

impl StreamKey {
    /// Create a key.
    #[must_use]
    pub fn new(source: impl Into<String>, stream_id: StreamId) -> Self {
        Self {
            source: source.into(),
            stream_id,
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.stream_id)
    }
}

/// Streams whose machines terminated outside their own stream dispatch.
///
/// Filled by machines torn down from a throttle or by their engine, and
/// drained by whoever owns the machines.
#[derive(Clone, Debug, Default)]
pub struct Terminations(Rc<RefCell<Vec<StreamKey>>>);

impl Terminations {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Record that the machine for `key` has terminated.
    pub fn record(&self, key: StreamKey) { self.0.borrow_mut().push(key); }

    /// Take every recorded key.
    pub fn drain(&self) -> Vec<StreamKey> { self.0.borrow_mut().drain(..).collect() }

    /// Number of keys waiting to be drained.
    #[must_use]
    pub fn len(&self) -> usize { self.0.borrow().len() }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.borrow().is_empty() }
}

/// Consumer that queues messages on an unbounded tokio channel.
#[derive(Clone, Debug)]
pub struct ChannelTarget(mpsc::UnboundedSender<Message>);

impl ChannelTarget {
    /// Wrap a sender.
    #[must_use]
    pub fn new(sender: mpsc::UnboundedSender<Message>) -> Self { Self(sender) }

    /// Create a target and the receiver draining it.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl MessageConsumer for ChannelTarget {
    fn accept(&self, message: Message) {
        if let Err(mpsc::error::SendError(message)) = self.0.send(message) {
            debug!(
                "dropping {} for {}: receiver closed",
                message.kind(),
                message.stream_id()
            );
        }
    }
}

/// Monotonic supplier of stream or correlation ids.
///
/// Shared between the factory and the engines it creates so ids never
/// collide within one bridge.
#[derive(Debug)]
pub struct Sequence {
    next: Cell<u64>,
}

impl Default for Sequence {
    fn default() -> Self { Self::starting_at(1) }
}

impl Sequence {
    /// Create a sequence whose first value is `first`.
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: Cell::new(first),
        }
    }

    /// Take the next raw value.
    pub fn next_value(&self) -> u64 {
        let value = self.next.get();
        self.next.set(value.wrapping_add(1));
        value
    }

    /// Take the next value as a stream id.
    pub fn next_stream_id(&self) -> StreamId { StreamId::new(self.next_value()) }

    /// Take the next value as a correlation id.
    pub fn next_correlation_id(&self) -> CorrelationId { CorrelationId::new(self.next_value()) }
}

/// Builds the messages the bridge emits, stamping its own source name.
#[derive(Clone, Debug)]
pub(crate) struct Writer {
    source: String,
}

impl Writer {
    pub(crate) fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub(crate) fn source(&self) -> &str { &self.source }

    pub(crate) fn do_begin(
        &self,
        target: &Target,
        stream_id: StreamId,
        source_ref: u64,
        correlation_id: CorrelationId,
    ) {
        let begin = Begin {
            stream_id,
            source: self.source.clone(),
            source_ref,
            correlation_id,
            extension: Bytes::new(),
        };
        target.accept(Message::Begin(begin));
    }

    pub(crate) fn do_end(&self, target: &Target, stream_id: StreamId) {
        target.accept(Message::End(End::new(stream_id)));
    }

    pub(crate) fn do_window(&self, throttle: &Target, stream_id: StreamId, update: i32, frames: i32) {
        throttle.accept(Message::Window(Window::new(stream_id, update, frames)));
    }

    pub(crate) fn do_reset(&self, throttle: &Target, stream_id: StreamId) {
        throttle.accept(Message::Reset(Reset::new(stream_id)));
    }
}
