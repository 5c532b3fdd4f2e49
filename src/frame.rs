//! Stream primitives exchanged between the bridge and its peers.
//!
//! Every stream carries [`Begin`], [`Data`] and [`End`] messages from sender
//! to receiver. Credit ([`Window`]) and cancellation ([`Reset`]) flow the
//! other way, on the sender's throttle. [`Message`] wraps all five so a
//! single channel can carry them.

use std::fmt;

use bytes::Bytes;

/// Identifier of a directional stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl From<u64> for StreamId {
    fn from(value: u64) -> Self { Self(value) }
}

impl StreamId {
    /// Create a new [`StreamId`] with the provided value.
    #[must_use]
    pub const fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub const fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Display::fmt(&self.0, f) }
}

/// Opaque token pairing an application request with its eventual reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(u64);

impl From<u64> for CorrelationId {
    fn from(value: u64) -> Self { Self(value) }
}

impl CorrelationId {
    /// Create a new [`CorrelationId`] with the provided value.
    #[must_use]
    pub const fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub const fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Opens a stream.
///
/// A non-zero `source_ref` marks a new inbound connection to be routed; zero
/// marks a reply to a request previously issued under `correlation_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Begin {
    /// Stream being opened.
    pub stream_id: StreamId,
    /// Name of the component that opened the stream.
    pub source: String,
    /// Routing reference, or zero for replies.
    pub source_ref: u64,
    /// Correlation token for request/reply pairing.
    pub correlation_id: CorrelationId,
    /// Protocol-specific extension bytes, opaque to the bridge.
    pub extension: Bytes,
}

impl Begin {
    /// Create a begin message without extension bytes.
    #[must_use]
    pub fn new(
        stream_id: StreamId,
        source: impl Into<String>,
        source_ref: u64,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            stream_id,
            source: source.into(),
            source_ref,
            correlation_id,
            extension: Bytes::new(),
        }
    }

    /// Attach extension bytes.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<Bytes>) -> Self {
        self.extension = extension.into();
        self
    }
}

/// Carries payload bytes on an open stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Data {
    /// Stream the payload belongs to.
    pub stream_id: StreamId,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Data {
    /// Create a data message.
    #[must_use]
    pub fn new(stream_id: StreamId, payload: impl Into<Bytes>) -> Self {
        Self {
            stream_id,
            payload: payload.into(),
        }
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize { self.payload.len() }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.payload.is_empty() }

    /// Payload length as a window quantity.
    ///
    /// Lengths beyond `i32::MAX` saturate, which no window can absorb.
    #[must_use]
    pub fn window_len(&self) -> i32 { i32::try_from(self.payload.len()).unwrap_or(i32::MAX) }
}

/// Closes a stream in an orderly fashion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct End {
    /// Stream being closed.
    pub stream_id: StreamId,
    /// Protocol-specific extension bytes, opaque to the bridge.
    pub extension: Bytes,
}

impl End {
    /// Create an end message without extension bytes.
    #[must_use]
    pub fn new(stream_id: StreamId) -> Self {
        Self {
            stream_id,
            extension: Bytes::new(),
        }
    }
}

/// Grants the sender of a stream additional credit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    /// Stream the credit applies to.
    pub stream_id: StreamId,
    /// Additional bytes the sender may transmit.
    pub update: i32,
    /// Hint for the number of frames the credit is expected to cover.
    pub frames: i32,
}

impl Window {
    /// Create a window update.
    #[must_use]
    pub const fn new(stream_id: StreamId, update: i32, frames: i32) -> Self {
        Self {
            stream_id,
            update,
            frames,
        }
    }
}

/// Aborts a stream. Carries no reason.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reset {
    /// Stream being aborted.
    pub stream_id: StreamId,
}

impl Reset {
    /// Create a reset.
    #[must_use]
    pub const fn new(stream_id: StreamId) -> Self { Self { stream_id } }
}

/// Discriminant of a [`Message`], used for logging and metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// [`Begin`].
    Begin,
    /// [`Data`].
    Data,
    /// [`End`].
    End,
    /// [`Window`].
    Window,
    /// [`Reset`].
    Reset,
}

impl MessageKind {
    /// Lower-case name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MessageKind::Begin => "begin",
            MessageKind::Data => "data",
            MessageKind::End => "end",
            MessageKind::Window => "window",
            MessageKind::Reset => "reset",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Any stream or throttle message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Stream open.
    Begin(Begin),
    /// Stream payload.
    Data(Data),
    /// Stream close.
    End(End),
    /// Throttle credit.
    Window(Window),
    /// Throttle abort.
    Reset(Reset),
}

impl Message {
    /// Stream the message is addressed to.
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        match self {
            Message::Begin(begin) => begin.stream_id,
            Message::Data(data) => data.stream_id,
            Message::End(end) => end.stream_id,
            Message::Window(window) => window.stream_id,
            Message::Reset(reset) => reset.stream_id,
        }
    }

    /// Kind of the message.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Begin(_) => MessageKind::Begin,
            Message::Data(_) => MessageKind::Data,
            Message::End(_) => MessageKind::End,
            Message::Window(_) => MessageKind::Window,
            Message::Reset(_) => MessageKind::Reset,
        }
    }

    /// Whether the message travels on a throttle rather than a stream.
    #[must_use]
    pub fn is_throttle(&self) -> bool { matches!(self, Message::Window(_) | Message::Reset(_)) }
}

impl From<Begin> for Message {
    fn from(value: Begin) -> Self { Message::Begin(value) }
}

impl From<Data> for Message {
    fn from(value: Data) -> Self { Message::Data(value) }
}

impl From<End> for Message {
    fn from(value: End) -> Self { Message::End(value) }
}

impl From<Window> for Message {
    fn from(value: Window) -> Self { Message::Window(value) }
}

impl From<Reset> for Message {
    fn from(value: Reset) -> Self { Message::Reset(value) }
}
