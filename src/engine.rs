//! Seam between the bridge and the HTTP/2 protocol engine.
//!
//! The bridge never parses HTTP/2 itself. It hands network bytes and
//! application replies to a [`ProtocolEngine`] created per connection by an
//! [`EngineFactory`], and shares that engine between the accept-side machine
//! and every reply machine correlated with it.

use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use crate::{
    correlation::{Correlation, CorrelationTable},
    frame::{Begin, CorrelationId, Data, End, Reset, StreamId, Window},
    route::Route,
    slab::ConnectionBuffers,
    stream::{Sequence, Target},
    window::OutboundWindow,
};

/// Shared handle to the engine of one connection.
pub type EngineHandle<E> = Rc<RefCell<E>>;

/// Per-connection HTTP/2 protocol engine.
///
/// Calls arrive one at a time through the [`EngineHandle`]; an engine must
/// not call back into the machine that is driving it.
pub trait ProtocolEngine: Sized {
    /// The network stream has begun.
    fn handle_begin(&mut self, begin: &Begin);

    /// Network bytes arrived. Partial frames are staged in `buffers`.
    fn handle_data(&mut self, data: &Data, buffers: &mut ConnectionBuffers);

    /// The network stream has ended.
    fn handle_end(&mut self, end: &End, buffers: &mut ConnectionBuffers);

    /// The application granted credit. [`Self::out_window`] has already been
    /// credited with `window.update`.
    fn handle_window(&mut self, window: &Window);

    /// The network granted credit on the reply stream
    /// ([`EngineBinding::network_reply_id`]).
    fn handle_network_window(&mut self, _window: &Window) {}

    /// The application reset its stream, or the network reset the reply
    /// stream.
    fn handle_reset(&mut self, reset: &Reset);

    /// A correlated application reply has begun.
    fn handle_http_begin(&mut self, begin: &Begin, correlation: &Correlation<Self>);

    /// Reply bytes arrived. Call `credit` with the number of bytes the engine
    /// has finished with to return credit to the application.
    fn handle_http_data(
        &mut self,
        data: &Data,
        correlation: &Correlation<Self>,
        credit: &mut dyn FnMut(i32),
    );

    /// A correlated application reply has ended.
    fn handle_http_end(&mut self, end: &End, correlation: &Correlation<Self>);

    /// Credit available for writing to the application.
    fn out_window(&mut self) -> &mut OutboundWindow;
}

/// Connection side of a [`ConnectionCloser`].
pub(crate) trait Closeable {
    fn request_close(&self);
}

/// Lets an engine end its connection.
///
/// Closing releases the connection's slots and pending correlation, ends the
/// application and network reply streams and drops the machine's hold on the
/// engine. A close requested while the connection is dispatching takes
/// effect once that dispatch returns. Closing twice is harmless.
#[derive(Clone)]
pub struct ConnectionCloser(Weak<dyn Closeable>);

impl ConnectionCloser {
    pub(crate) fn new(connection: Weak<dyn Closeable>) -> Self { Self(connection) }

    /// Request that the connection be torn down.
    pub fn close(&self) {
        if let Some(connection) = self.0.upgrade() {
            connection.request_close();
        }
    }
}

impl fmt::Debug for ConnectionCloser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCloser")
            .field("live", &(self.0.strong_count() > 0))
            .finish()
    }
}

/// Everything a new engine needs to reach its connection.
///
/// The bridge opens and ends both streams it writes: the application stream
/// and the network reply stream. The engine writes data to them.
pub struct EngineBinding<E> {
    /// Name stamped on begins the engine opens.
    pub source: String,
    /// Inbound network stream.
    pub network_id: StreamId,
    /// Throttle of the inbound network stream.
    pub network_throttle: Target,
    /// Target for writing back to the network.
    pub network_reply: Target,
    /// Network reply stream, already begun.
    pub network_reply_id: StreamId,
    /// Target of the application stream opened for this connection.
    pub application: Target,
    /// Id of that application stream, already begun.
    pub application_id: StreamId,
    /// Correlation id carried by the application begin.
    pub correlation_id: CorrelationId,
    /// Route the connection was accepted on.
    pub route: Route,
    /// Table shared with every reply machine.
    pub correlations: CorrelationTable<E>,
    /// Stream id supply for further application streams.
    pub stream_ids: Rc<Sequence>,
    /// Correlation id supply for further application streams.
    pub correlation_ids: Rc<Sequence>,
    /// Ends the connection.
    pub closer: ConnectionCloser,
}

/// Creates one engine per accepted connection.
pub trait EngineFactory {
    /// Engine type produced.
    type Engine: ProtocolEngine;

    /// Build the engine for a newly accepted connection.
    fn new_engine(&self, binding: EngineBinding<Self::Engine>) -> Self::Engine;
}
