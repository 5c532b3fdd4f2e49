//! Protocol engine double that records what the bridge asks of it.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use h2bridge::{
    correlation::Correlation,
    engine::{ConnectionCloser, EngineBinding, EngineFactory, ProtocolEngine},
    frame::{Begin, CorrelationId, Data, End, Reset, StreamId, Window},
    route::Route,
    slab::ConnectionBuffers,
    window::OutboundWindow,
};

/// One call observed by a [`RecordingEngine`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// `handle_begin` on the network stream.
    Begin(StreamId),
    /// `handle_data` with the payload length.
    Data(usize),
    /// `handle_end`.
    End(StreamId),
    /// `handle_window`, with the outbound window after crediting.
    Window {
        /// Update carried by the window.
        update: i32,
        /// Outbound credit available after the update.
        available: i32,
        /// Low-water mark the window was credited with.
        threshold: i32,
    },
    /// `handle_network_window` with the update the network granted.
    NetworkWindow(i32),
    /// `handle_reset` from either stream the bridge opened.
    Reset(StreamId),
    /// `handle_http_begin` for a correlated reply.
    HttpBegin {
        /// Correlation the reply carried.
        correlation: CorrelationId,
        /// Application stream the request went out on.
        request: StreamId,
    },
    /// `handle_http_data` with the payload length.
    HttpData(usize),
    /// `handle_http_end`.
    HttpEnd(CorrelationId),
}

/// Behaviour shared by every engine a factory creates.
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineOptions {
    /// Stage every network payload in the frame buffer instead of
    /// consuming it.
    pub stage_data: bool,
    /// Return credit for every reply payload as soon as it arrives.
    pub return_reply_credit: bool,
    /// Close the connection once the network stream ends.
    pub close_on_end: bool,
    /// Close the connection once a reply ends.
    pub close_on_reply_end: bool,
}

/// Identity of an engine as bound by the bridge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundEngine {
    /// Name stamped on bridge begins.
    pub source: String,
    /// Inbound network stream.
    pub network_id: StreamId,
    /// Network reply stream opened for the connection.
    pub network_reply_id: StreamId,
    /// Application stream opened for the connection.
    pub application_id: StreamId,
    /// Correlation carried by the application begin.
    pub correlation_id: CorrelationId,
    /// Route the connection was accepted on.
    pub route: Route,
}

/// Engine that logs every call into a log shared with its factory.
#[derive(Debug)]
pub struct RecordingEngine {
    events: Rc<RefCell<Vec<EngineEvent>>>,
    options: EngineOptions,
    out: OutboundWindow,
    closer: ConnectionCloser,
}

impl RecordingEngine {
    fn record(&self, event: EngineEvent) { self.events.borrow_mut().push(event); }
}

impl ProtocolEngine for RecordingEngine {
    fn handle_begin(&mut self, begin: &Begin) { self.record(EngineEvent::Begin(begin.stream_id)); }

    fn handle_data(&mut self, data: &Data, buffers: &mut ConnectionBuffers) {
        if self.options.stage_data
            && let Err(e) = buffers.frame.append(&data.payload)
        {
            log::warn!("recording engine failed to stage data: {e}");
        }
        self.record(EngineEvent::Data(data.len()));
    }

    fn handle_end(&mut self, end: &End, _buffers: &mut ConnectionBuffers) {
        self.record(EngineEvent::End(end.stream_id));
        if self.options.close_on_end {
            self.closer.close();
        }
    }

    fn handle_window(&mut self, window: &Window) {
        let event = EngineEvent::Window {
            update: window.update,
            available: self.out.available(),
            threshold: self.out.threshold(),
        };
        self.record(event);
    }

    fn handle_network_window(&mut self, window: &Window) {
        self.record(EngineEvent::NetworkWindow(window.update));
    }

    fn handle_reset(&mut self, reset: &Reset) { self.record(EngineEvent::Reset(reset.stream_id)); }

    fn handle_http_begin(&mut self, _begin: &Begin, correlation: &Correlation<Self>) {
        self.record(EngineEvent::HttpBegin {
            correlation: correlation.id(),
            request: correlation.request_id(),
        });
    }

    fn handle_http_data(
        &mut self,
        data: &Data,
        _correlation: &Correlation<Self>,
        credit: &mut dyn FnMut(i32),
    ) {
        self.record(EngineEvent::HttpData(data.len()));
        if self.options.return_reply_credit {
            credit(data.window_len());
        }
    }

    fn handle_http_end(&mut self, _end: &End, correlation: &Correlation<Self>) {
        self.record(EngineEvent::HttpEnd(correlation.id()));
        if self.options.close_on_reply_end {
            self.closer.close();
        }
    }

    fn out_window(&mut self) -> &mut OutboundWindow { &mut self.out }
}

/// Factory for [`RecordingEngine`]s sharing one event log.
#[derive(Debug, Default)]
pub struct RecordingEngineFactory {
    events: Rc<RefCell<Vec<EngineEvent>>>,
    bindings: RefCell<Vec<BoundEngine>>,
    created: Cell<usize>,
    options: EngineOptions,
}

impl RecordingEngineFactory {
    /// Factory with default options.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Factory whose engines behave according to `options`.
    #[must_use]
    pub fn with_options(options: EngineOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Number of engines created.
    #[must_use]
    pub fn engines_created(&self) -> usize { self.created.get() }

    /// Every call observed by any engine, in order.
    #[must_use]
    pub fn events(&self) -> Vec<EngineEvent> { self.events.borrow().clone() }

    /// Bindings handed to each engine, in creation order.
    #[must_use]
    pub fn bindings(&self) -> Vec<BoundEngine> { self.bindings.borrow().clone() }
}

impl EngineFactory for RecordingEngineFactory {
    type Engine = RecordingEngine;

    fn new_engine(&self, binding: EngineBinding<RecordingEngine>) -> RecordingEngine {
        self.created.set(self.created.get() + 1);
        self.bindings.borrow_mut().push(BoundEngine {
            source: binding.source,
            network_id: binding.network_id,
            network_reply_id: binding.network_reply_id,
            application_id: binding.application_id,
            correlation_id: binding.correlation_id,
            route: binding.route,
        });
        RecordingEngine {
            events: Rc::clone(&self.events),
            options: self.options,
            out: OutboundWindow::new(),
            closer: binding.closer,
        }
    }
}
