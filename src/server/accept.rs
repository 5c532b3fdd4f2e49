//! Accept-side machine: network bytes in, application credit in.

use std::{
    cell::{Cell, RefCell},
    mem,
    rc::{Rc, Weak},
};

use log::{debug, error, warn};

use crate::{
    correlation::{Correlation, CorrelationTable},
    engine::{Closeable, ConnectionCloser, EngineBinding, EngineFactory, EngineHandle, ProtocolEngine},
    frame::{Begin, CorrelationId, Data, End, Message, StreamId, Window},
    metrics::{self, Direction, ResetReason},
    route::{Route, Router},
    slab::ConnectionBuffers,
    stream::{Sequence, StreamHandler, StreamKey, Target, Terminations, ThrottleHandler, Writer},
    window::{InboundWindow, low_water_mark},
};

/// Network frames a single window update is expected to cover.
const NETWORK_FRAMES: i32 = 1;

/// Collaborators an [`AcceptStream`] is built from.
pub(super) struct AcceptParts<F: EngineFactory> {
    pub network_id: StreamId,
    pub network_throttle: Target,
    pub route: Route,
    pub network_window: i32,
    pub writer: Writer,
    pub router: Rc<dyn Router>,
    pub engines: Rc<F>,
    pub correlations: CorrelationTable<F::Engine>,
    pub stream_ids: Rc<Sequence>,
    pub correlation_ids: Rc<Sequence>,
    pub buffers: ConnectionBuffers,
    pub terminations: Terminations,
}

/// An outgoing stream the bridge opened for the connection.
struct Opened {
    component: String,
    target: Target,
    stream_id: StreamId,
}

struct Connection<E> {
    engine: EngineHandle<E>,
    inbound: InboundWindow,
    application: Opened,
    network_reply: Opened,
    correlation_id: CorrelationId,
}

enum State<E> {
    BeforeBegin,
    AfterBegin(Connection<E>),
    Terminal,
}

/// Machine for one routed network connection.
///
/// On begin it grants the network its initial window, opens the network
/// reply stream and a correlated application stream, and creates the
/// connection's [`ProtocolEngine`]. It is the throttle handler of both
/// streams it opened: application credit is fed into the engine's outbound
/// window, network reply credit is handed to the engine, and a reset on
/// either tears the connection down.
pub struct AcceptStream<F: EngineFactory> {
    this: Weak<Self>,
    network_id: StreamId,
    network_throttle: Target,
    route: Route,
    network_window: i32,
    writer: Writer,
    router: Rc<dyn Router>,
    engines: Rc<F>,
    correlations: CorrelationTable<F::Engine>,
    stream_ids: Rc<Sequence>,
    correlation_ids: Rc<Sequence>,
    buffers: RefCell<ConnectionBuffers>,
    terminations: Terminations,
    threshold: Cell<Option<i32>>,
    close_requested: Cell<bool>,
    state: RefCell<State<F::Engine>>,
}

impl<F: EngineFactory + 'static> AcceptStream<F> {
    pub(super) fn new(parts: AcceptParts<F>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            network_id: parts.network_id,
            network_throttle: parts.network_throttle,
            route: parts.route,
            network_window: parts.network_window,
            writer: parts.writer,
            router: parts.router,
            engines: parts.engines,
            correlations: parts.correlations,
            stream_ids: parts.stream_ids,
            correlation_ids: parts.correlation_ids,
            buffers: RefCell::new(parts.buffers),
            terminations: parts.terminations,
            threshold: Cell::new(None),
            close_requested: Cell::new(false),
            state: RefCell::new(State::BeforeBegin),
        })
    }

    /// Route this connection was accepted on.
    #[must_use]
    pub fn route(&self) -> &Route { &self.route }

    /// Low-water mark fixed by the first application credit, if any arrived.
    #[must_use]
    pub fn threshold(&self) -> Option<i32> { self.threshold.get() }

    /// Inbound window remaining for the network peer, once begun.
    #[must_use]
    pub fn inbound_available(&self) -> Option<i32> {
        match &*self.state.borrow() {
            State::AfterBegin(connection) => Some(connection.inbound.available()),
            _ => None,
        }
    }

    /// Slots currently staged for this connection.
    #[must_use]
    pub fn held_slots(&self) -> usize { self.buffers.borrow().held() }

    fn open(&self, component: &str, correlation_id: CorrelationId) -> Opened {
        let target = self.router.supply_target(component);
        let stream_id = self.stream_ids.next_stream_id();
        self.writer.do_begin(&target, stream_id, 0, correlation_id);
        if let Some(this) = self.this.upgrade() {
            self.router.set_throttle(component, stream_id, this);
        }
        Opened {
            component: component.to_owned(),
            target,
            stream_id,
        }
    }

    fn on_begin(&self, begin: &Begin) -> State<F::Engine> {
        let inbound = InboundWindow::new(self.network_window);
        self.writer.do_window(
            &self.network_throttle,
            self.network_id,
            self.network_window,
            NETWORK_FRAMES,
        );
        metrics::add_credit(Direction::Network, self.network_window);

        let correlation_id = self.correlation_ids.next_correlation_id();
        let application = self.open(&self.route.target, correlation_id);
        let network_reply = self.open(&begin.source, begin.correlation_id);

        let this: Weak<dyn Closeable> = self.this.clone();
        let binding = EngineBinding {
            source: self.writer.source().to_owned(),
            network_id: self.network_id,
            network_throttle: Rc::clone(&self.network_throttle),
            network_reply: Rc::clone(&network_reply.target),
            network_reply_id: network_reply.stream_id,
            application: Rc::clone(&application.target),
            application_id: application.stream_id,
            correlation_id,
            route: self.route.clone(),
            correlations: self.correlations.clone(),
            stream_ids: Rc::clone(&self.stream_ids),
            correlation_ids: Rc::clone(&self.correlation_ids),
            closer: ConnectionCloser::new(this),
        };
        let engine = Rc::new(RefCell::new(self.engines.new_engine(binding)));
        let connection = Connection {
            engine: Rc::clone(&engine),
            inbound,
            application,
            network_reply,
            correlation_id,
        };

        let correlation = Correlation::new(correlation_id, connection.application.stream_id, engine);
        if let Err(e) = self.correlations.insert(correlation) {
            error!(
                "network stream {}: cannot open application stream {}: {e}",
                self.network_id, connection.application.stream_id
            );
            self.reset_network(ResetReason::Invariant);
            self.close_streams(&connection, None);
            return State::Terminal;
        }

        connection.engine.borrow_mut().handle_begin(begin);
        metrics::inc_connections();
        debug!(
            "network stream {} bridged to {} stream {} as correlation {correlation_id}",
            self.network_id, self.route.target, connection.application.stream_id
        );
        State::AfterBegin(connection)
    }

    /// Returns `false` when the peer overran its window.
    fn on_data(&self, connection: &mut Connection<F::Engine>, data: &Data) -> bool {
        let len = data.window_len();
        if let Err(e) = connection.inbound.consume(len) {
            warn!("network stream {}: {e}", self.network_id);
            return false;
        }
        connection.inbound.replenish(len);
        if len > 0 {
            self.writer
                .do_window(&self.network_throttle, self.network_id, len, NETWORK_FRAMES);
            metrics::add_credit(Direction::Network, len);
        }
        connection
            .engine
            .borrow_mut()
            .handle_data(data, &mut self.buffers.borrow_mut());
        true
    }

    fn on_end(&self, connection: &Connection<F::Engine>, end: &End) {
        let mut buffers = self.buffers.borrow_mut();
        connection.engine.borrow_mut().handle_end(end, &mut buffers);
        buffers.release_all();
    }

    fn on_window(&self, connection: &Connection<F::Engine>, window: &Window) {
        let mut engine = connection.engine.borrow_mut();
        if window.stream_id == connection.network_reply.stream_id {
            engine.handle_network_window(window);
            return;
        }
        let threshold = match self.threshold.get() {
            Some(threshold) => threshold,
            None => {
                let threshold = low_water_mark(window.update);
                self.threshold.set(Some(threshold));
                threshold
            }
        };
        engine.out_window().credit(window.update, threshold);
        engine.handle_window(window);
    }

    fn reset_network(&self, reason: ResetReason) {
        self.writer.do_reset(&self.network_throttle, self.network_id);
        metrics::inc_resets(reason);
    }

    /// End the streams this connection opened, except one its reader reset,
    /// and drop their throttle registrations.
    fn close_streams(&self, connection: &Connection<F::Engine>, reset_by: Option<StreamId>) {
        for opened in [&connection.application, &connection.network_reply] {
            if reset_by != Some(opened.stream_id) {
                self.writer.do_end(&opened.target, opened.stream_id);
            }
            self.router.clear_throttle(&opened.component, opened.stream_id);
        }
    }

    fn teardown(&self, connection: Connection<F::Engine>, reset_by: Option<StreamId>) {
        self.buffers.borrow_mut().release_all();
        // The reply may never arrive; drop the pending entry with us.
        if self.correlations.remove(connection.correlation_id).is_some() {
            debug!(
                "network stream {}: discarded pending correlation {}",
                self.network_id, connection.correlation_id
            );
        }
        self.close_streams(&connection, reset_by);
        self.terminations
            .record(StreamKey::new(self.route.source.clone(), self.network_id));
        metrics::dec_connections();
    }

    /// Reset the network stream and stop.
    fn abort(&self, state: &mut State<F::Engine>, reason: ResetReason, reset_by: Option<StreamId>) {
        self.reset_network(reason);
        if let State::AfterBegin(connection) = mem::replace(state, State::Terminal) {
            self.teardown(connection, reset_by);
        }
    }

    /// Complete a close requested by the engine, unless a dispatch is still
    /// running; that dispatch completes it on return.
    fn finish_close(&self) {
        if !self.close_requested.get() {
            return;
        }
        let Ok(mut state) = self.state.try_borrow_mut() else {
            return;
        };
        if let State::AfterBegin(connection) = mem::replace(&mut *state, State::Terminal) {
            debug!("network stream {}: closed by engine", self.network_id);
            self.teardown(connection, None);
        }
    }

    fn dispatch_stream(&self, message: Message) {
        let mut state = self.state.borrow_mut();
        match &mut *state {
            State::Terminal => debug!(
                "network stream {}: ignoring {} after termination",
                self.network_id,
                message.kind()
            ),
            State::BeforeBegin => match message {
                Message::Begin(begin) => *state = self.on_begin(&begin),
                message => {
                    warn!(
                        "network stream {}: {} before begin",
                        self.network_id,
                        message.kind()
                    );
                    self.abort(&mut state, ResetReason::UnexpectedMessage, None);
                }
            },
            State::AfterBegin(connection) => match message {
                Message::Data(data) => {
                    if !self.on_data(connection, &data) {
                        self.abort(&mut state, ResetReason::FlowControl, None);
                    }
                }
                Message::End(end) => self.on_end(connection, &end),
                message => {
                    warn!(
                        "network stream {}: unexpected {}",
                        self.network_id,
                        message.kind()
                    );
                    self.abort(&mut state, ResetReason::UnexpectedMessage, None);
                }
            },
        }
    }

    fn dispatch_throttle(&self, message: Message) {
        let mut state = self.state.borrow_mut();
        let State::AfterBegin(connection) = &mut *state else {
            debug!(
                "network stream {}: ignoring {} for {} while not bridged",
                self.network_id,
                message.kind(),
                message.stream_id()
            );
            return;
        };
        match message {
            Message::Window(window) => self.on_window(connection, &window),
            Message::Reset(reset) => {
                connection.engine.borrow_mut().handle_reset(&reset);
                debug!(
                    "network stream {}: stream {} reset by its reader",
                    self.network_id, reset.stream_id
                );
                self.abort(&mut state, ResetReason::Cascade, Some(reset.stream_id));
            }
            message => debug!(
                "network stream {}: ignoring throttle {}",
                self.network_id,
                message.kind()
            ),
        }
    }
}

impl<F: EngineFactory + 'static> StreamHandler for AcceptStream<F> {
    fn handle_stream(&self, message: Message) {
        self.dispatch_stream(message);
        self.finish_close();
    }

    fn is_terminal(&self) -> bool { matches!(*self.state.borrow(), State::Terminal) }
}

impl<F: EngineFactory + 'static> ThrottleHandler for AcceptStream<F> {
    fn handle_throttle(&self, message: Message) {
        self.dispatch_throttle(message);
        self.finish_close();
    }
}

impl<F: EngineFactory + 'static> Closeable for AcceptStream<F> {
    fn request_close(&self) {
        self.close_requested.set(true);
        self.finish_close();
    }
}
