//! Classification of new streams into accept-side and reply machines.

use std::{cell::RefCell, rc::Rc};

use log::{debug, warn};

use super::{
    AcceptStream,
    ConnectReplyStream,
    accept::AcceptParts,
};
use crate::{
    config::BridgeConfig,
    correlation::CorrelationTable,
    engine::EngineFactory,
    error::Result,
    frame::{Begin, Message},
    metrics::{self, ResetReason},
    route::{Route, Router},
    slab::{ConnectionBuffers, SharedSlab, Slab},
    stream::{Sequence, StreamHandler, Target, Terminations, Writer},
};

/// Builds a machine for every new stream.
///
/// Begins with a non-zero routing reference are network connections and are
/// routed through the [`Router`]; a zero reference marks an application
/// reply, which is matched against the shared [`CorrelationTable`].
///
/// # Examples
///
/// ```ignore
/// let router = Rc::new(RouteTable::new());
/// router.add_route(Route::new("tcp", 7, "app", 1))?;
/// let factory = StreamFactory::new(BridgeConfig::default(), router, Rc::new(engines))?;
/// if let Some(handler) = factory.new_stream(&begin, throttle) {
///     handler.handle_stream(begin);
/// }
/// ```
pub struct StreamFactory<F: EngineFactory> {
    config: BridgeConfig,
    router: Rc<dyn Router>,
    engines: Rc<F>,
    writer: Writer,
    frame_slab: SharedSlab,
    headers_slab: SharedSlab,
    correlations: CorrelationTable<F::Engine>,
    stream_ids: Rc<Sequence>,
    correlation_ids: Rc<Sequence>,
    terminations: Terminations,
}

impl<F: EngineFactory + 'static> StreamFactory<F> {
    /// Create a factory from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`](crate::BridgeError::Config) for an
    /// invalid configuration and [`BridgeError::Slab`](crate::BridgeError::Slab)
    /// when the slabs cannot be sized from it.
    pub fn new<R: Router + 'static>(
        config: BridgeConfig,
        router: Rc<R>,
        engines: Rc<F>,
    ) -> Result<Self> {
        config.validate()?;
        let frame_slab = Slab::new(config.slab_capacity(), config.slot_capacity())?;
        let headers_slab = Slab::new(config.slab_capacity(), config.slot_capacity())?;
        Ok(Self {
            writer: Writer::new(config.name()),
            config,
            router,
            engines,
            frame_slab: Rc::new(RefCell::new(frame_slab)),
            headers_slab: Rc::new(RefCell::new(headers_slab)),
            correlations: CorrelationTable::new(),
            stream_ids: Rc::new(Sequence::default()),
            correlation_ids: Rc::new(Sequence::default()),
            terminations: Terminations::new(),
        })
    }

    /// Replace the stream id supply.
    #[must_use]
    pub fn with_stream_ids(mut self, stream_ids: Rc<Sequence>) -> Self {
        self.stream_ids = stream_ids;
        self
    }

    /// Replace the correlation id supply.
    #[must_use]
    pub fn with_correlation_ids(mut self, correlation_ids: Rc<Sequence>) -> Self {
        self.correlation_ids = correlation_ids;
        self
    }

    /// Configuration the factory was built with.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig { &self.config }

    /// Router the factory resolves and registers through.
    #[must_use]
    pub fn router(&self) -> &Rc<dyn Router> { &self.router }

    /// Correlations awaiting a reply.
    #[must_use]
    pub fn correlations(&self) -> &CorrelationTable<F::Engine> { &self.correlations }

    /// Network streams whose connections have torn down since the last drain.
    #[must_use]
    pub fn terminations(&self) -> &Terminations { &self.terminations }

    /// Slab staging partial frames.
    #[must_use]
    pub fn frame_slab(&self) -> &SharedSlab { &self.frame_slab }

    /// Slab staging partial header blocks.
    #[must_use]
    pub fn headers_slab(&self) -> &SharedSlab { &self.headers_slab }

    /// Build the machine for a stream whose first message is `message`.
    ///
    /// `throttle` receives credit and resets for the stream. The caller
    /// delivers `message` to the returned handler. Returns `None`, after
    /// resetting the stream once, when `message` is not a begin or no route
    /// matches it.
    pub fn new_stream(&self, message: &Message, throttle: Target) -> Option<Rc<dyn StreamHandler>> {
        let Message::Begin(begin) = message else {
            warn!(
                "stream {}: {} before begin",
                message.stream_id(),
                message.kind()
            );
            self.reject(&throttle, message);
            return None;
        };
        if begin.source_ref == 0 {
            return Some(self.new_reply_stream(begin, throttle));
        }
        let Some(route) = self.resolve(begin) else {
            warn!(
                "stream {}: no route for {} reference {}",
                begin.stream_id, begin.source, begin.source_ref
            );
            self.reject(&throttle, message);
            return None;
        };
        Some(self.new_accept_stream(begin, throttle, route))
    }

    fn resolve(&self, begin: &Begin) -> Option<Route> {
        self.router
            .resolve(&|route: &Route| route.source_ref == begin.source_ref && route.source == begin.source)
    }

    fn reject(&self, throttle: &Target, message: &Message) {
        let reason = if matches!(message, Message::Begin(_)) {
            ResetReason::NoRoute
        } else {
            ResetReason::UnexpectedMessage
        };
        self.writer.do_reset(throttle, message.stream_id());
        metrics::inc_resets(reason);
    }

    fn new_reply_stream(&self, begin: &Begin, throttle: Target) -> Rc<dyn StreamHandler> {
        debug!(
            "stream {}: reply for correlation {}",
            begin.stream_id, begin.correlation_id
        );
        Rc::new(ConnectReplyStream::new(
            begin.stream_id,
            throttle,
            self.config.application_window(),
            self.writer.clone(),
            self.correlations.clone(),
        ))
    }

    fn new_accept_stream(&self, begin: &Begin, throttle: Target, route: Route) -> Rc<dyn StreamHandler> {
        debug!(
            "stream {}: accepted on route {} -> {}",
            begin.stream_id, route.source, route.target
        );
        AcceptStream::new(AcceptParts {
            network_id: begin.stream_id,
            network_throttle: throttle,
            route,
            network_window: self.config.network_window(),
            writer: self.writer.clone(),
            router: Rc::clone(&self.router),
            engines: Rc::clone(&self.engines),
            correlations: self.correlations.clone(),
            stream_ids: Rc::clone(&self.stream_ids),
            correlation_ids: Rc::clone(&self.correlation_ids),
            buffers: ConnectionBuffers::new(
                Rc::clone(&self.frame_slab),
                Rc::clone(&self.headers_slab),
            ),
            terminations: self.terminations.clone(),
        })
    }
}
