//! Shared harness for driving a [`StreamFactory`] against recording doubles.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::rc::Rc;

use bytes::Bytes;
use h2bridge::{
    BridgeConfig,
    Route,
    RouteTable,
    Router,
    StreamFactory,
    frame::{Begin, CorrelationId, Data, End, Message, StreamId, Window},
    stream::{Sequence, StreamHandler},
};
use h2bridge_testing::{EngineOptions, RecordingEngineFactory, RecordingTarget};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Component network connections arrive from.
pub const NETWORK: &str = "net";
/// Component application streams are opened on.
pub const APPLICATION: &str = "app";
/// Routing reference with a configured route.
pub const ROUTED_REF: u64 = 7;
/// First stream id the bridge allocates.
pub const FIRST_BRIDGE_ID: u64 = 1000;

/// A factory wired to recording targets and engines.
pub struct Bridge {
    pub router: Rc<RouteTable>,
    pub engines: Rc<RecordingEngineFactory>,
    pub factory: StreamFactory<RecordingEngineFactory>,
    /// Throttle of every network stream.
    pub network: RecordingTarget,
    /// Where the bridge writes network replies.
    pub network_reply: RecordingTarget,
    /// Application streams and their begins.
    pub application: RecordingTarget,
}

impl Bridge {
    pub fn new(config: BridgeConfig, options: EngineOptions) -> TestResult<Self> {
        let router = Rc::new(RouteTable::new());
        router.add_route(Route::new(NETWORK, ROUTED_REF, APPLICATION, 1))?;
        let network_reply = RecordingTarget::new();
        let application = RecordingTarget::new();
        router.register_target(NETWORK, network_reply.target());
        router.register_target(APPLICATION, application.target());

        let engines = Rc::new(RecordingEngineFactory::with_options(options));
        let factory = StreamFactory::new(config, Rc::clone(&router), Rc::clone(&engines))?
            .with_stream_ids(Rc::new(Sequence::starting_at(FIRST_BRIDGE_ID)));
        Ok(Self {
            router,
            engines,
            factory,
            network: RecordingTarget::new(),
            network_reply,
            application,
        })
    }

    pub fn with_defaults() -> TestResult<Self> { Self::new(BridgeConfig::default(), EngineOptions::default()) }

    /// Offer `message` as the first message of a stream, delivering it to
    /// the machine the factory builds.
    pub fn open(&self, message: Message, throttle: &RecordingTarget) -> Option<Rc<dyn StreamHandler>> {
        let handler = self.factory.new_stream(&message, throttle.target())?;
        handler.handle_stream(message);
        Some(handler)
    }

    /// Open a network connection with routing reference `source_ref`.
    pub fn connect(&self, stream_id: u64, source_ref: u64) -> Option<Rc<dyn StreamHandler>> {
        self.open(network_begin(stream_id, source_ref), &self.network)
    }

    /// Begin of the single application stream opened so far.
    pub fn application_begin(&self) -> TestResult<Begin> {
        let mut begins = self.application.begins();
        match (begins.pop(), begins.is_empty()) {
            (Some(begin), true) => Ok(begin),
            _ => Err("expected exactly one application begin".into()),
        }
    }

    /// Deliver application credit for `stream_id` through the router.
    pub fn credit(&self, stream_id: StreamId, update: i32) -> TestResult {
        let throttle = self
            .router
            .throttle(stream_id)
            .ok_or("no throttle registered")?;
        throttle.handle_throttle(Message::Window(Window::new(stream_id, update, 1)));
        Ok(())
    }

    pub fn acquired_slots(&self) -> usize {
        self.factory.frame_slab().borrow().acquired() + self.factory.headers_slab().borrow().acquired()
    }
}

pub fn network_begin(stream_id: u64, source_ref: u64) -> Message {
    Message::Begin(Begin::new(
        StreamId::new(stream_id),
        NETWORK,
        source_ref,
        CorrelationId::new(0),
    ))
}

pub fn reply_begin(stream_id: u64, correlation_id: CorrelationId) -> Message {
    Message::Begin(Begin::new(StreamId::new(stream_id), APPLICATION, 0, correlation_id))
}

pub fn data(stream_id: u64, len: usize) -> Message {
    Message::Data(Data::new(StreamId::new(stream_id), Bytes::from(vec![0x5a; len])))
}

pub fn end(stream_id: u64) -> Message { Message::End(End::new(StreamId::new(stream_id))) }
