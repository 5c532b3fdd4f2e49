#![doc(html_root_url = "https://docs.rs/h2bridge/latest")]
//! Connection-bridging layer of an HTTP/2 gateway.
//!
//! Each network stream carries one HTTP/2 connection. The bridge grants the
//! network credit, opens a correlated application stream per connection and
//! routes the application's replies back to the connection that issued the
//! request. HTTP/2 itself is handled by a [`ProtocolEngine`] supplied by the
//! caller; routing policy comes from a [`Router`].
//!
//! Everything runs on one thread. Machines share engines through
//! [`EngineHandle`]s and stage partial frames in slab-backed buffers.

pub mod config;
pub mod correlation;
pub mod engine;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod reactor;
pub mod route;
pub mod server;
pub mod slab;
pub mod stream;
pub mod window;

pub use config::{BridgeConfig, BridgeConfigBuilder};
pub use correlation::{Correlation, CorrelationTable};
pub use engine::{ConnectionCloser, EngineBinding, EngineFactory, EngineHandle, ProtocolEngine};
pub use error::{BridgeError, Result};
pub use frame::{Begin, CorrelationId, Data, End, Message, Reset, StreamId, Window};
pub use reactor::{Inbound, Reactor};
pub use route::{Route, RouteTable, Router};
pub use server::{AcceptStream, ConnectReplyStream, StreamFactory};
pub use stream::{
    ChannelTarget,
    MessageConsumer,
    Sequence,
    StreamHandler,
    StreamKey,
    Target,
    Terminations,
    ThrottleHandler,
};
