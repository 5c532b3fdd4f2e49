//! Single-threaded dispatch loop driving the bridge.
//!
//! Every message the bridge receives, stream traffic and throttle traffic
//! alike, arrives on one channel. The [`Reactor`] routes credit and resets to
//! registered throttle handlers and everything else to the machine owning
//! the stream, creating machines through the [`StreamFactory`] on begin.
//! Handlers write to queued targets, so dispatch never re-enters itself.

use std::{collections::HashMap, rc::Rc};

use log::{debug, warn};
use tokio::{select, sync::mpsc::UnboundedReceiver};
use tokio_util::sync::CancellationToken;

use crate::{
    engine::EngineFactory,
    frame::Message,
    server::StreamFactory,
    stream::{StreamHandler, StreamKey},
};

/// A message together with the component that wrote it.
///
/// Stream ids are only unique per writer, so the reactor tells streams apart
/// by both.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inbound {
    /// Component the message arrived from.
    pub source: String,
    /// The message itself.
    pub message: Message,
}

impl Inbound {
    /// Tag `message` with the component it arrived from.
    pub fn new(source: impl Into<String>, message: Message) -> Self {
        Self {
            source: source.into(),
            message,
        }
    }
}

/// Owner of every live stream machine.
pub struct Reactor<F: EngineFactory> {
    factory: StreamFactory<F>,
    streams: HashMap<StreamKey, Rc<dyn StreamHandler>>,
}

impl<F: EngineFactory + 'static> Reactor<F> {
    /// Create a reactor with no live streams.
    #[must_use]
    pub fn new(factory: StreamFactory<F>) -> Self {
        Self {
            factory,
            streams: HashMap::new(),
        }
    }

    /// Factory machines are built from.
    #[must_use]
    pub fn factory(&self) -> &StreamFactory<F> { &self.factory }

    /// Number of streams whose machines are still running.
    #[must_use]
    pub fn live_streams(&self) -> usize { self.streams.len() }

    /// Deliver one message written by `source`.
    ///
    /// Credit and resets are matched by stream id alone: they travel on
    /// streams the bridge opened, and the bridge never reuses an id.
    pub fn dispatch(&mut self, source: &str, message: Message) {
        let stream_id = message.stream_id();
        if message.is_throttle()
            && let Some(handler) = self.factory.router().throttle(stream_id)
        {
            handler.handle_throttle(message);
            self.prune();
            return;
        }

        let key = StreamKey::new(source, stream_id);
        let handler = match self.streams.get(&key) {
            Some(handler) => Rc::clone(handler),
            None => {
                let Message::Begin(begin) = &message else {
                    warn!("dropping {} for unknown stream {key}", message.kind());
                    return;
                };
                let throttle = self.factory.router().supply_target(&begin.source);
                let Some(handler) = self.factory.new_stream(&message, throttle) else {
                    return;
                };
                self.streams.insert(key.clone(), Rc::clone(&handler));
                handler
            }
        };

        handler.handle_stream(message);
        if handler.is_terminal() {
            debug!("stream {key} terminated");
            self.streams.remove(&key);
        }
        self.prune();
    }

    /// Forget connections that tore down outside their own stream.
    fn prune(&mut self) {
        for key in self.factory.terminations().drain() {
            if self.streams.remove(&key).is_some() {
                debug!("stream {key} terminated");
            }
        }
    }

    /// Dispatch messages from `receiver` until it closes or `shutdown` is
    /// cancelled.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn run(mut self, mut receiver: UnboundedReceiver<Inbound>, shutdown: CancellationToken) -> Self {
        loop {
            select! {
                biased;

                () = shutdown.cancelled() => {
                    tracing::info!(live_streams = self.streams.len(), "reactor cancelled");
                    break;
                }
                inbound = receiver.recv() => match inbound {
                    Some(Inbound { source, message }) => {
                        tracing::trace!(
                            %source,
                            kind = %message.kind(),
                            stream = %message.stream_id(),
                            "dispatch"
                        );
                        self.dispatch(&source, message);
                    }
                    None => {
                        tracing::debug!(live_streams = self.streams.len(), "reactor channel closed");
                        break;
                    }
                },
            }
        }
        self
    }
}
