//! Connect-reply machine: application replies routed back to the connection
//! that issued the request.

use std::{cell::RefCell, rc::Rc};

use log::{debug, warn};

use crate::{
    correlation::{Correlation, CorrelationTable},
    engine::ProtocolEngine,
    frame::{Begin, Message, StreamId},
    metrics::{self, Direction, ResetReason},
    stream::{StreamHandler, Target, Writer},
};

/// Application frames a single window update is expected to cover.
const APPLICATION_FRAMES: i32 = 5;

enum State<E> {
    BeforeBegin,
    AfterBegin {
        correlation: Correlation<E>,
        window: i32,
    },
    Terminal,
}

/// Machine for one application reply stream.
///
/// The reply's begin must carry a correlation id issued by an
/// [`AcceptStream`](super::AcceptStream); the entry is consumed and every
/// later message is handed to the owning connection's engine. Credit for the
/// reply is granted up front; each time the engine reports bytes it has
/// finished with, the window is topped up and re-announced in full.
pub struct ConnectReplyStream<E> {
    stream_id: StreamId,
    throttle: Target,
    application_window: i32,
    writer: Writer,
    correlations: CorrelationTable<E>,
    state: RefCell<State<E>>,
}

impl<E: ProtocolEngine> ConnectReplyStream<E> {
    pub(super) fn new(
        stream_id: StreamId,
        throttle: Target,
        application_window: i32,
        writer: Writer,
        correlations: CorrelationTable<E>,
    ) -> Self {
        Self {
            stream_id,
            throttle,
            application_window,
            writer,
            correlations,
            state: RefCell::new(State::BeforeBegin),
        }
    }

    fn on_begin(&self, begin: &Begin) -> State<E> {
        if begin.source_ref != 0 {
            warn!(
                "reply stream {}: begin carries routing reference {}",
                self.stream_id, begin.source_ref
            );
            self.reset(ResetReason::UnexpectedMessage);
            return State::Terminal;
        }
        let Some(correlation) = self.correlations.remove(begin.correlation_id) else {
            warn!(
                "reply stream {}: no outstanding correlation {}",
                self.stream_id, begin.correlation_id
            );
            self.reset(ResetReason::MissingCorrelation);
            return State::Terminal;
        };

        let window = self.application_window;
        self.writer
            .do_window(&self.throttle, self.stream_id, window, APPLICATION_FRAMES);
        metrics::add_credit(Direction::Application, window);

        let engine = Rc::clone(correlation.engine());
        engine.borrow_mut().handle_http_begin(begin, &correlation);
        State::AfterBegin {
            correlation,
            window,
        }
    }

    fn unexpected(&self, message: &Message, phase: &str) -> State<E> {
        warn!(
            "reply stream {}: unexpected {} {phase}",
            self.stream_id,
            message.kind()
        );
        self.reset(ResetReason::UnexpectedMessage);
        State::Terminal
    }

    fn reset(&self, reason: ResetReason) {
        self.writer.do_reset(&self.throttle, self.stream_id);
        metrics::inc_resets(reason);
    }
}

impl<E: ProtocolEngine> StreamHandler for ConnectReplyStream<E> {
    fn handle_stream(&self, message: Message) {
        let mut state = self.state.borrow_mut();
        let next = match &mut *state {
            State::Terminal => {
                debug!(
                    "reply stream {}: ignoring {} after termination",
                    self.stream_id,
                    message.kind()
                );
                return;
            }
            State::BeforeBegin => match message {
                Message::Begin(begin) => self.on_begin(&begin),
                message => self.unexpected(&message, "before begin"),
            },
            State::AfterBegin {
                correlation,
                window,
            } => match message {
                Message::Data(data) => {
                    // No floor: reply credit is managed by the engine.
                    *window = window.saturating_sub(data.window_len());
                    let engine = Rc::clone(correlation.engine());
                    let (throttle, writer, stream_id) = (&self.throttle, &self.writer, self.stream_id);
                    // Each return is granted as the running window.
                    let mut credit = |update: i32| {
                        *window = window.saturating_add(update);
                        writer.do_window(throttle, stream_id, *window, APPLICATION_FRAMES);
                        metrics::add_credit(Direction::Application, update);
                    };
                    engine
                        .borrow_mut()
                        .handle_http_data(&data, correlation, &mut credit);
                    return;
                }
                Message::End(end) => {
                    let engine = Rc::clone(correlation.engine());
                    engine.borrow_mut().handle_http_end(&end, correlation);
                    State::Terminal
                }
                message => self.unexpected(&message, "after begin"),
            },
        };
        *state = next;
    }

    fn is_terminal(&self) -> bool { matches!(*self.state.borrow(), State::Terminal) }
}
