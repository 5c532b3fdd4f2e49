//! Connect-reply behaviour: correlated replies reach the engine of the
//! connection that issued the request.

use h2bridge::{
    BridgeConfig,
    frame::{CorrelationId, Message, Reset, StreamId, Window},
};
use h2bridge_testing::{EngineEvent, EngineOptions, RecordingTarget};
use rstest::{fixture, rstest};

mod common;
use common::{Bridge, ROUTED_REF, TestResult, data, end, reply_begin};

const REPLY_ID: u64 = 50;

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
fn bridge() -> Bridge { Bridge::with_defaults().expect("default bridge") }

#[rstest]
fn unknown_correlation_resets_without_window(bridge: Bridge) {
    let reply = RecordingTarget::new();

    let handler = bridge
        .open(reply_begin(REPLY_ID, CorrelationId::new(42)), &reply)
        .expect("replies always get a machine");

    assert!(handler.is_terminal());
    assert_eq!(
        reply.messages(),
        vec![Message::Reset(Reset::new(StreamId::new(REPLY_ID)))]
    );
    assert!(bridge.engines.events().is_empty());
}

#[rstest]
fn correlated_reply_reaches_issuing_engine(bridge: Bridge) -> TestResult {
    bridge.connect(1, ROUTED_REF).ok_or("routed")?;
    let request = bridge.application_begin()?;
    let reply = RecordingTarget::new();

    let handler = bridge
        .open(reply_begin(REPLY_ID, request.correlation_id), &reply)
        .ok_or("reply machine")?;

    assert!(!handler.is_terminal());
    assert_eq!(
        reply.messages(),
        vec![Message::Window(Window::new(StreamId::new(REPLY_ID), 65_535, 5))]
    );
    assert_eq!(
        bridge.engines.events().last(),
        Some(&EngineEvent::HttpBegin {
            correlation: request.correlation_id,
            request: request.stream_id,
        })
    );
    assert!(!bridge.factory.correlations().contains(request.correlation_id));
    Ok(())
}

#[rstest]
fn correlation_is_consumed_once(bridge: Bridge) -> TestResult {
    bridge.connect(1, ROUTED_REF).ok_or("routed")?;
    let correlation = bridge.application_begin()?.correlation_id;
    let first = RecordingTarget::new();
    let second = RecordingTarget::new();

    bridge
        .open(reply_begin(REPLY_ID, correlation), &first)
        .ok_or("first reply")?;
    let handler = bridge
        .open(reply_begin(REPLY_ID + 1, correlation), &second)
        .ok_or("second reply")?;

    assert_eq!(first.resets(), 0);
    assert_eq!(second.resets(), 1);
    assert!(second.windows().is_empty());
    assert!(handler.is_terminal());
    Ok(())
}

#[rstest]
#[case::credit_returned(true, vec![65_535, 65_535, 65_535])]
#[case::credit_withheld(false, vec![65_535])]
fn reply_data_returns_engine_credit(#[case] return_credit: bool, #[case] expected: Vec<i32>) -> TestResult {
    let bridge = Bridge::new(
        BridgeConfig::default(),
        EngineOptions {
            return_reply_credit: return_credit,
            ..EngineOptions::default()
        },
    )?;
    bridge.connect(1, ROUTED_REF).ok_or("routed")?;
    let correlation = bridge.application_begin()?.correlation_id;
    let reply = RecordingTarget::new();
    let handler = bridge
        .open(reply_begin(REPLY_ID, correlation), &reply)
        .ok_or("reply machine")?;

    handler.handle_stream(data(REPLY_ID, 300));
    handler.handle_stream(data(REPLY_ID, 200));

    let updates: Vec<i32> = reply.windows().iter().map(|w| w.update).collect();
    assert_eq!(updates, expected);
    assert!(reply.windows().iter().all(|w| w.frames == 5));
    assert_eq!(reply.resets(), 0);
    Ok(())
}

#[rstest]
fn returned_credit_restores_underflowed_window() -> TestResult {
    let config = BridgeConfig::builder().application_window(8).build()?;
    let bridge = Bridge::new(
        config,
        EngineOptions {
            return_reply_credit: true,
            ..EngineOptions::default()
        },
    )?;
    bridge.connect(1, ROUTED_REF).ok_or("routed")?;
    let correlation = bridge.application_begin()?.correlation_id;
    let reply = RecordingTarget::new();
    let handler = bridge
        .open(reply_begin(REPLY_ID, correlation), &reply)
        .ok_or("reply machine")?;

    handler.handle_stream(data(REPLY_ID, 64));
    handler.handle_stream(data(REPLY_ID, 0));

    let updates: Vec<i32> = reply.windows().iter().map(|w| w.update).collect();
    assert_eq!(updates, vec![8, 8, 8]);
    assert_eq!(reply.resets(), 0);
    Ok(())
}

#[rstest]
fn reply_underflow_does_not_reset() -> TestResult {
    let config = BridgeConfig::builder().application_window(8).build()?;
    let bridge = Bridge::new(config, EngineOptions::default())?;
    bridge.connect(1, ROUTED_REF).ok_or("routed")?;
    let correlation = bridge.application_begin()?.correlation_id;
    let reply = RecordingTarget::new();
    let handler = bridge
        .open(reply_begin(REPLY_ID, correlation), &reply)
        .ok_or("reply machine")?;

    handler.handle_stream(data(REPLY_ID, 64));

    assert_eq!(reply.resets(), 0);
    assert!(!handler.is_terminal());
    assert_eq!(bridge.engines.events().last(), Some(&EngineEvent::HttpData(64)));
    Ok(())
}

#[rstest]
fn end_completes_the_reply(bridge: Bridge) -> TestResult {
    bridge.connect(1, ROUTED_REF).ok_or("routed")?;
    let correlation = bridge.application_begin()?.correlation_id;
    let reply = RecordingTarget::new();
    let handler = bridge
        .open(reply_begin(REPLY_ID, correlation), &reply)
        .ok_or("reply machine")?;

    handler.handle_stream(end(REPLY_ID));
    handler.handle_stream(data(REPLY_ID, 4));

    assert!(handler.is_terminal());
    assert_eq!(reply.resets(), 0);
    assert_eq!(
        bridge.engines.events().last(),
        Some(&EngineEvent::HttpEnd(correlation))
    );
    Ok(())
}

#[rstest]
fn engine_close_on_reply_end_tears_down_connection() -> TestResult {
    let bridge = Bridge::new(
        BridgeConfig::default(),
        EngineOptions {
            close_on_reply_end: true,
            ..EngineOptions::default()
        },
    )?;
    let connection = bridge.connect(1, ROUTED_REF).ok_or("routed")?;
    let begin = bridge.application_begin()?;
    let handler = bridge
        .open(reply_begin(REPLY_ID, begin.correlation_id), &RecordingTarget::new())
        .ok_or("reply machine")?;

    handler.handle_stream(end(REPLY_ID));

    assert!(handler.is_terminal());
    assert!(connection.is_terminal());
    assert_eq!(bridge.network.resets(), 0);
    assert_eq!(bridge.application.ends(), vec![begin.stream_id]);
    assert_eq!(bridge.router.throttle_count(), 0);
    assert_eq!(bridge.factory.terminations().len(), 1);
    Ok(())
}

#[rstest]
fn unexpected_reply_message_resets(bridge: Bridge) -> TestResult {
    bridge.connect(1, ROUTED_REF).ok_or("routed")?;
    let correlation = bridge.application_begin()?.correlation_id;
    let reply = RecordingTarget::new();
    let handler = bridge
        .open(reply_begin(REPLY_ID, correlation), &reply)
        .ok_or("reply machine")?;

    handler.handle_stream(reply_begin(REPLY_ID, correlation));
    handler.handle_stream(end(REPLY_ID));

    assert!(handler.is_terminal());
    assert_eq!(reply.resets(), 1);
    assert!(
        !bridge
            .engines
            .events()
            .iter()
            .any(|e| matches!(e, EngineEvent::HttpEnd(_)))
    );
    Ok(())
}
