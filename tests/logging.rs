//! Diagnostics emitted for protocol violations and ignored traffic.

use h2bridge::frame::CorrelationId;
use h2bridge_testing::{Captured, LoggerHandle, RecordingTarget, logger};
use log::Level;
use rstest::rstest;
use serial_test::serial;

mod common;
use common::{Bridge, ROUTED_REF, data, reply_begin};

fn bridge() -> Bridge {
    let config = h2bridge::BridgeConfig::builder()
        .network_window(8)
        .build()
        .expect("valid configuration");
    Bridge::new(config, h2bridge_testing::EngineOptions::default()).expect("bridge")
}

#[rstest]
#[serial(bridge_logs)]
fn missing_route_is_warned(mut logger: LoggerHandle) {
    logger.clear();
    let bridge = bridge();

    assert!(bridge.connect(5, 99).is_none());

    let warnings = logger.drain_at(Level::Warn);
    assert!(
        warnings
            .iter()
            .any(|m| m.contains("stream 5") && m.contains("no route")),
        "missing warning: {warnings:?}"
    );
}

#[rstest]
#[serial(bridge_logs)]
fn window_overrun_is_warned_and_later_traffic_ignored(mut logger: LoggerHandle) {
    logger.clear();
    let bridge = bridge();
    let handler = bridge.connect(1, ROUTED_REF).expect("routed");

    handler.handle_stream(data(1, 9));
    handler.handle_stream(data(1, 1));

    let mut warnings = Vec::new();
    let mut ignored = false;
    while let Some(Captured { level, message }) = logger.pop() {
        match level {
            Level::Warn => warnings.push(message),
            Level::Debug if message.contains("after termination") => ignored = true,
            _ => {}
        }
    }
    assert_eq!(warnings.len(), 1, "expected one warning: {warnings:?}");
    assert!(warnings[0].contains("exceed"), "unexpected warning: {}", warnings[0]);
    assert!(ignored, "later data should be logged as ignored");
}

#[rstest]
#[serial(bridge_logs)]
fn missing_correlation_is_warned(mut logger: LoggerHandle) {
    logger.clear();
    let bridge = bridge();

    bridge
        .open(reply_begin(50, CorrelationId::new(42)), &RecordingTarget::new())
        .expect("reply machine");

    let warnings = logger.drain_at(Level::Warn);
    assert!(
        warnings
            .iter()
            .any(|m| m.contains("no outstanding correlation 42")),
        "missing warning: {warnings:?}"
    );
}

#[rstest]
#[serial(bridge_logs)]
fn engine_close_is_logged(mut logger: LoggerHandle) {
    logger.clear();
    let bridge = Bridge::new(
        h2bridge::BridgeConfig::default(),
        h2bridge_testing::EngineOptions {
            close_on_end: true,
            ..h2bridge_testing::EngineOptions::default()
        },
    )
    .expect("bridge");
    let handler = bridge.connect(3, ROUTED_REF).expect("routed");

    handler.handle_stream(common::end(3));

    let debug = logger.drain_at(Level::Debug);
    assert!(
        debug
            .iter()
            .any(|m| m.contains("network stream 3: closed by engine")),
        "missing close record: {debug:?}"
    );
    assert!(logger.pop().is_none());
}
