//! Staged slots never outlive the connections that staged them.

use h2bridge::{
    BridgeConfig,
    Router,
    frame::{Message, Reset},
};
use h2bridge_testing::EngineOptions;
use proptest::prelude::*;

mod common;
use common::{Bridge, ROUTED_REF, data, end};

#[derive(Clone, Debug)]
enum Op {
    Data(usize, usize),
    Oversize(usize),
    ApplicationReset(usize),
    End(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..3, 1usize..32).prop_map(|(c, len)| Op::Data(c, len)),
        1 => (0usize..3).prop_map(Op::Oversize),
        1 => (0usize..3).prop_map(Op::ApplicationReset),
        1 => (0usize..3).prop_map(Op::End),
    ]
}

fn staging_bridge() -> Bridge {
    let config = BridgeConfig::builder()
        .network_window(64)
        .slot_count(8)
        .slot_capacity_basis(64)
        .build()
        .expect("valid configuration");
    Bridge::new(
        config,
        EngineOptions {
            stage_data: true,
            ..EngineOptions::default()
        },
    )
    .expect("bridge")
}

proptest! {
    #[test]
    fn no_slot_outlives_its_connection(ops in prop::collection::vec(op(), 0..48)) {
        let bridge = staging_bridge();
        let connections: Vec<_> = (0..3u64)
            .map(|i| bridge.connect(2 * i + 1, ROUTED_REF).expect("routed"))
            .collect();
        let application_ids: Vec<_> = bridge.application.begins().iter().map(|b| b.stream_id).collect();

        for op in ops {
            match op {
                Op::Data(c, len) => connections[c].handle_stream(data(2 * c as u64 + 1, len)),
                Op::Oversize(c) => connections[c].handle_stream(data(2 * c as u64 + 1, 65)),
                Op::ApplicationReset(c) => {
                    if let Some(throttle) = bridge.router.throttle(application_ids[c]) {
                        throttle.handle_throttle(Message::Reset(Reset::new(application_ids[c])));
                    }
                }
                Op::End(c) => connections[c].handle_stream(end(2 * c as u64 + 1)),
            }
            prop_assert!(bridge.acquired_slots() <= 2 * connections.len());
        }

        for (c, connection) in connections.iter().enumerate() {
            connection.handle_stream(end(2 * c as u64 + 1));
        }
        prop_assert_eq!(bridge.acquired_slots(), 0);
        prop_assert!(bridge.network.resets() <= connections.len());
    }
}

#[test]
fn dropping_a_live_connection_returns_its_slots() {
    let bridge = staging_bridge();
    let connection = bridge.connect(1, ROUTED_REF).expect("routed");
    connection.handle_stream(data(1, 16));
    assert_eq!(bridge.acquired_slots(), 1);

    let application_id = bridge.application.begins()[0].stream_id;
    let network_reply_id = bridge.network_reply.begins()[0].stream_id;
    bridge.router.clear_throttle(common::APPLICATION, application_id);
    bridge.router.clear_throttle(common::NETWORK, network_reply_id);
    drop(connection);
    assert_eq!(bridge.acquired_slots(), 0);
}
