//! End-to-end integration tests against the public `MacEngine` API, using
//! `MockLineTransport` in place of a real radio module.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use loramac_rs::loramac::phy_mock::MockLineTransport;
use loramac_rs::{
    loramac::{Ipv6Packet, LoraMacConfig, MacEngine, MacState, PhyDriver, RadioConfig, RoutingStack},
    Addr, Command, Frame, FrameHeader,
};

#[derive(Clone, Default)]
struct RecordingRouting {
    joined: Arc<Mutex<Vec<u8>>>,
    delivered: Arc<Mutex<Vec<Ipv6Packet>>>,
}

impl RoutingStack for RecordingRouting {
    fn on_joined(&mut self, prefix: u8) {
        self.joined.lock().unwrap().push(prefix);
    }

    fn deliver(&mut self, packet: Ipv6Packet) {
        self.delivered.lock().unwrap().push(packet);
    }
}

fn engine_with_mock() -> (MacEngine<MockLineTransport, RecordingRouting>, MockLineTransport, RecordingRouting) {
    let transport = MockLineTransport::new();
    let routing = RecordingRouting::default();
    let phy = PhyDriver::new(transport.clone());
    let config = LoraMacConfig {
        retransmit_timeout: Duration::from_secs(30),
        query_timeout: Duration::from_secs(30),
        ..LoraMacConfig::default()
    };
    let (engine, _handle) = MacEngine::init_root(11, phy, routing.clone(), config, RadioConfig::default());
    (engine, transport, routing)
}

fn join_response_for(engine: &MacEngine<MockLineTransport, RecordingRouting>, new_prefix: u8) -> Frame {
    Frame::new(
        FrameHeader {
            confirmed: false,
            seqno: 0,
            has_next: false,
            command: Command::JoinResponse,
            src: Addr::ROOT,
            dst: engine.node_addr(),
        },
        vec![new_prefix],
    )
    .unwrap()
}

#[tokio::test]
async fn join_response_moves_engine_to_ready_and_notifies_routing() {
    let (mut engine, _transport, routing) = engine_with_mock();
    assert_eq!(engine.state(), MacState::Alone);

    let response = join_response_for(&engine, 9);
    engine.input(response).await;

    assert_eq!(engine.state(), MacState::Ready);
    assert_eq!(engine.node_addr(), Addr::new(9, 11));
    assert_eq!(routing.joined.lock().unwrap().as_slice(), &[9]);
}

#[tokio::test]
async fn data_received_while_ready_is_accepted_and_delivered() {
    let (mut engine, _transport, routing) = engine_with_mock();
    engine.input(join_response_for(&engine, 9)).await;

    // Walk expected_seq up to 4 via ordinary, in-order downlink DATA,
    // landing back in Ready after each (no has_next) the way an idle
    // session would.
    for seqno in 1u8..=3 {
        let frame = Frame::new(
            FrameHeader {
                confirmed: false,
                seqno,
                has_next: false,
                command: Command::Data,
                src: Addr::ROOT,
                dst: engine.node_addr(),
            },
            vec![seqno],
        )
        .unwrap();
        engine.input(frame).await;
    }
    assert_eq!(engine.state(), MacState::Ready);

    // A DATA frame now arrives while the node is idle in Ready, not
    // WaitResponse: it must still be accepted and delivered upward.
    let data = Frame::new(
        FrameHeader {
            confirmed: false,
            seqno: 7,
            has_next: false,
            command: Command::Data,
            src: Addr::ROOT,
            dst: engine.node_addr(),
        },
        vec![0xAB],
    )
    .unwrap();
    engine.input(data).await;

    assert_eq!(engine.state(), MacState::Ready);
    assert_eq!(routing.delivered.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn confirmed_send_then_matching_ack_returns_engine_to_ready() {
    let (mut engine, transport, _routing) = engine_with_mock();
    engine.input(join_response_for(&engine, 9)).await;
    assert_eq!(engine.state(), MacState::Ready);

    transport.queue_line("radio_tx_ok");
    let outbound = Frame::new(
        FrameHeader {
            confirmed: true,
            seqno: 0,
            has_next: false,
            command: Command::Data,
            src: engine.node_addr(),
            dst: Addr::ROOT,
        },
        vec![0xDE, 0xAD],
    )
    .unwrap();
    engine.send(outbound).await.unwrap();
    assert_eq!(engine.state(), MacState::WaitResponse);
    assert!(transport.tx_lines().iter().any(|line| line.starts_with("radio tx")));

    let ack = Frame::new(
        FrameHeader {
            confirmed: false,
            seqno: 0,
            has_next: false,
            command: Command::Ack,
            src: Addr::ROOT,
            dst: engine.node_addr(),
        },
        vec![],
    )
    .unwrap();
    engine.input(ack).await;

    assert_eq!(engine.state(), MacState::Ready);
}

#[tokio::test]
async fn send_is_rejected_before_the_node_has_joined() {
    let (mut engine, _transport, _routing) = engine_with_mock();
    let frame = Frame::new(
        FrameHeader {
            confirmed: false,
            seqno: 0,
            has_next: false,
            command: Command::Data,
            src: engine.node_addr(),
            dst: Addr::ROOT,
        },
        vec![1],
    )
    .unwrap();

    let result = engine.send(frame).await;

    assert!(result.is_err());
    assert_eq!(engine.state(), MacState::Alone);
}

#[tokio::test]
async fn inbound_data_with_has_next_triggers_an_automatic_query() {
    let (mut engine, transport, routing) = engine_with_mock();
    engine.input(join_response_for(&engine, 9)).await;

    // Put the engine in WaitResponse the way a real session would: it has
    // just sent something and is awaiting the root's reply.
    transport.queue_line("radio_tx_ok");
    let probe = Frame::new(
        FrameHeader {
            confirmed: true,
            seqno: 0,
            has_next: false,
            command: Command::Data,
            src: engine.node_addr(),
            dst: Addr::ROOT,
        },
        vec![1],
    )
    .unwrap();
    engine.send(probe).await.unwrap();

    transport.queue_line("radio_tx_ok");
    let mut payload = vec![0xAA; 8];
    payload.push(0x42);
    let data = Frame::new(
        FrameHeader {
            confirmed: false,
            seqno: 1,
            has_next: true,
            command: Command::Data,
            src: Addr::ROOT,
            dst: engine.node_addr(),
        },
        payload,
    )
    .unwrap();
    engine.input(data).await;

    assert_eq!(routing.delivered.lock().unwrap().len(), 1);
    // has_next pulled a follow-up QUERY, which leaves the engine waiting
    // on the root again rather than idling in Ready.
    assert_eq!(engine.state(), MacState::WaitResponse);
    assert!(transport
        .tx_lines()
        .iter()
        .filter(|line| line.starts_with("radio tx"))
        .count()
        >= 2);
}

#[tokio::test]
async fn frames_for_a_foreign_dag_prefix_are_dropped() {
    let (mut engine, _transport, routing) = engine_with_mock();
    engine.input(join_response_for(&engine, 9)).await;

    let foreign = Frame::new(
        FrameHeader {
            confirmed: false,
            seqno: 0,
            has_next: false,
            command: Command::Data,
            src: Addr::ROOT,
            dst: Addr::new(200, 11),
        },
        vec![1],
    )
    .unwrap();
    engine.input(foreign).await;

    assert!(routing.delivered.lock().unwrap().is_empty());
}
