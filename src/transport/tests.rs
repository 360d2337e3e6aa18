use super::frame::{self, Frame, FrameKind, MAX_FRAME_SIZE};
use super::receiver::{Receiver, ReceiverState, ReceiverStats, StopReason};
use crate::registry::Registry;
use crate::utils::error::FrameError;
use proptest::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{oneshot, watch};

// header fields: non-empty, no delimiter
fn header_field() -> impl Strategy<Value = String> {
    "[^#\\s]{1,16}"
}

fn any_frame() -> impl Strategy<Value = Frame> {
    prop_oneof![
        (header_field(), header_field(), "[a-zA-Z0-9 #./äö-]{0,64}")
            .prop_map(|(id, topic, payload)| Frame::publish(&id, &topic, &payload)),
        (header_field(), header_field()).prop_map(|(id, topic)| Frame::subscribe(&id, &topic)),
        (header_field(), header_field()).prop_map(|(id, topic)| Frame::unsubscribe(&id, &topic)),
    ]
}

proptest! {
    #[test]
    fn test_roundtrip_every_kind(original in any_frame()) {
        let bytes = frame::encode(&original).unwrap();
        prop_assert_eq!(bytes.len(), original.encoded_len());
        prop_assert_eq!(frame::decode(&bytes).unwrap(), original);
    }

    #[test]
    fn test_decode_arbitrary_bytes_is_ok_or_malformed(
        bytes in proptest::collection::vec(any::<u8>(), 0..2048)
    ) {
        let result = frame::decode(&bytes);
        prop_assert!(
            matches!(result, Ok(_) | Err(FrameError::Malformed(_))),
            "unexpected result {:?}",
            result
        );
    }

    #[test]
    fn test_decode_delimiter_heavy_input_is_ok_or_malformed(
        bytes in proptest::collection::vec(prop_oneof![Just(b'#'), any::<u8>()], 0..64)
    ) {
        let result = frame::decode(&bytes);
        prop_assert!(matches!(result, Ok(_) | Err(FrameError::Malformed(_))));
    }
}

fn assert_malformed(input: &[u8]) {
    match frame::decode(input) {
        Err(FrameError::Malformed(_)) => {}
        other => panic!("expected malformed for {input:?}, got {other:?}"),
    }
}

#[test]
fn test_encode_publish_shape() {
    let bytes = frame::encode(&Frame::publish("alice", "temp", "21.5")).unwrap();
    assert_eq!(bytes, b"#msg#alice#temp#21.5#");
}

#[test]
fn test_encode_subscription_shapes() {
    let sub = frame::encode(&Frame::subscribe("alice", "temp")).unwrap();
    let unsub = frame::encode(&Frame::unsubscribe("alice", "temp")).unwrap();
    assert_eq!(sub, b"#sub#alice#temp#");
    assert_eq!(unsub, b"#unsub#alice#temp#");
}

#[test]
fn test_payload_with_delimiter_is_taken_verbatim() {
    let original = Frame::publish("alice", "temp", "a#b##c");
    let bytes = frame::encode(&original).unwrap();
    assert_eq!(bytes, b"#msg#alice#temp#a#b##c#");
    assert_eq!(frame::decode(&bytes).unwrap(), original);
}

#[test]
fn test_decode_broker_delivery() {
    let frame = frame::decode(b"#msg#bob#temp#21.5#").unwrap();
    assert_eq!(frame.kind(), FrameKind::Msg);
    assert_eq!(frame.client_id(), "bob");
    assert_eq!(frame.topic(), "temp");
    assert_eq!(frame.payload(), Some("21.5"));
}

#[test]
fn test_decode_tolerates_case_and_whitespace() {
    let frame = frame::decode(b"  \t#MSG#bob#temp#21.5#\r\n").unwrap();
    assert_eq!(frame, Frame::publish("bob", "temp", "21.5"));
    assert_eq!(
        frame::decode(b"#UnSub#bob#temp#").unwrap(),
        Frame::unsubscribe("bob", "temp")
    );
}

#[test]
fn test_decode_rejects_malformed_input() {
    assert_malformed(b"");
    assert_malformed(b"#");
    assert_malformed(b"##");
    assert_malformed(b"hello");
    assert_malformed(b"msg#bob#temp#x#");
    assert_malformed(b"#msg#bob#temp#x");
    assert_malformed(b"#pub#bob#temp#x#");
    assert_malformed(b"#msg#bob#temp#");
    assert_malformed(b"#msg##temp#x#");
    assert_malformed(b"#msg#bob##x#");
    assert_malformed(b"#sub#bob#");
    assert_malformed(b"#sub#bob#temp#extra#");
    assert_malformed(&[b'#', 0xff, 0xfe, b'#']);
}

#[test]
fn test_decode_rejects_oversized_datagram() {
    let mut big = b"#msg#bob#temp#".to_vec();
    big.resize(MAX_FRAME_SIZE + 1, b'x');
    big.push(b'#');
    assert_malformed(&big);
}

#[test]
fn test_encode_enforces_frame_limit() {
    let overhead = Frame::publish("alice", "temp", "").encoded_len();
    let fits = "x".repeat(MAX_FRAME_SIZE - overhead);
    assert_eq!(
        frame::encode(&Frame::publish("alice", "temp", &fits))
            .unwrap()
            .len(),
        MAX_FRAME_SIZE
    );

    let too_big = "x".repeat(MAX_FRAME_SIZE - overhead + 1);
    assert_eq!(
        frame::encode(&Frame::publish("alice", "temp", &too_big)),
        Err(FrameError::PayloadTooLarge {
            size: MAX_FRAME_SIZE + 1,
            max: MAX_FRAME_SIZE,
        })
    );
}

#[test]
fn test_encode_rejects_bad_header_fields() {
    assert!(matches!(
        frame::encode(&Frame::subscribe("al#ice", "temp")),
        Err(FrameError::InvalidField {
            field: "client id",
            ..
        })
    ));
    assert!(matches!(
        frame::encode(&Frame::publish("alice", "te#mp", "x")),
        Err(FrameError::InvalidField { field: "topic", .. })
    ));
    assert!(matches!(
        frame::encode(&Frame::unsubscribe("alice", "")),
        Err(FrameError::InvalidField { field: "topic", .. })
    ));
}

#[test]
fn test_frame_kind_tags() {
    assert_eq!(FrameKind::from_tag("msg"), Some(FrameKind::Msg));
    assert_eq!(FrameKind::from_tag("SUB"), Some(FrameKind::Sub));
    assert_eq!(FrameKind::from_tag("unsub"), Some(FrameKind::Unsub));
    assert_eq!(FrameKind::from_tag("ack"), None);
}

fn receiver_with_recorder() -> (
    Receiver,
    Arc<ReceiverStats>,
    Arc<Mutex<Vec<(String, String)>>>,
) {
    let registry = Registry::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    registry.register("temp", move |topic: &str, payload: &str| {
        sink.lock()
            .unwrap()
            .push((topic.to_string(), payload.to_string()));
    });
    let stats = Arc::new(ReceiverStats::default());
    (Receiver::new(registry, stats.clone()), stats, seen)
}

#[test]
fn test_handle_datagram_dispatches_and_counts() {
    let (receiver, stats, seen) = receiver_with_recorder();

    receiver.handle_datagram(b"#msg#bob#temp#21.5#");
    receiver.handle_datagram(b"#msg#bob#humidity#40#");
    receiver.handle_datagram(b"#msg#bob");
    receiver.handle_datagram(b"#sub#bob#temp#");

    assert_eq!(
        *seen.lock().unwrap(),
        vec![("temp".to_string(), "21.5".to_string())]
    );
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.datagrams, 4);
    assert_eq!(snapshot.dispatched, 1);
    assert_eq!(snapshot.undelivered, 1);
    assert_eq!(snapshot.malformed, 1);
    assert_eq!(snapshot.ignored, 1);
}

#[test]
fn test_handle_datagram_hands_unmatched_message_to_fallback() {
    let registry = Registry::new();
    registry.register("temp", |_: &str, _: &str| {});
    let unmatched = Arc::new(Mutex::new(Vec::new()));
    let sink = unmatched.clone();
    registry.set_unmatched(move |from: &str, topic: &str, payload: &str| {
        sink.lock()
            .unwrap()
            .push((from.to_string(), topic.to_string(), payload.to_string()));
    });
    let stats = Arc::new(ReceiverStats::default());
    let receiver = Receiver::new(registry, stats.clone());

    receiver.handle_datagram(b"#msg#bob#humidity#40#");
    receiver.handle_datagram(b"#msg#bob#temp#21.5#");

    assert_eq!(
        *unmatched.lock().unwrap(),
        vec![("bob".to_string(), "humidity".to_string(), "40".to_string())]
    );
    assert_eq!(stats.snapshot().undelivered, 1);
    assert_eq!(stats.snapshot().dispatched, 1);
}

#[tokio::test]
async fn test_run_survives_malformed_datagram_and_stops_on_shutdown() {
    let (receiver, stats, seen) = receiver_with_recorder();
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target = socket.local_addr().unwrap();
    let state = Arc::new(watch::Sender::new(ReceiverState::Running));
    let (shutdown, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(receiver.run(socket, shutdown_rx, state.clone()));

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.send_to(b"garbage", target).await.unwrap();
    sender.send_to(b"#msg#bob#temp#21.5#", target).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while seen.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("message was not dispatched");

    assert_eq!(stats.snapshot().malformed, 1);
    assert!(state.borrow().is_running());

    shutdown.send(()).unwrap();
    task.await.unwrap();
    assert_eq!(
        *state.borrow(),
        ReceiverState::Stopped(StopReason::Closed)
    );
}

#[tokio::test]
async fn test_run_stops_when_shutdown_sender_dropped() {
    let (receiver, _stats, _seen) = receiver_with_recorder();
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let state = Arc::new(watch::Sender::new(ReceiverState::Running));
    let (shutdown, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(receiver.run(socket, shutdown_rx, state.clone()));

    drop(shutdown);
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("receiver did not stop")
        .unwrap();
    assert_eq!(state.borrow().stop_reason(), Some(&StopReason::Closed));
}

#[tokio::test]
async fn test_run_stops_with_transport_error_when_socket_fails() {
    let (receiver, _stats, _seen) = receiver_with_recorder();

    // a port nobody listens on: the ICMP refusal surfaces on the next read
    let closed = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let closed_addr = closed.local_addr().unwrap();
    drop(closed);

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.connect(closed_addr).await.unwrap();
    socket.send(b"x").await.unwrap();

    let state = Arc::new(watch::Sender::new(ReceiverState::Running));
    let (_shutdown, shutdown_rx) = oneshot::channel::<()>();
    tokio::time::timeout(
        Duration::from_secs(2),
        receiver.run(socket, shutdown_rx, state.clone()),
    )
    .await
    .expect("receiver did not stop on socket error");

    match state.borrow().stop_reason() {
        Some(StopReason::TransportError(msg)) => assert!(!msg.is_empty()),
        other => panic!("expected transport error, got {other:?}"),
    }
}
