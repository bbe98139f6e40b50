//! Loopback tests running both layers over real TCP connections.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use osistack_rs::segment::SegmenterConfig;
use osistack_rs::transport::{CloseReason, TransportConfig};
use osistack_rs::{ConversationId, FrameSink, FramedTransport, ReliableSegmenter, StackError};

const CONV: ConversationId = ConversationId(1);
const TIMEOUT: Duration = Duration::from_secs(5);

fn connected_pair() -> (FramedTransport, FramedTransport) {
    let listener = FramedTransport::listen("127.0.0.1:0", TransportConfig::default()).unwrap();
    let addr = listener.local_addr();
    let acceptor = thread::spawn(move || listener.accept_once().unwrap());
    let initiator = FramedTransport::connect(addr, TransportConfig::default()).unwrap();
    (initiator, acceptor.join().unwrap())
}

/// Holds frames until a full batch is queued, then writes them in a fixed
/// permutation to simulate a network that reorders.
struct ShuffleSink {
    transport: FramedTransport,
    order: Vec<usize>,
    held: Mutex<Vec<Vec<u8>>>,
}

impl FrameSink for ShuffleSink {
    fn send_frame(&self, payload: &[u8]) -> osistack_rs::Result<()> {
        let mut held = self.held.lock().unwrap();
        held.push(payload.to_vec());
        if held.len() == self.order.len() {
            for &i in &self.order {
                self.transport.send(&held[i])?;
            }
            held.clear();
        }
        Ok(())
    }
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    done()
}

#[test]
fn reordered_frames_delivered_in_order() {
    let (a, b) = connected_pair();

    let (tx, rx) = mpsc::channel::<Bytes>();
    let receiver = Arc::new(ReliableSegmenter::new(
        SegmenterConfig::default(),
        move |_, payload| {
            tx.send(payload).unwrap();
        },
    ));
    let b_handle = receiver.attach(CONV, &b).unwrap();

    let sender = Arc::new(ReliableSegmenter::new(SegmenterConfig::default(), |_, _| {}));
    sender.open_conversation(
        CONV,
        Arc::new(ShuffleSink {
            transport: a.clone(),
            // gamma, alpha, beta
            order: vec![2, 0, 1],
            held: Mutex::new(Vec::new()),
        }),
    );
    let ack_reader = Arc::clone(&sender);
    let a_handle = a
        .start_receiving(move |frame| ack_reader.on_frame(CONV, &frame))
        .unwrap();

    for payload in ["alpha", "beta", "gamma"] {
        sender.send(CONV, payload.as_bytes().to_vec()).unwrap();
    }

    let got: Vec<Bytes> = (0..3).map(|_| rx.recv_timeout(TIMEOUT).unwrap()).collect();
    assert_eq!(got, vec![&b"alpha"[..], &b"beta"[..], &b"gamma"[..]]);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    assert!(wait_until(|| sender.unacknowledged(CONV).unwrap().is_empty()));
    assert_eq!(receiver.expected_sequence(CONV).unwrap(), 3);
    // Three ACKs went back on the receiver's own sequence space.
    assert_eq!(receiver.next_sequence(CONV).unwrap(), 3);

    a.close();
    assert!(matches!(a_handle.join(), CloseReason::LocalClose));
    assert!(matches!(b_handle.join(), CloseReason::PeerClosed));
}

#[test]
fn bidirectional_exchange() {
    let (a, b) = connected_pair();

    let (a_tx, a_rx) = mpsc::channel::<Bytes>();
    let (b_tx, b_rx) = mpsc::channel::<Bytes>();
    let side_a = Arc::new(ReliableSegmenter::new(SegmenterConfig::default(), move |_, p| {
        a_tx.send(p).unwrap();
    }));
    let side_b = Arc::new(ReliableSegmenter::new(SegmenterConfig::default(), move |_, p| {
        b_tx.send(p).unwrap();
    }));
    let _a_handle = side_a.attach(CONV, &a).unwrap();
    let _b_handle = side_b.attach(CONV, &b).unwrap();

    let a_sender = Arc::clone(&side_a);
    let writer = thread::spawn(move || {
        for i in 0..50u32 {
            a_sender.send(CONV, i.to_be_bytes().to_vec()).unwrap();
        }
    });
    for i in 0..50u32 {
        side_b.send(CONV, format!("reply-{i}").into_bytes()).unwrap();
    }
    writer.join().unwrap();

    for i in 0..50u32 {
        let payload = b_rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(payload.as_ref(), i.to_be_bytes());
    }
    for i in 0..50u32 {
        let payload = a_rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(payload.as_ref(), format!("reply-{i}").as_bytes());
    }

    assert!(wait_until(|| side_a.unacknowledged(CONV).unwrap().is_empty()));
    assert!(wait_until(|| side_b.unacknowledged(CONV).unwrap().is_empty()));
    a.close();
    b.close();
}

#[test]
fn malformed_segment_closes_connection() {
    let (a, b) = connected_pair();
    let receiver = Arc::new(ReliableSegmenter::new(SegmenterConfig::default(), |_, _| {}));
    let handle = receiver.attach(CONV, &b).unwrap();

    a.send(b"definitely not a segment").unwrap();

    assert!(matches!(
        handle.join(),
        CloseReason::Failed(StackError::MalformedSegment(_))
    ));
    assert!(!b.is_connected());
    assert!(matches!(
        receiver.send(CONV, b"late".as_slice()),
        Err(StackError::NotConnected)
    ));
}

#[test]
fn close_fails_pending_send() {
    let (a, b) = connected_pair();

    // The peer never reads, so the sender eventually blocks in write.
    let sender = a.clone();
    let pending = thread::spawn(move || {
        let chunk = vec![0u8; 64 * 1024];
        loop {
            if let Err(e) = sender.send(&chunk) {
                return e;
            }
        }
    });

    thread::sleep(Duration::from_millis(300));
    a.close();

    let err = pending.join().unwrap();
    assert!(matches!(err, StackError::NotConnected), "got {err:?}");
    assert!(matches!(a.send(b"after"), Err(StackError::NotConnected)));
    drop(b);
}

#[test]
fn peer_close_marks_connection_closed() {
    let (a, b) = connected_pair();
    let handle = a.start_receiving(|_| Ok(())).unwrap();
    b.close();
    assert!(matches!(handle.join(), CloseReason::PeerClosed));
    assert!(matches!(a.send(b"x"), Err(StackError::NotConnected)));
}
