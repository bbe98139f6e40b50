//! Loopback client demo.
//!
//! Sends three payloads to the server demo and prints the echoes.
//!
//! Run the server first: cargo run --example loopback_server
//! Then run: cargo run --example loopback_client

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use osistack_rs::segment::SegmenterConfig;
use osistack_rs::transport::TransportConfig;
use osistack_rs::{ConversationId, FramedTransport, ReliableSegmenter};

const SERVER_ADDR: &str = "127.0.0.1:12345";
const CONVERSATION: ConversationId = ConversationId(1);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    println!("Connecting to {SERVER_ADDR}...");
    let config = TransportConfig::default().with_connect_timeout(Duration::from_secs(5));
    let transport = FramedTransport::connect(SERVER_ADDR, config)?;
    println!("Connected!");

    let (tx, rx) = mpsc::channel();
    let segmenter = Arc::new(ReliableSegmenter::new(
        SegmenterConfig::default(),
        move |_, payload| {
            let _ = tx.send(payload);
        },
    ));
    let handle = segmenter.attach(CONVERSATION, &transport)?;

    let messages = ["alpha", "beta", "gamma"];
    for message in messages {
        let sequence = segmenter.send(CONVERSATION, message.as_bytes().to_vec())?;
        println!("Sent {message:?} as segment {sequence}");
    }

    for _ in messages {
        let echo = rx.recv_timeout(Duration::from_secs(5))?;
        println!("Echo: {}", String::from_utf8_lossy(&echo));
    }

    println!(
        "Unacknowledged after echoes: {:?}",
        segmenter.unacknowledged(CONVERSATION)?
    );

    transport.close();
    println!("Receive loop ended: {:?}", handle.join());

    Ok(())
}
