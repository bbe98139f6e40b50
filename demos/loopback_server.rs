//! Loopback server demo.
//!
//! Accepts one peer, prints every payload in delivery order, and echoes it
//! back upper-cased.
//!
//! Run with: cargo run --example loopback_server
//! Then connect with: cargo run --example loopback_client

use std::sync::{Arc, Weak};

use osistack_rs::segment::SegmenterConfig;
use osistack_rs::transport::TransportConfig;
use osistack_rs::{ConversationId, FramedTransport, ReliableSegmenter};

const BIND_ADDR: &str = "127.0.0.1:12345";
const CONVERSATION: ConversationId = ConversationId(1);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let listener = FramedTransport::listen(BIND_ADDR, TransportConfig::default())?;
    println!("Listening on {}", listener.local_addr());

    let transport = listener.accept_once()?;
    println!("Connection from {}", transport.peer_addr());

    // The echo path holds only a weak handle so the segmenter can drop.
    let segmenter = Arc::new_cyclic(|weak: &Weak<ReliableSegmenter>| {
        let weak = weak.clone();
        ReliableSegmenter::new(SegmenterConfig::default(), move |id, payload| {
            let text = String::from_utf8_lossy(&payload).into_owned();
            println!("Received on {id}: {text}");
            let Some(segmenter) = weak.upgrade() else {
                return;
            };
            if let Err(e) = segmenter.send(id, text.to_uppercase().into_bytes()) {
                eprintln!("Failed to echo: {e}");
            }
        })
    });

    let handle = segmenter.attach(CONVERSATION, &transport)?;
    let reason = handle.join();
    println!("Connection closed: {reason:?}");
    println!("Stats: {:?}", transport.stats());

    Ok(())
}
