//! Framed stream transport and reliable segment layer built on std::net.
//!
//! This crate is the core of a layered network stack simulation: the two
//! layers with real protocol and concurrency substance. Address bookkeeping,
//! envelopes, and application dispatch live above it and only see an
//! ordered stream of payloads.
//!
//! # Features
//!
//! - Length-prefixed framing over one TCP connection
//! - Background receive loop with whole-frame delivery
//! - Sequenced segments with per-segment acknowledgments
//! - Reordering of out-of-order segments and duplicate suppression
//! - Per-conversation state keyed by [`ConversationId`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use osistack_rs::{ConversationId, FramedTransport, ReliableSegmenter};
//! use osistack_rs::segment::SegmenterConfig;
//! use osistack_rs::transport::TransportConfig;
//!
//! let transport = FramedTransport::connect("127.0.0.1:12345", TransportConfig::default()).unwrap();
//! let segmenter = Arc::new(ReliableSegmenter::new(SegmenterConfig::default(), |_, payload| {
//!     println!("Received: {:?}", payload);
//! }));
//!
//! let conversation = ConversationId(1);
//! let handle = segmenter.attach(conversation, &transport).unwrap();
//! segmenter.send(conversation, b"hello".as_slice()).unwrap();
//!
//! transport.close();
//! handle.join();
//! ```
//!
//! # Protocol Overview
//!
//! Each frame is a 4-byte big-endian length followed by the payload. A
//! frame payload is one JSON-encoded segment:
//!
//! ```text
//! +--------+--------+--------+--------+
//! |           Length (u32)            |  (4 bytes)
//! +--------+--------+--------+--------+
//! | {"sequence":..,"ack":..,"flags":{"SYN":..,"ACK":..,"FIN":..},
//! |  "window":64,"data":[..]}         |  (Length bytes)
//! +--------+--------+--------+--------+
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod error;
pub mod frame;
pub mod segment;
pub mod transport;

// Re-export commonly used types at the crate root
pub use error::{Result, StackError};
pub use frame::{DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE};
pub use segment::{ConversationId, ReliableSegmenter, Segment};
pub use transport::{FrameSink, FramedTransport};

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
