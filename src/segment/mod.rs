//! Reliable segment layer.
//!
//! Wraps each outbound payload in a sequenced [`Segment`], acknowledges
//! every inbound data segment, and releases payloads to the consumer in
//! strictly increasing sequence order.
//!
//! # Overview
//!
//! - Sequence numbers start at 0 and advance by one per emitted segment,
//!   ACKs included
//! - Segments arriving ahead of a gap are held in a [`ReassemblyBuffer`]
//! - Duplicates are acknowledged again but never redelivered
//! - Sent segments stay in a [`RetransmitSet`] until their ACK arrives
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use osistack_rs::segment::{ConversationId, ReliableSegmenter, SegmenterConfig};
//! use osistack_rs::transport::{FramedTransport, TransportConfig};
//!
//! let transport = FramedTransport::connect("127.0.0.1:12345", TransportConfig::default()).unwrap();
//! let segmenter = Arc::new(ReliableSegmenter::new(SegmenterConfig::default(), |id, payload| {
//!     println!("{id}: {:?}", payload);
//! }));
//!
//! let conversation = ConversationId(1);
//! let _handle = segmenter.attach(conversation, &transport).unwrap();
//! segmenter.send(conversation, b"alpha".as_slice()).unwrap();
//! ```

mod reassembly;
mod record;
mod retransmit;
mod segmenter;

pub use reassembly::{Arrival, ReassemblyBuffer};
pub use record::{ConversationId, DEFAULT_WINDOW, Segment, SegmentFlags};
pub use retransmit::{DEFAULT_MAX_RETRIES, RetransmitSet, RetryPolicy};
pub use segmenter::{DeliveryCallback, ReliableSegmenter, SegmenterConfig};
