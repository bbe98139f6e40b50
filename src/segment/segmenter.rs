//! Reliable segment layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::{debug, info, trace};

use crate::error::{Result, StackError};
use crate::lock;
use crate::transport::{FrameSink, FramedTransport, ReceiveHandle};

use super::reassembly::{Arrival, ReassemblyBuffer};
use super::record::{ConversationId, DEFAULT_WINDOW, Segment};
use super::retransmit::{RetransmitSet, RetryPolicy};

/// Segmenter configuration.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Window advertised in every segment.
    pub window: u32,
    /// Retry budget for unacknowledged segments.
    pub retry_policy: RetryPolicy,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl SegmenterConfig {
    /// Set the advertised window.
    pub fn with_window(mut self, window: u32) -> Self {
        self.window = window;
        self
    }

    /// Set the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

/// Callback receiving in-order payloads.
pub type DeliveryCallback = Box<dyn Fn(ConversationId, Bytes) + Send + Sync>;

#[derive(Debug, Default)]
struct Outbound {
    next_sequence: u32,
    retransmit: RetransmitSet,
}

struct Conversation {
    sink: Arc<dyn FrameSink>,
    /// Held across the sink write so segments hit the wire in sequence order.
    outbound: Mutex<Outbound>,
    /// Only touched from the conversation's receive path.
    inbound: Mutex<ReassemblyBuffer>,
}

/// Assigns sequence numbers, acknowledges data segments, and releases
/// payloads to the consumer in sequence order.
///
/// State is kept per [`ConversationId`]; each conversation has its own
/// downstream [`FrameSink`].
pub struct ReliableSegmenter {
    config: SegmenterConfig,
    conversations: Mutex<HashMap<ConversationId, Arc<Conversation>>>,
    deliver: DeliveryCallback,
}

impl ReliableSegmenter {
    /// Create a segmenter that hands ordered payloads to `deliver`.
    pub fn new<F>(config: SegmenterConfig, deliver: F) -> Self
    where
        F: Fn(ConversationId, Bytes) + Send + Sync + 'static,
    {
        Self {
            config,
            conversations: Mutex::new(HashMap::new()),
            deliver: Box::new(deliver),
        }
    }

    /// Get the segmenter configuration.
    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Register a conversation, starting both sequence spaces at 0.
    ///
    /// Replaces any existing conversation under the same id.
    pub fn open_conversation(&self, id: ConversationId, sink: Arc<dyn FrameSink>) {
        let conversation = Arc::new(Conversation {
            sink,
            outbound: Mutex::new(Outbound::default()),
            inbound: Mutex::new(ReassemblyBuffer::new()),
        });
        if lock(&self.conversations).insert(id, conversation).is_some() {
            debug!(conversation = %id, "conversation replaced");
        }
        info!(conversation = %id, "conversation opened");
    }

    /// Drop a conversation and its state.
    pub fn close_conversation(&self, id: ConversationId) -> bool {
        let removed = lock(&self.conversations).remove(&id).is_some();
        if removed {
            info!(conversation = %id, "conversation closed");
        }
        removed
    }

    /// Open a conversation over `transport` and feed it from the
    /// transport's receive loop.
    ///
    /// A frame that does not decode as a segment closes the connection.
    pub fn attach(
        self: &Arc<Self>,
        id: ConversationId,
        transport: &FramedTransport,
    ) -> Result<ReceiveHandle> {
        self.open_conversation(id, Arc::new(transport.clone()));
        let segmenter = Arc::clone(self);
        transport.start_receiving(move |frame| segmenter.on_frame(id, &frame))
    }

    fn conversation(&self, id: ConversationId) -> Result<Arc<Conversation>> {
        lock(&self.conversations)
            .get(&id)
            .cloned()
            .ok_or(StackError::UnknownConversation(id))
    }

    /// Send a payload as the next data segment. Returns its sequence.
    pub fn send(&self, id: ConversationId, payload: impl Into<Bytes>) -> Result<u32> {
        let conversation = self.conversation(id)?;
        let window = self.config.window;
        let payload = payload.into();

        let mut outbound = lock(&conversation.outbound);
        let sequence = outbound.next_sequence;
        let segment = Segment::data(sequence, payload, window);
        conversation.sink.send_frame(&segment.to_bytes()?)?;

        outbound.next_sequence = sequence.wrapping_add(1);
        outbound.retransmit.insert(segment);
        trace!(conversation = %id, sequence, "segment sent");
        Ok(sequence)
    }

    /// Decode a frame payload and process it as a segment.
    pub fn on_frame(&self, id: ConversationId, frame: &[u8]) -> Result<()> {
        let segment = Segment::from_bytes(frame)?;
        self.on_segment_received(id, segment)
    }

    /// Process one inbound segment.
    ///
    /// ACKs clear the matching entry from the retransmit set and consume
    /// their sequence slot without delivering anything. Data segments are
    /// acknowledged, then delivered, held, or dropped as duplicates.
    /// Delivery still happens when the ACK cannot be sent; the send error
    /// is returned afterwards.
    ///
    /// The delivery callback runs after the inbound state is released, so
    /// it may call back into the segmenter.
    pub fn on_segment_received(&self, id: ConversationId, segment: Segment) -> Result<()> {
        let conversation = self.conversation(id)?;
        let sequence = segment.sequence;

        let (arrival, ack_result) = if segment.is_ack() {
            let acked = lock(&conversation.outbound)
                .retransmit
                .acknowledge(segment.ack)
                .is_some();
            trace!(conversation = %id, sequence, ack = segment.ack, acked, "ack received");
            (lock(&conversation.inbound).skip(sequence), Ok(()))
        } else {
            let ack_result = self.send_ack(id, &conversation, sequence);
            (lock(&conversation.inbound).feed(segment), ack_result)
        };

        match arrival {
            Arrival::Delivered(payloads) => {
                if !payloads.is_empty() {
                    trace!(conversation = %id, sequence, count = payloads.len(), "delivering");
                }
                for payload in payloads {
                    (self.deliver)(id, payload);
                }
            }
            Arrival::Buffered => {
                debug!(conversation = %id, sequence, "segment buffered");
            }
            Arrival::Duplicate => {
                debug!(conversation = %id, sequence, "duplicate segment dropped");
            }
        }

        ack_result
    }

    fn send_ack(&self, id: ConversationId, conversation: &Conversation, acked: u32) -> Result<()> {
        let mut outbound = lock(&conversation.outbound);
        let sequence = outbound.next_sequence;
        let ack = Segment::ack_for(sequence, acked, self.config.window);
        conversation.sink.send_frame(&ack.to_bytes()?)?;
        // ACKs occupy the sender's own sequence space.
        outbound.next_sequence = sequence.wrapping_add(1);
        trace!(conversation = %id, sequence, ack = acked, "ack sent");
        Ok(())
    }

    /// Sequence numbers sent and not yet acknowledged.
    pub fn unacknowledged(&self, id: ConversationId) -> Result<Vec<u32>> {
        Ok(lock(&self.conversation(id)?.outbound).retransmit.sequences())
    }

    /// Sequence numbers overdue under the configured retry policy.
    pub fn overdue(&self, id: ConversationId) -> Result<Vec<u32>> {
        let conversation = self.conversation(id)?;
        let outbound = lock(&conversation.outbound);
        Ok(outbound
            .retransmit
            .overdue(std::time::Instant::now(), &self.config.retry_policy))
    }

    /// Sequence number the next outbound segment will carry.
    pub fn next_sequence(&self, id: ConversationId) -> Result<u32> {
        Ok(lock(&self.conversation(id)?.outbound).next_sequence)
    }

    /// Next inbound sequence number that can be delivered.
    pub fn expected_sequence(&self, id: ConversationId) -> Result<u32> {
        Ok(lock(&self.conversation(id)?.inbound).expected())
    }

    /// Inbound sequence numbers held for reassembly.
    pub fn buffered(&self, id: ConversationId) -> Result<Vec<u32>> {
        Ok(lock(&self.conversation(id)?.inbound).held())
    }
}

impl std::fmt::Debug for ReliableSegmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReliableSegmenter")
            .field("config", &self.config)
            .field("conversations", &lock(&self.conversations).len())
            .finish()
    }
}
