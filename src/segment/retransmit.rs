//! Tracking of sent segments awaiting acknowledgment.
//!
//! Nothing here resends on its own. [`RetransmitSet::overdue`] together
//! with a [`RetryPolicy`] is the hook a retransmission timer would drive.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::record::Segment;

/// Default retry budget per segment.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Retry policy for unacknowledged segments.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum resend attempts per segment.
    pub max_retries: u32,
    /// How long a segment may stay unacknowledged before it is overdue.
    /// `None` means segments never become overdue.
    pub retransmit_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retransmit_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            retransmit_timeout: None,
        }
    }

    /// Create a policy that marks segments overdue after `timeout`.
    pub fn with_timeout(max_retries: u32, timeout: Duration) -> Self {
        Self {
            max_retries,
            retransmit_timeout: Some(timeout),
        }
    }

    /// Check if another resend attempt is allowed.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_retries
    }
}

#[derive(Debug, Clone)]
struct Pending {
    segment: Segment,
    sent_at: Instant,
    attempts: u32,
}

/// Sent segments keyed by sequence number, removed on matching ACK.
#[derive(Debug, Default)]
pub struct RetransmitSet {
    pending: BTreeMap<u32, Pending>,
}

impl RetransmitSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a segment that was just sent.
    pub fn insert(&mut self, segment: Segment) {
        self.pending.insert(
            segment.sequence,
            Pending {
                segment,
                sent_at: Instant::now(),
                attempts: 0,
            },
        );
    }

    /// Remove the segment acknowledged by `ack`, if tracked.
    pub fn acknowledge(&mut self, ack: u32) -> Option<Segment> {
        self.pending.remove(&ack).map(|p| p.segment)
    }

    /// Unacknowledged sequence numbers, ascending.
    pub fn sequences(&self) -> Vec<u32> {
        self.pending.keys().copied().collect()
    }

    /// Segments past the policy timeout that still have retry budget.
    pub fn overdue(&self, now: Instant, policy: &RetryPolicy) -> Vec<u32> {
        let Some(timeout) = policy.retransmit_timeout else {
            return Vec::new();
        };
        self.pending
            .iter()
            .filter(|(_, p)| {
                now.saturating_duration_since(p.sent_at) >= timeout
                    && policy.should_retry(p.attempts)
            })
            .map(|(&seq, _)| seq)
            .collect()
    }

    /// Record a resend of `sequence`. Returns the attempt count so far.
    pub fn record_attempt(&mut self, sequence: u32) -> Option<u32> {
        let pending = self.pending.get_mut(&sequence)?;
        pending.attempts += 1;
        pending.sent_at = Instant::now();
        Some(pending.attempts)
    }

    /// Number of unacknowledged segments.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if everything has been acknowledged.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
