//! In-order reassembly of sequenced segments.

use std::collections::BTreeMap;

use bytes::Bytes;

use super::record::Segment;

/// Outcome of feeding one data segment to a [`ReassemblyBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arrival {
    /// The segment closed the gap. Payloads are in delivery order and
    /// include any buffered run that became contiguous.
    Delivered(Vec<Bytes>),
    /// Ahead of the expected sequence; held until the gap closes.
    Buffered,
    /// Already delivered; dropped.
    Duplicate,
}

/// Holds out-of-order segments until they can be released in order.
///
/// Every held key is strictly greater than [`expected`](Self::expected).
/// A held slot without payload stands for a peer ACK, which occupies a
/// sequence number but is never delivered.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    expected: u32,
    pending: BTreeMap<u32, Option<Bytes>>,
}

impl ReassemblyBuffer {
    /// Create an empty buffer expecting sequence 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a data segment.
    pub fn feed(&mut self, segment: Segment) -> Arrival {
        let payload = segment.payload();
        self.accept(segment.sequence, Some(payload))
    }

    /// Account for a peer ACK carried on `sequence`.
    ///
    /// The slot is consumed so later data is not held behind it; any
    /// payloads it unblocks are returned.
    pub fn skip(&mut self, sequence: u32) -> Arrival {
        self.accept(sequence, None)
    }

    fn accept(&mut self, sequence: u32, payload: Option<Bytes>) -> Arrival {
        if sequence < self.expected {
            return Arrival::Duplicate;
        }

        if sequence > self.expected {
            // A repeat of a held sequence replaces the stale copy.
            self.pending.insert(sequence, payload);
            return Arrival::Buffered;
        }

        let mut delivered: Vec<Bytes> = payload.into_iter().collect();
        self.expected = self.expected.wrapping_add(1);

        while let Some(next) = self.pending.remove(&self.expected) {
            delivered.extend(next);
            self.expected = self.expected.wrapping_add(1);
        }

        Arrival::Delivered(delivered)
    }

    /// Next sequence number that can be delivered.
    pub fn expected(&self) -> u32 {
        self.expected
    }

    /// Sequence numbers currently held, ascending.
    pub fn held(&self) -> Vec<u32> {
        self.pending.keys().copied().collect()
    }

    /// Number of held segments.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing is held.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::record::DEFAULT_WINDOW;

    fn seg(sequence: u32, payload: &'static [u8]) -> Segment {
        Segment::data(sequence, payload, DEFAULT_WINDOW)
    }

    fn delivered(payloads: &[&'static [u8]]) -> Arrival {
        Arrival::Delivered(payloads.iter().map(|&p| Bytes::from_static(p)).collect())
    }

    #[test]
    fn test_in_order() {
        let mut buffer = ReassemblyBuffer::new();
        assert_eq!(buffer.feed(seg(0, b"a")), delivered(&[b"a"]));
        assert_eq!(buffer.feed(seg(1, b"b")), delivered(&[b"b"]));
        assert_eq!(buffer.expected(), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_out_of_order_drains_run() {
        let mut buffer = ReassemblyBuffer::new();
        assert_eq!(buffer.feed(seg(2, b"c")), Arrival::Buffered);
        assert_eq!(buffer.feed(seg(1, b"b")), Arrival::Buffered);
        assert_eq!(buffer.held(), vec![1, 2]);

        assert_eq!(buffer.feed(seg(0, b"a")), delivered(&[b"a", b"b", b"c"]));
        assert_eq!(buffer.expected(), 3);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_stops_at_gap() {
        let mut buffer = ReassemblyBuffer::new();
        buffer.feed(seg(1, b"b"));
        buffer.feed(seg(3, b"d"));

        assert_eq!(buffer.feed(seg(0, b"a")), delivered(&[b"a", b"b"]));
        assert_eq!(buffer.expected(), 2);
        assert_eq!(buffer.held(), vec![3]);
    }

    #[test]
    fn test_duplicate_dropped() {
        let mut buffer = ReassemblyBuffer::new();
        buffer.feed(seg(0, b"a"));
        assert_eq!(buffer.feed(seg(0, b"a")), Arrival::Duplicate);
        assert_eq!(buffer.expected(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_repeated_gap_segment_stays_buffered() {
        let mut buffer = ReassemblyBuffer::new();
        assert_eq!(buffer.feed(seg(5, b"old")), Arrival::Buffered);
        assert_eq!(buffer.feed(seg(5, b"new")), Arrival::Buffered);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.held(), vec![5]);
        assert_eq!(buffer.expected(), 0);
    }

    #[test]
    fn test_ack_slot_keeps_sequence_contiguous() {
        let mut buffer = ReassemblyBuffer::new();
        assert_eq!(buffer.feed(seg(0, b"a")), delivered(&[b"a"]));
        assert_eq!(buffer.skip(1), Arrival::Delivered(Vec::new()));
        assert_eq!(buffer.feed(seg(2, b"c")), delivered(&[b"c"]));
        assert_eq!(buffer.expected(), 3);
    }

    #[test]
    fn test_late_ack_slot_releases_held_data() {
        let mut buffer = ReassemblyBuffer::new();
        assert_eq!(buffer.feed(seg(1, b"b")), Arrival::Buffered);
        assert_eq!(buffer.skip(0), delivered(&[b"b"]));
        assert!(buffer.is_empty());
        assert_eq!(buffer.skip(0), Arrival::Duplicate);
    }
}
