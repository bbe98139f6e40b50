//! Segment record and its wire encoding.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Advisory receive window carried by every segment. Never enforced.
pub const DEFAULT_WINDOW: u32 = 64;

/// Conversation ID - identifies one peer-to-peer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConversationId(pub u32);

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Control flags. Only `ACK` is ever set by this implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SegmentFlags {
    #[serde(rename = "SYN")]
    pub syn: bool,
    #[serde(rename = "ACK")]
    pub ack: bool,
    #[serde(rename = "FIN")]
    pub fin: bool,
}

impl SegmentFlags {
    /// Flags for a pure acknowledgment.
    pub fn ack() -> Self {
        Self {
            ack: true,
            ..Self::default()
        }
    }
}

/// A sequenced unit of application payload.
///
/// Encoded as a JSON object carried as one frame payload:
///
/// ```text
/// {"sequence":3,"ack":0,"flags":{"SYN":false,"ACK":false,"FIN":false},"window":64,"data":[104,105]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Sender-assigned sequence number.
    pub sequence: u32,
    /// Sequence being acknowledged. Meaningful only with the ACK flag.
    pub ack: u32,
    /// Control flags.
    pub flags: SegmentFlags,
    /// Advisory window.
    pub window: u32,
    /// Payload. Absent and empty are treated the same.
    #[serde(default)]
    pub data: Option<Bytes>,
}

impl Segment {
    /// Create a data segment.
    pub fn data(sequence: u32, payload: impl Into<Bytes>, window: u32) -> Self {
        Self {
            sequence,
            ack: 0,
            flags: SegmentFlags::default(),
            window,
            data: Some(payload.into()),
        }
    }

    /// Create a pure acknowledgment for `acked`.
    pub fn ack_for(sequence: u32, acked: u32, window: u32) -> Self {
        Self {
            sequence,
            ack: acked,
            flags: SegmentFlags::ack(),
            window,
            data: None,
        }
    }

    /// Check if this is an acknowledgment.
    pub fn is_ack(&self) -> bool {
        self.flags.ack
    }

    /// Get the payload, empty if absent.
    pub fn payload(&self) -> Bytes {
        self.data.clone().unwrap_or_default()
    }

    /// Serialize the segment to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a segment from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}
