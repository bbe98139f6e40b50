//! Connection state and statistics.

use std::net::SocketAddr;
use std::time::Instant;

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// Opened with `connect`.
    Initiator,
    /// Accepted from a listener.
    Acceptor,
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Connected and ready.
    Connected,
    /// Closed locally, by the peer, or after a fatal error.
    #[default]
    Closed,
}

impl ConnectionState {
    /// Check if the connection is usable.
    pub fn is_connected(&self) -> bool {
        *self == ConnectionState::Connected
    }
}

/// Static description of the live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Which side opened it.
    pub role: ConnectionRole,
    /// Remote endpoint.
    pub peer_addr: SocketAddr,
    /// Local endpoint.
    pub local_addr: SocketAddr,
}

/// Connection statistics.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Number of frames sent.
    pub frames_sent: u64,
    /// Number of frames received.
    pub frames_received: u64,
    /// Total payload bytes sent.
    pub bytes_sent: u64,
    /// Total payload bytes received.
    pub bytes_received: u64,
    /// Time the connection was established.
    pub connected_at: Option<Instant>,
    /// Time the connection was closed.
    pub closed_at: Option<Instant>,
}

impl ConnectionStats {
    /// Record the connection being established.
    pub fn record_connect(&mut self) {
        self.connected_at = Some(Instant::now());
    }

    /// Record the connection being closed. Only the first close counts.
    pub fn record_close(&mut self) {
        if self.closed_at.is_none() {
            self.closed_at = Some(Instant::now());
        }
    }

    /// Record a sent frame.
    pub fn record_send(&mut self, bytes: usize) {
        self.frames_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    /// Record a received frame.
    pub fn record_receive(&mut self, bytes: usize) {
        self.frames_received += 1;
        self.bytes_received += bytes as u64;
    }

    /// Time spent connected so far, or until close.
    pub fn uptime(&self) -> Option<std::time::Duration> {
        let start = self.connected_at?;
        Some(match self.closed_at {
            Some(end) => end.duration_since(start),
            None => start.elapsed(),
        })
    }
}
