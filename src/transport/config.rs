//! Transport configuration types.

use std::time::Duration;

use crate::frame::DEFAULT_MAX_FRAME_SIZE;

/// Configuration for a [`FramedTransport`](super::FramedTransport).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Largest payload accepted in either direction.
    pub max_frame_size: usize,
    /// Disable Nagle's algorithm on the connection.
    pub nodelay: bool,
    /// Timeout for `connect`. `None` blocks until the OS gives up.
    pub connect_timeout: Option<Duration>,
    /// Write timeout applied to the connection.
    pub write_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            nodelay: true,
            connect_timeout: None,
            write_timeout: None,
        }
    }
}

impl TransportConfig {
    /// Set the maximum frame payload size.
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Set TCP nodelay.
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config_builder() {
        let config = TransportConfig::default()
            .with_max_frame_size(1024)
            .with_nodelay(false)
            .with_connect_timeout(Duration::from_secs(2));

        assert_eq!(config.max_frame_size, 1024);
        assert!(!config.nodelay);
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(2)));
        assert!(config.write_timeout.is_none());
    }

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert!(config.nodelay);
    }
}
