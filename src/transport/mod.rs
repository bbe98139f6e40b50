//! Framed stream transport.
//!
//! Turns one TCP connection into atomic whole-frame sends and a background
//! receive loop that hands complete frames to a consumer in wire order.
//!
//! # Example
//!
//! ```no_run
//! use osistack_rs::transport::{FramedTransport, TransportConfig};
//!
//! let transport = FramedTransport::connect("127.0.0.1:12345", TransportConfig::default()).unwrap();
//!
//! let handle = transport
//!     .start_receiving(|frame| {
//!         println!("got {} bytes", frame.len());
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! transport.send(b"hello").unwrap();
//! transport.close();
//! handle.join();
//! ```

mod config;
mod framed;
mod state;

pub use config::TransportConfig;
pub use framed::{CloseReason, FrameListener, FrameSink, FramedTransport, ReceiveHandle};
pub use state::{ConnectionInfo, ConnectionRole, ConnectionState, ConnectionStats};
