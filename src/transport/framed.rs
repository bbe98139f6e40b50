//! Framed TCP transport.

use std::io::{self, BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Result, StackError};
use crate::frame::{read_frame, write_frame};
use crate::lock;

use super::config::TransportConfig;
use super::state::{ConnectionInfo, ConnectionRole, ConnectionState, ConnectionStats};

/// Anything that can carry one frame payload to the peer.
///
/// A segmenter conversation holds one of these as its downstream handle.
pub trait FrameSink: Send + Sync {
    /// Send one payload as a single frame.
    fn send_frame(&self, payload: &[u8]) -> Result<()>;
}

/// Why a receive loop stopped.
#[derive(Debug)]
pub enum CloseReason {
    /// The peer closed the connection on a frame boundary.
    PeerClosed,
    /// `close()` was called on this side.
    LocalClose,
    /// A read failed, a frame was malformed, or the frame consumer failed.
    Failed(StackError),
    /// The frame consumer panicked.
    Panicked,
}

/// Handle to a running receive loop.
#[derive(Debug)]
pub struct ReceiveHandle {
    handle: JoinHandle<CloseReason>,
}

impl ReceiveHandle {
    /// Check whether the loop has terminated.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the loop to terminate.
    pub fn join(self) -> CloseReason {
        self.handle.join().unwrap_or(CloseReason::Panicked)
    }
}

/// A passive socket waiting for exactly one peer.
#[derive(Debug)]
pub struct FrameListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: TransportConfig,
}

impl FrameListener {
    /// Get the local address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Block until one peer connects, then hand over the connection.
    pub fn accept_once(self) -> Result<FramedTransport> {
        let (stream, addr) = self.listener.accept().map_err(StackError::Accept)?;
        info!(peer = %addr, "accepted connection");
        FramedTransport::from_stream(stream, ConnectionRole::Acceptor, self.config)
            .map_err(StackError::Accept)
    }
}

struct Shared {
    /// Only used to shut the socket down; never read or written.
    control: TcpStream,
    /// Send-side lock: one frame at a time on the wire.
    writer: Mutex<Option<BufWriter<TcpStream>>>,
    /// Taken by the receive loop when it starts.
    reader: Mutex<Option<BufReader<TcpStream>>>,
    open: AtomicBool,
    closed_locally: AtomicBool,
    stats: Mutex<ConnectionStats>,
}

impl Shared {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn closed_locally(&self) -> bool {
        self.closed_locally.load(Ordering::Acquire)
    }

    /// Transition to closed exactly once.
    ///
    /// Shutting the socket down forces a blocked read or write on any
    /// thread to return.
    fn shut(&self, locally: bool) -> bool {
        if locally {
            self.closed_locally.store(true, Ordering::Release);
        }
        if !self.open.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Err(e) = self.control.shutdown(Shutdown::Both) {
            if e.kind() != io::ErrorKind::NotConnected {
                debug!(error = %e, "socket shutdown failed");
            }
        }
        lock(&self.stats).record_close();
        true
    }
}

/// A duplex byte connection turned into whole-frame send and receive.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct FramedTransport {
    shared: Arc<Shared>,
    info: ConnectionInfo,
    config: TransportConfig,
}

impl FramedTransport {
    /// Bind a passive socket.
    pub fn listen<A: ToSocketAddrs>(addr: A, config: TransportConfig) -> Result<FrameListener> {
        let listener = TcpListener::bind(addr).map_err(StackError::Bind)?;
        let local_addr = listener.local_addr().map_err(StackError::Bind)?;
        info!(addr = %local_addr, "listening");
        Ok(FrameListener {
            listener,
            local_addr,
            config,
        })
    }

    /// Open an active connection to a listening peer.
    pub fn connect<A: ToSocketAddrs>(addr: A, config: TransportConfig) -> Result<Self> {
        let stream = match config.connect_timeout {
            None => TcpStream::connect(addr).map_err(StackError::Connect)?,
            Some(timeout) => {
                let mut last_err = io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "could not resolve to any address",
                );
                let mut connected = None;
                for candidate in addr.to_socket_addrs().map_err(StackError::Connect)? {
                    match TcpStream::connect_timeout(&candidate, timeout) {
                        Ok(stream) => {
                            connected = Some(stream);
                            break;
                        }
                        Err(e) => last_err = e,
                    }
                }
                connected.ok_or(StackError::Connect(last_err))?
            }
        };

        let transport = Self::from_stream(stream, ConnectionRole::Initiator, config)
            .map_err(StackError::Connect)?;
        info!(peer = %transport.info.peer_addr, "connected");
        Ok(transport)
    }

    fn from_stream(
        stream: TcpStream,
        role: ConnectionRole,
        config: TransportConfig,
    ) -> io::Result<Self> {
        stream.set_nodelay(config.nodelay)?;
        stream.set_write_timeout(config.write_timeout)?;

        let info = ConnectionInfo {
            role,
            peer_addr: stream.peer_addr()?,
            local_addr: stream.local_addr()?,
        };
        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream.try_clone()?);

        let mut stats = ConnectionStats::default();
        stats.record_connect();

        Ok(Self {
            shared: Arc::new(Shared {
                control: stream,
                writer: Mutex::new(Some(writer)),
                reader: Mutex::new(Some(reader)),
                open: AtomicBool::new(true),
                closed_locally: AtomicBool::new(false),
                stats: Mutex::new(stats),
            }),
            info,
            config,
        })
    }

    /// Get the connection description.
    pub fn info(&self) -> ConnectionInfo {
        self.info
    }

    /// Get the peer address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.info.peer_addr
    }

    /// Get the role this side played when connecting.
    pub fn role(&self) -> ConnectionRole {
        self.info.role
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        if self.shared.is_open() {
            ConnectionState::Connected
        } else {
            ConnectionState::Closed
        }
    }

    /// Check if the connection is open.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Get a snapshot of the connection statistics.
    pub fn stats(&self) -> ConnectionStats {
        lock(&self.shared.stats).clone()
    }

    /// Get the transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Send one payload as a frame.
    ///
    /// Concurrent sends are serialized; their bytes never interleave.
    /// A write failure closes the connection. A send that was pending
    /// when `close()` ran fails with [`StackError::NotConnected`].
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        if !self.shared.is_open() {
            return Err(StackError::NotConnected);
        }
        let max = self.config.max_frame_size;
        if payload.len() > max {
            return Err(StackError::FrameTooLarge {
                size: payload.len(),
                max,
            });
        }

        let mut guard = lock(&self.shared.writer);
        // close() may have run while this thread waited for the lock.
        if !self.shared.is_open() {
            return Err(StackError::NotConnected);
        }
        let writer = guard.as_mut().ok_or(StackError::NotConnected)?;

        match write_frame(writer, payload, max) {
            Ok(()) => {
                drop(guard);
                lock(&self.shared.stats).record_send(payload.len());
                trace!(peer = %self.info.peer_addr, len = payload.len(), "frame sent");
                Ok(())
            }
            Err(e) => {
                // The buffered writer may hold a partial frame; discard it.
                if let Some(writer) = guard.take() {
                    let _ = writer.into_parts();
                }
                drop(guard);
                if self.shared.closed_locally() {
                    return Err(StackError::NotConnected);
                }
                warn!(peer = %self.info.peer_addr, error = %e, "send failed, closing connection");
                self.shared.shut(false);
                Err(e)
            }
        }
    }

    /// Start the background receive loop.
    ///
    /// `on_frame` is called once per complete frame, in wire order, on a
    /// dedicated thread. Returning an error from it, or panicking, drops
    /// that frame and closes the connection. The loop ends when the peer closes, a read
    /// fails, or `close()` is called.
    pub fn start_receiving<F>(&self, mut on_frame: F) -> Result<ReceiveHandle>
    where
        F: FnMut(Bytes) -> Result<()> + Send + 'static,
    {
        if !self.shared.is_open() {
            return Err(StackError::NotConnected);
        }
        let mut reader = lock(&self.shared.reader)
            .take()
            .ok_or(StackError::AlreadyReceiving)?;

        let shared = Arc::clone(&self.shared);
        let peer = self.info.peer_addr;
        let max = self.config.max_frame_size;

        let handle = thread::Builder::new()
            .name(format!("frame-rx-{peer}"))
            .spawn(move || {
                let reason = loop {
                    match read_frame(&mut reader, max) {
                        Ok(Some(payload)) => {
                            lock(&shared.stats).record_receive(payload.len());
                            trace!(peer = %peer, len = payload.len(), "frame received");
                            match panic::catch_unwind(AssertUnwindSafe(|| on_frame(payload))) {
                                Ok(Ok(())) => {}
                                Ok(Err(e)) => {
                                    warn!(
                                        peer = %peer,
                                        error = %e,
                                        recoverable = e.is_recoverable(),
                                        "frame rejected by consumer"
                                    );
                                    break CloseReason::Failed(e);
                                }
                                Err(_) => {
                                    error!(peer = %peer, "frame consumer panicked");
                                    break CloseReason::Panicked;
                                }
                            }
                        }
                        Ok(None) if shared.closed_locally() => break CloseReason::LocalClose,
                        Ok(None) => break CloseReason::PeerClosed,
                        Err(_) if shared.closed_locally() => break CloseReason::LocalClose,
                        Err(e) => {
                            warn!(
                                peer = %peer,
                                error = %e,
                                fatal = e.is_fatal_to_connection(),
                                "receive failed"
                            );
                            break CloseReason::Failed(e);
                        }
                    }
                };
                shared.shut(false);
                info!(peer = %peer, reason = ?reason, "receive loop stopped");
                reason
            })?;

        Ok(ReceiveHandle { handle })
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        if self.shared.shut(true) {
            info!(peer = %self.info.peer_addr, "connection closed");
        }
    }
}

impl FrameSink for FramedTransport {
    fn send_frame(&self, payload: &[u8]) -> Result<()> {
        self.send(payload)
    }
}

impl std::fmt::Debug for FramedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedTransport")
            .field("role", &self.info.role)
            .field("peer_addr", &self.info.peer_addr)
            .field("state", &self.state())
            .finish()
    }
}
