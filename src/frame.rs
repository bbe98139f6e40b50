//! Length-prefixed frame codec.
//!
//! Every unit on the wire is a frame: a 4-byte big-endian length followed
//! by exactly that many payload bytes. There is no magic number or version
//! byte.
//!
//! ```text
//! +--------+--------+--------+--------+
//! |        Length (u32, BE)           |  (4 bytes)
//! +--------+--------+--------+--------+
//! |        Payload ...                |  (Length bytes)
//! +--------+--------+--------+--------+
//! ```

use std::io::{self, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, StackError};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default upper bound on a single frame payload (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Encode a payload into a single contiguous frame.
pub fn encode_frame(payload: &[u8], max_frame_size: usize) -> Result<Bytes> {
    if payload.len() > max_frame_size || payload.len() > u32::MAX as usize {
        return Err(StackError::FrameTooLarge {
            size: payload.len(),
            max: max_frame_size,
        });
    }

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Write one frame to a stream.
///
/// Prefix and payload go out in a single `write_all` so that a frame is
/// never split across two writer lock acquisitions.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8], max_frame_size: usize) -> Result<()> {
    let frame = encode_frame(payload, max_frame_size)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Read one complete frame from a stream.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
/// A stream that ends inside a prefix or payload yields
/// [`StackError::MalformedFrame`]; the caller can no longer trust the
/// framing and must close the connection.
pub fn read_frame<R: Read>(reader: &mut R, max_frame_size: usize) -> Result<Option<Bytes>> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;

    while filled < LENGTH_PREFIX_SIZE {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(StackError::malformed_frame(format!(
                    "stream ended after {filled} of {LENGTH_PREFIX_SIZE} length bytes"
                )));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let length = u32::from_be_bytes(prefix) as usize;
    if length > max_frame_size {
        return Err(StackError::FrameTooLarge {
            size: length,
            max: max_frame_size,
        });
    }

    let mut payload = vec![0u8; length];
    if length > 0 {
        reader.read_exact(&mut payload).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                StackError::malformed_frame(format!("stream ended inside a {length}-byte payload"))
            } else {
                StackError::Io(e)
            }
        })?;
    }

    Ok(Some(Bytes::from(payload)))
}
