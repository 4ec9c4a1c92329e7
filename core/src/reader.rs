//! Read-until-close response streaming.
//!
//! The peer signals the end of the response by closing the stream, so the
//! reader loops until a zero-length read. A failed read ends the loop with
//! an error and is never mistaken for that clean close.

use std::io::Write;

use crate::error::FetchError;
use crate::transport::Connection;

/// Default read window, in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// A fixed-capacity read window reused across reads. Only the bytes from
/// the most recent read are ever exposed.
pub struct ResponseBuffer {
    buf: Box<[u8]>,
    len: usize,
}

impl ResponseBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity.max(1)].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Replace the window contents with one read from `conn`.
    pub fn fill<C: Connection + ?Sized>(&mut self, conn: &mut C) -> Result<usize, FetchError> {
        self.len = 0;
        self.len = conn.read(&mut self.buf)?;
        Ok(self.len)
    }

    /// The bytes of the most recent read.
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Default for ResponseBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }
}

/// Forward everything `conn` yields to `sink` until the peer closes.
///
/// Returns the number of bytes forwarded.
pub fn drain<C, W>(conn: &mut C, sink: &mut W) -> Result<u64, FetchError>
where
    C: Connection + ?Sized,
    W: Write + ?Sized,
{
    drain_with_buffer(conn, sink, &mut ResponseBuffer::default())
}

/// [`drain`] with a caller-supplied read window.
pub fn drain_with_buffer<C, W>(
    conn: &mut C,
    sink: &mut W,
    buffer: &mut ResponseBuffer,
) -> Result<u64, FetchError>
where
    C: Connection + ?Sized,
    W: Write + ?Sized,
{
    let mut total = 0u64;
    loop {
        let n = match buffer.fill(conn) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                log::warn!("response read failed after {total} bytes: {e}");
                return Err(e);
            }
        };
        sink.write_all(buffer.filled()).map_err(FetchError::SinkError)?;
        total += n as u64;
    }
    sink.flush().map_err(FetchError::SinkError)?;
    log::debug!("peer closed the stream after {total} bytes");
    Ok(total)
}
