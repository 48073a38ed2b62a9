use std::io::{self, Read};

/// Wraps an arbitrary byte source with a one-byte lookahead so a caller can
/// ask "is a byte ready?" without consuming it.
///
/// `std::io::Read` has no peek of its own, so this buffers a single byte
/// internally the way a `bufio.Reader`'s `Peek(1)` would.
pub struct PeekReader<R> {
    inner: R,
    buffered: Option<u8>,
}

impl<R: Read> PeekReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffered: None,
        }
    }

    /// Non-destructively checks whether a byte is available. `Ok(None)`
    /// means the stream is at EOF; it is not an error.
    pub fn probe(&mut self) -> io::Result<Option<u8>> {
        if self.buffered.is_none() {
            let mut byte = [0u8; 1];
            match self.inner.read(&mut byte)? {
                0 => return Ok(None),
                _ => self.buffered = Some(byte[0]),
            }
        }
        Ok(self.buffered)
    }

    /// Blocking read of a single byte, consuming a previously probed byte
    /// first if there is one.
    pub fn read_byte(&mut self) -> io::Result<u8> {
        if let Some(byte) = self.buffered.take() {
            return Ok(byte);
        }
        let mut byte = [0u8; 1];
        self.inner.read_exact(&mut byte)?;
        Ok(byte[0])
    }
}
