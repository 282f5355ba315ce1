#![forbid(unsafe_code)]

use crc::{Crc, Digest, CRC_32_ISO_HDLC};

use crate::error::HistoryUnderflow;

////////////////////////////////////////////////////////////////////////////////

pub static CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Append-only output buffer. The whole output doubles as the back-reference
/// window, so nothing is ever evicted.
pub struct TrackingWriter {
    digest: Digest<'static, u32>,
    buffer: Vec<u8>,
}

impl TrackingWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            digest: CRC.digest(),
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, byte: u8) {
        self.digest.update(&[byte]);
        self.buffer.push(byte);
    }

    pub fn write_slice(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
        self.buffer.extend_from_slice(bytes);
    }

    /// Write a sequence of `len` bytes starting `dist` bytes before the end.
    ///
    /// Bytes are copied one at a time, so when `dist < len` the run reads bytes it
    /// has just produced and repeats the last `dist` bytes periodically.
    pub fn write_previous(&mut self, dist: usize, len: usize) -> Result<(), HistoryUnderflow> {
        let available = self.byte_count();
        if dist == 0 || dist > available {
            return Err(HistoryUnderflow {
                distance: dist,
                available,
            });
        }
        let start = available - dist;
        for i in 0..len {
            let byte = self.buffer[start + i];
            self.push(byte);
        }
        Ok(())
    }

    pub fn byte_count(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the written bytes together with their CRC-32.
    pub fn finish(self) -> (Vec<u8>, u32) {
        (self.buffer, self.digest.finalize())
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

////////////////////////////////////////////////////////////////////////////////
