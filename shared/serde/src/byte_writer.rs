use crate::{Serde, SerdeErr};

/// A growable byte buffer that values are serialized into.
///
/// A writer created with [`ByteWriter::with_limit`] refuses to grow past its
/// limit. Writes that would overflow are dropped and remembered, so the
/// caller finds out when it calls [`ByteWriter::try_finish`].
pub struct ByteWriter {
    buffer: Vec<u8>,
    limit: Option<usize>,
    overflow: Option<usize>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
            limit: None,
            overflow: None,
        }
    }

    /// Creates a writer that can hold at most `limit` bytes
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(limit),
            limit: Some(limit),
            overflow: None,
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    pub fn write<T: Serde>(&mut self, value: &T) {
        value.ser(self);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if let Some(limit) = self.limit {
            let attempted = self.buffer.len() + bytes.len();
            if attempted > limit || self.overflow.is_some() {
                let previous = self.overflow.unwrap_or(self.buffer.len());
                self.overflow = Some(previous + bytes.len());
                return;
            }
        }
        self.buffer.extend_from_slice(bytes);
    }

    /// Reserves two bytes for a length prefix and returns their position
    pub fn write_u16_placeholder(&mut self) -> usize {
        let position = self.buffer.len();
        self.write_u16(0);
        position
    }

    /// Overwrites two previously written bytes at `position`
    pub fn patch_u16(&mut self, position: usize, value: u16) -> Result<(), SerdeErr> {
        let length = self.buffer.len();
        let Some(slot) = self.buffer.get_mut(position..position + 2) else {
            return Err(SerdeErr::SeekOutOfBounds { position, length });
        };
        slot.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Number of bytes written so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn has_overflowed(&self) -> bool {
        self.overflow.is_some()
    }

    /// Returns the written bytes, or an error if a bounded writer overflowed
    pub fn try_finish(self) -> Result<Vec<u8>, SerdeErr> {
        match (self.overflow, self.limit) {
            (Some(attempted), Some(limit)) => Err(SerdeErr::CapacityExceeded { attempted, limit }),
            _ => Ok(self.buffer),
        }
    }

    /// Returns the written bytes of an unbounded writer
    ///
    /// # Panics
    ///
    /// Panics if the writer was bounded and a write exceeded its limit.
    /// Consider using `try_finish` for non-panicking error handling.
    pub fn to_bytes(self) -> Vec<u8> {
        self.try_finish()
            .expect("ByteWriter overflowed its limit, the destination buffer was mis-sized")
    }
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}
