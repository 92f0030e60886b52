use bytes::{Buf, BufMut, BytesMut};

use crate::error::{BufferError, Result};

/// A fixed-capacity byte region addressed by position and limit.
///
/// Bytes between `0` and `capacity()` are always initialized. Relative
/// accessors operate at `position()` and advance it; nothing may be read or
/// written past `limit()`. All multi-byte values use little-endian order.
///
/// ```text
/// 0 <= position <= limit <= capacity
/// ```
pub struct ByteBuffer {
    data: BytesMut,
    position: usize,
    limit: usize,
}

impl ByteBuffer {
    /// Create a zero-filled buffer whose limit equals its capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut data = BytesMut::with_capacity(capacity);
        data.resize(capacity, 0);
        Self {
            data,
            position: 0,
            limit: capacity,
        }
    }

    /// Wrap existing storage, zero-filling it to `capacity`.
    ///
    /// Previous contents of `data` are discarded.
    pub(crate) fn from_storage(mut data: BytesMut, capacity: usize) -> Self {
        data.clear();
        data.resize(capacity, 0);
        Self {
            data,
            position: 0,
            limit: capacity,
        }
    }

    /// Release the underlying storage.
    pub(crate) fn into_storage(self) -> BytesMut {
        self.data
    }

    /// Grow the capacity to `new_capacity`, keeping every existing byte.
    ///
    /// The position is preserved and the limit is moved to the new capacity.
    pub(crate) fn grow(&mut self, new_capacity: usize) {
        if new_capacity > self.data.len() {
            self.data.resize(new_capacity, 0);
        }
        self.limit = self.data.len();
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Move the position. Fails if `position` is past the limit.
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if position > self.limit {
            return Err(BufferError::InvalidPosition {
                position,
                limit: self.limit,
            });
        }
        self.position = position;
        Ok(())
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Move the limit. The position is clamped to the new limit.
    pub fn set_limit(&mut self, limit: usize) -> Result<()> {
        if limit > self.capacity() {
            return Err(BufferError::InvalidLimit {
                limit,
                capacity: self.capacity(),
            });
        }
        self.limit = limit;
        if self.position > limit {
            self.position = limit;
        }
        Ok(())
    }

    /// Bytes left between position and limit.
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.position < self.limit
    }

    /// Reset position to zero and limit to capacity. Contents are untouched.
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.capacity();
    }

    /// Skip `n` bytes without reading them.
    pub fn advance(&mut self, n: usize) -> Result<()> {
        self.check_get(n)?;
        self.position += n;
        Ok(())
    }

    /// Everything from zero up to the limit.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.limit]
    }

    /// The whole storage, regardless of position and limit.
    pub fn storage(&self) -> &[u8] {
        &self.data
    }

    /// The region between position and limit.
    pub fn remaining_slice(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    /// The region between position and limit, writable in place.
    ///
    /// Used by transceivers to receive directly into the buffer.
    pub fn remaining_slice_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.position..self.limit]
    }

    pub fn put_u8(&mut self, v: u8) -> Result<()> {
        self.put_with(1, |mut dst| dst.put_u8(v))
    }

    pub fn put_i16(&mut self, v: i16) -> Result<()> {
        self.put_with(2, |mut dst| dst.put_i16_le(v))
    }

    pub fn put_i32(&mut self, v: i32) -> Result<()> {
        self.put_with(4, |mut dst| dst.put_i32_le(v))
    }

    pub fn put_i64(&mut self, v: i64) -> Result<()> {
        self.put_with(8, |mut dst| dst.put_i64_le(v))
    }

    pub fn put_f32(&mut self, v: f32) -> Result<()> {
        self.put_with(4, |mut dst| dst.put_f32_le(v))
    }

    pub fn put_f64(&mut self, v: f64) -> Result<()> {
        self.put_with(8, |mut dst| dst.put_f64_le(v))
    }

    pub fn put_slice(&mut self, src: &[u8]) -> Result<()> {
        self.put_with(src.len(), |mut dst| dst.put_slice(src))
    }

    /// Write a 32-bit integer at an absolute index without moving the position.
    pub fn put_i32_at(&mut self, index: usize, v: i32) -> Result<()> {
        let end = index.checked_add(4).unwrap_or(usize::MAX);
        if end > self.limit {
            return Err(BufferError::Overflow {
                needed: 4,
                remaining: self.limit.saturating_sub(index),
            });
        }
        let mut dst = &mut self.data[index..end];
        dst.put_i32_le(v);
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        self.get_with(1, |mut src| src.get_u8())
    }

    pub fn get_i16(&mut self) -> Result<i16> {
        self.get_with(2, |mut src| src.get_i16_le())
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        self.get_with(4, |mut src| src.get_i32_le())
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        self.get_with(8, |mut src| src.get_i64_le())
    }

    pub fn get_f32(&mut self) -> Result<f32> {
        self.get_with(4, |mut src| src.get_f32_le())
    }

    pub fn get_f64(&mut self) -> Result<f64> {
        self.get_with(8, |mut src| src.get_f64_le())
    }

    /// Fill `dst` entirely from the buffer.
    pub fn get_slice(&mut self, dst: &mut [u8]) -> Result<()> {
        let len = dst.len();
        self.get_with(len, |mut src| src.copy_to_slice(dst))
    }

    /// Read a 32-bit integer at an absolute index without moving the position.
    pub fn get_i32_at(&self, index: usize) -> Result<i32> {
        let end = index.checked_add(4).unwrap_or(usize::MAX);
        if end > self.limit {
            return Err(BufferError::Underflow {
                needed: 4,
                remaining: self.limit.saturating_sub(index),
            });
        }
        let mut src = &self.data[index..end];
        Ok(src.get_i32_le())
    }

    fn check_put(&self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(BufferError::Overflow {
                needed: n,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    fn check_get(&self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(BufferError::Underflow {
                needed: n,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    fn put_with(&mut self, n: usize, write: impl FnOnce(&mut [u8])) -> Result<()> {
        self.check_put(n)?;
        let start = self.position;
        write(&mut self.data[start..start + n]);
        self.position += n;
        Ok(())
    }

    fn get_with<T>(&mut self, n: usize, read: impl FnOnce(&[u8]) -> T) -> Result<T> {
        self.check_get(n)?;
        let start = self.position;
        let value = read(&self.data[start..start + n]);
        self.position += n;
        Ok(value)
    }
}

impl Default for ByteBuffer {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl std::fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("position", &self.position)
            .field("limit", &self.limit)
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_primitives_little_endian() {
        let mut buf = ByteBuffer::with_capacity(32);
        buf.put_u8(0xAB).unwrap();
        buf.put_i16(-2).unwrap();
        buf.put_i32(0x0102_0304).unwrap();
        buf.put_i64(-1).unwrap();
        buf.put_f32(1.5).unwrap();
        buf.put_f64(-0.25).unwrap();
        assert_eq!(buf.position(), 27);
        assert_eq!(&buf.as_slice()[3..7], &[0x04, 0x03, 0x02, 0x01]);

        buf.set_position(0).unwrap();
        assert_eq!(buf.get_u8().unwrap(), 0xAB);
        assert_eq!(buf.get_i16().unwrap(), -2);
        assert_eq!(buf.get_i32().unwrap(), 0x0102_0304);
        assert_eq!(buf.get_i64().unwrap(), -1);
        assert_eq!(buf.get_f32().unwrap(), 1.5);
        assert_eq!(buf.get_f64().unwrap(), -0.25);
    }

    #[test]
    fn put_past_limit_overflows() {
        let mut buf = ByteBuffer::with_capacity(3);
        let err = buf.put_i32(7).unwrap_err();
        assert_eq!(
            err,
            BufferError::Overflow {
                needed: 4,
                remaining: 3
            }
        );
        assert_eq!(buf.position(), 0);
    }

    #[test]
    fn get_past_limit_underflows() {
        let mut buf = ByteBuffer::with_capacity(8);
        buf.set_limit(2).unwrap();
        assert!(matches!(
            buf.get_i32(),
            Err(BufferError::Underflow { needed: 4, .. })
        ));
    }

    #[test]
    fn absolute_int_access_keeps_position() {
        let mut buf = ByteBuffer::with_capacity(8);
        buf.put_i32(0).unwrap();
        buf.put_i32(9).unwrap();
        buf.put_i32_at(0, 42).unwrap();
        assert_eq!(buf.position(), 8);
        assert_eq!(buf.get_i32_at(0).unwrap(), 42);
        assert!(buf.put_i32_at(6, 1).is_err());
    }

    #[test]
    fn limit_clamps_position() {
        let mut buf = ByteBuffer::with_capacity(16);
        buf.set_position(10).unwrap();
        buf.set_limit(4).unwrap();
        assert_eq!(buf.position(), 4);
        assert!(buf.set_limit(17).is_err());
        assert!(buf.set_position(5).is_err());
    }

    #[test]
    fn grow_preserves_content() {
        let mut buf = ByteBuffer::with_capacity(4);
        buf.put_slice(b"abcd").unwrap();
        buf.grow(16);
        assert_eq!(buf.capacity(), 16);
        assert_eq!(buf.limit(), 16);
        assert_eq!(buf.position(), 4);
        assert_eq!(&buf.as_slice()[..4], b"abcd");
        buf.put_slice(b"ef").unwrap();
        assert_eq!(&buf.as_slice()[..6], b"abcdef");
    }

    #[test]
    fn get_slice_and_advance() {
        let mut buf = ByteBuffer::with_capacity(6);
        buf.put_slice(b"hello!").unwrap();
        buf.set_position(1).unwrap();
        buf.advance(1).unwrap();
        let mut out = [0u8; 3];
        buf.get_slice(&mut out).unwrap();
        assert_eq!(&out, b"llo");
        assert_eq!(buf.remaining_slice(), b"!");
        assert!(buf.advance(2).is_err());
    }
}
