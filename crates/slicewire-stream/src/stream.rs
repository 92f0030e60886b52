use std::sync::Arc;

use slicewire_buffer::ByteBuffer;

use crate::config::StreamContext;
use crate::encaps::{ReadEncaps, WriteEncaps};
use crate::error::{Result, StreamError};
use crate::object::ObjectPtr;
use crate::protocol::{MAX_SHORT_SIZE, SIZE_ESCAPE};

/// Marshaling engine over one byte buffer.
///
/// A stream is written front to back by the sender and read front to back by
/// the receiver. Its buffer comes from the context's pool and goes back to it
/// when the stream is dropped; [`reset`](Stream::reset) makes a stream ready
/// for the next message without giving the buffer up.
///
/// A stream is used by one message at a time and is not `Send`: instances
/// it decodes are shared through `Rc`.
pub struct Stream {
    pub(crate) ctx: Arc<StreamContext>,
    pub(crate) buf: ByteBuffer,
    /// Logical size of the message; the buffer may be larger.
    pub(crate) size: usize,
    pub(crate) max_message_size: usize,

    pub(crate) read_encaps: Vec<ReadEncaps>,
    pub(crate) read_encaps_cache: Vec<ReadEncaps>,
    pub(crate) write_encaps: Vec<WriteEncaps>,
    pub(crate) write_encaps_cache: Vec<WriteEncaps>,

    /// Positions just past each open write slice's length placeholder.
    pub(crate) write_slices: Vec<usize>,
    /// End offsets of each open read slice.
    pub(crate) read_slices: Vec<usize>,

    pub(crate) slice_objects: bool,
    /// Instances read in the current scope, in the order they were read.
    pub(crate) object_list: Option<Vec<ObjectPtr>>,
    string_bytes: Vec<u8>,
}

impl Stream {
    /// Create an empty stream drawing its buffer from `ctx`.
    pub fn new(ctx: Arc<StreamContext>) -> Self {
        let config = ctx.config();
        let buf = ctx.pool().allocate(config.initial_capacity);
        let max_message_size = config.max_message_size;
        let slice_objects = config.slice_objects;
        Self {
            ctx,
            buf,
            size: 0,
            max_message_size,
            read_encaps: Vec::new(),
            read_encaps_cache: Vec::new(),
            write_encaps: Vec::new(),
            write_encaps_cache: Vec::new(),
            write_slices: Vec::new(),
            read_slices: Vec::new(),
            slice_objects,
            object_list: None,
            string_bytes: Vec::new(),
        }
    }

    /// Create a stream positioned at the start of `data`, ready for reading.
    pub fn from_bytes(ctx: Arc<StreamContext>, data: &[u8]) -> Result<Self> {
        let mut stream = Self::new(ctx);
        stream.resize(data.len(), true)?;
        stream.buf.set_position(0)?;
        stream.buf.put_slice(data)?;
        stream.buf.set_position(0)?;
        Ok(stream)
    }

    pub fn context(&self) -> &Arc<StreamContext> {
        &self.ctx
    }

    /// Make the stream reusable for another message.
    ///
    /// The buffer is kept, open encapsulations go back to the free lists and
    /// the list of instances awaiting post-processing is cleared.
    pub fn reset(&mut self) {
        self.size = 0;
        self.buf.clear();
        while !self.read_encaps.is_empty() {
            self.pop_read_encaps();
        }
        while !self.write_encaps.is_empty() {
            self.pop_write_encaps();
        }
        self.read_slices.clear();
        self.write_slices.clear();
        if let Some(list) = self.object_list.as_mut() {
            list.clear();
        }
    }

    /// Exchange contents with another stream of the same context.
    pub fn swap(&mut self, other: &mut Stream) {
        debug_assert!(Arc::ptr_eq(&self.ctx, &other.ctx));
        std::mem::swap(&mut self.buf, &mut other.buf);
        std::mem::swap(&mut self.size, &mut other.size);
        std::mem::swap(&mut self.read_encaps, &mut other.read_encaps);
        std::mem::swap(&mut self.read_encaps_cache, &mut other.read_encaps_cache);
        std::mem::swap(&mut self.write_encaps, &mut other.write_encaps);
        std::mem::swap(&mut self.write_encaps_cache, &mut other.write_encaps_cache);
        std::mem::swap(&mut self.read_slices, &mut other.read_slices);
        std::mem::swap(&mut self.write_slices, &mut other.write_slices);
        std::mem::swap(&mut self.object_list, &mut other.object_list);
    }

    /// Set the logical size to `total` and move the position there.
    ///
    /// A stream about to receive `total` bytes is resized with `reading`
    /// set, which bounds the buffer at `total`; otherwise the buffer stays
    /// open up to its capacity for further writes.
    pub fn resize(&mut self, total: usize, reading: bool) -> Result<()> {
        if total > self.max_message_size {
            return Err(StreamError::MemoryLimit {
                requested: total,
                max: self.max_message_size,
            });
        }
        if total > self.buf.capacity() {
            self.grow_to(total);
        }
        if reading {
            self.buf.set_limit(total)?;
        } else {
            let capacity = self.buf.capacity();
            self.buf.set_limit(capacity)?;
        }
        self.buf.set_position(total)?;
        self.size = total;
        Ok(())
    }

    /// The buffer, positioned for a transceiver to receive into it.
    pub fn prepare_read(&mut self) -> &mut ByteBuffer {
        &mut self.buf
    }

    /// The buffer, rewound and bounded to the message for sending.
    pub fn prepare_write(&mut self) -> Result<&mut ByteBuffer> {
        self.buf.set_limit(self.size)?;
        self.buf.set_position(0)?;
        Ok(&mut self.buf)
    }

    pub fn pos(&self) -> usize {
        self.buf.position()
    }

    pub fn set_pos(&mut self, pos: usize) -> Result<()> {
        if pos > self.size {
            return Err(StreamError::UnmarshalOutOfBounds(format!(
                "position {pos} past end of message ({} bytes)",
                self.size
            )));
        }
        self.buf.set_position(pos)?;
        Ok(())
    }

    /// Logical size of the message in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The message bytes written or received so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf.storage()[..self.size]
    }

    /// Toggle slicing of unknown class types for this stream.
    pub fn slice_objects(&mut self, enabled: bool) {
        self.slice_objects = enabled;
    }

    /// Make room for `n` more bytes at the current position.
    fn expand(&mut self, n: usize) -> Result<()> {
        let needed = self.buf.position() + n;
        if needed <= self.size {
            return Ok(());
        }
        if needed > self.max_message_size {
            return Err(StreamError::MemoryLimit {
                requested: needed,
                max: self.max_message_size,
            });
        }
        if needed > self.buf.capacity() {
            self.grow_to(needed);
        }
        if needed > self.buf.limit() {
            let capacity = self.buf.capacity();
            self.buf.set_limit(capacity)?;
        }
        self.size = needed;
        Ok(())
    }

    /// Reallocate to at least `needed` bytes: double the capacity, or exactly
    /// `needed` if doubling is not enough, never beyond the message limit.
    fn grow_to(&mut self, needed: usize) {
        let doubled = self.buf.capacity().saturating_mul(2);
        let new_capacity = doubled.min(self.max_message_size).max(needed);
        let buf = std::mem::take(&mut self.buf);
        self.buf = self.ctx.pool().reallocate(buf, new_capacity);
    }

    fn check_readable(&self, n: usize) -> Result<()> {
        let pos = self.buf.position();
        if n > self.size.saturating_sub(pos) {
            return Err(StreamError::UnmarshalOutOfBounds(format!(
                "{n} bytes needed at offset {pos}, message is {} bytes",
                self.size
            )));
        }
        Ok(())
    }

    pub fn write_size(&mut self, v: usize) -> Result<()> {
        if v > MAX_SHORT_SIZE {
            let v = i32::try_from(v)
                .map_err(|_| StreamError::Marshal(format!("size {v} does not fit the encoding")))?;
            self.expand(5)?;
            self.buf.put_u8(SIZE_ESCAPE)?;
            self.buf.put_i32(v)?;
        } else {
            self.expand(1)?;
            self.buf.put_u8(v as u8)?;
        }
        Ok(())
    }

    pub fn read_size(&mut self) -> Result<usize> {
        let b = self.read_byte()?;
        if b == SIZE_ESCAPE {
            let v = self.read_int()?;
            if v < 0 {
                return Err(StreamError::NegativeSize(v));
            }
            Ok(v as usize)
        } else {
            Ok(usize::from(b))
        }
    }

    /// Read a size and check that at least `size * min_element_bytes` bytes
    /// remain, so a corrupt count cannot trigger a huge allocation.
    pub fn read_checked_size(&mut self, min_element_bytes: usize) -> Result<usize> {
        let sz = self.read_size()?;
        self.check_readable(sz.saturating_mul(min_element_bytes))?;
        Ok(sz)
    }

    /// Write raw bytes with no size prefix.
    pub fn write_blob(&mut self, v: &[u8]) -> Result<()> {
        self.expand(v.len())?;
        self.buf.put_slice(v)?;
        Ok(())
    }

    /// Read `len` raw bytes with no size prefix.
    pub fn read_blob(&mut self, len: usize) -> Result<Vec<u8>> {
        self.check_readable(len)?;
        let mut v = vec![0u8; len];
        self.buf.get_slice(&mut v)?;
        Ok(v)
    }

    pub fn write_byte(&mut self, v: u8) -> Result<()> {
        self.expand(1)?;
        self.buf.put_u8(v)?;
        Ok(())
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        self.check_readable(1)?;
        Ok(self.buf.get_u8()?)
    }

    /// Write a byte sequence. An absent sequence is written as an empty one.
    pub fn write_byte_seq(&mut self, v: &[u8]) -> Result<()> {
        self.write_size(v.len())?;
        self.write_blob(v)
    }

    pub fn read_byte_seq(&mut self) -> Result<Vec<u8>> {
        let sz = self.read_checked_size(1)?;
        self.read_blob(sz)
    }

    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.write_byte(u8::from(v))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_byte()? != 0)
    }

    pub fn write_bool_seq(&mut self, v: &[bool]) -> Result<()> {
        self.write_size(v.len())?;
        self.expand(v.len())?;
        for b in v {
            self.buf.put_u8(u8::from(*b))?;
        }
        Ok(())
    }

    pub fn read_bool_seq(&mut self) -> Result<Vec<bool>> {
        let sz = self.read_checked_size(1)?;
        let mut v = Vec::with_capacity(sz);
        for _ in 0..sz {
            v.push(self.buf.get_u8()? != 0);
        }
        Ok(v)
    }

    pub fn write_short(&mut self, v: i16) -> Result<()> {
        self.expand(2)?;
        self.buf.put_i16(v)?;
        Ok(())
    }

    pub fn read_short(&mut self) -> Result<i16> {
        self.check_readable(2)?;
        Ok(self.buf.get_i16()?)
    }

    pub fn write_short_seq(&mut self, v: &[i16]) -> Result<()> {
        self.write_size(v.len())?;
        self.expand(v.len() * 2)?;
        for x in v {
            self.buf.put_i16(*x)?;
        }
        Ok(())
    }

    pub fn read_short_seq(&mut self) -> Result<Vec<i16>> {
        let sz = self.read_checked_size(2)?;
        let mut v = Vec::with_capacity(sz);
        for _ in 0..sz {
            v.push(self.buf.get_i16()?);
        }
        Ok(v)
    }

    pub fn write_int(&mut self, v: i32) -> Result<()> {
        self.expand(4)?;
        self.buf.put_i32(v)?;
        Ok(())
    }

    pub fn read_int(&mut self) -> Result<i32> {
        self.check_readable(4)?;
        Ok(self.buf.get_i32()?)
    }

    pub fn write_int_seq(&mut self, v: &[i32]) -> Result<()> {
        self.write_size(v.len())?;
        self.expand(v.len() * 4)?;
        for x in v {
            self.buf.put_i32(*x)?;
        }
        Ok(())
    }

    pub fn read_int_seq(&mut self) -> Result<Vec<i32>> {
        let sz = self.read_checked_size(4)?;
        let mut v = Vec::with_capacity(sz);
        for _ in 0..sz {
            v.push(self.buf.get_i32()?);
        }
        Ok(v)
    }

    pub fn write_long(&mut self, v: i64) -> Result<()> {
        self.expand(8)?;
        self.buf.put_i64(v)?;
        Ok(())
    }

    pub fn read_long(&mut self) -> Result<i64> {
        self.check_readable(8)?;
        Ok(self.buf.get_i64()?)
    }

    pub fn write_long_seq(&mut self, v: &[i64]) -> Result<()> {
        self.write_size(v.len())?;
        self.expand(v.len() * 8)?;
        for x in v {
            self.buf.put_i64(*x)?;
        }
        Ok(())
    }

    pub fn read_long_seq(&mut self) -> Result<Vec<i64>> {
        let sz = self.read_checked_size(8)?;
        let mut v = Vec::with_capacity(sz);
        for _ in 0..sz {
            v.push(self.buf.get_i64()?);
        }
        Ok(v)
    }

    pub fn write_float(&mut self, v: f32) -> Result<()> {
        self.expand(4)?;
        self.buf.put_f32(v)?;
        Ok(())
    }

    pub fn read_float(&mut self) -> Result<f32> {
        self.check_readable(4)?;
        Ok(self.buf.get_f32()?)
    }

    pub fn write_float_seq(&mut self, v: &[f32]) -> Result<()> {
        self.write_size(v.len())?;
        self.expand(v.len() * 4)?;
        for x in v {
            self.buf.put_f32(*x)?;
        }
        Ok(())
    }

    pub fn read_float_seq(&mut self) -> Result<Vec<f32>> {
        let sz = self.read_checked_size(4)?;
        let mut v = Vec::with_capacity(sz);
        for _ in 0..sz {
            v.push(self.buf.get_f32()?);
        }
        Ok(v)
    }

    pub fn write_double(&mut self, v: f64) -> Result<()> {
        self.expand(8)?;
        self.buf.put_f64(v)?;
        Ok(())
    }

    pub fn read_double(&mut self) -> Result<f64> {
        self.check_readable(8)?;
        Ok(self.buf.get_f64()?)
    }

    pub fn write_double_seq(&mut self, v: &[f64]) -> Result<()> {
        self.write_size(v.len())?;
        self.expand(v.len() * 8)?;
        for x in v {
            self.buf.put_f64(*x)?;
        }
        Ok(())
    }

    pub fn read_double_seq(&mut self) -> Result<Vec<f64>> {
        let sz = self.read_checked_size(8)?;
        let mut v = Vec::with_capacity(sz);
        for _ in 0..sz {
            v.push(self.buf.get_f64()?);
        }
        Ok(v)
    }

    /// Write a UTF-8 string prefixed by its byte length.
    pub fn write_string(&mut self, v: &str) -> Result<()> {
        self.write_byte_seq(v.as_bytes())
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_checked_size(1)?;
        if len == 0 {
            return Ok(String::new());
        }
        if self.string_bytes.len() < len {
            self.string_bytes.resize(len, 0);
        }
        self.buf.get_slice(&mut self.string_bytes[..len])?;
        std::str::from_utf8(&self.string_bytes[..len])
            .map(str::to_owned)
            .map_err(|err| StreamError::Marshal(format!("string is not valid UTF-8: {err}")))
    }

    pub fn write_string_seq<S: AsRef<str>>(&mut self, v: &[S]) -> Result<()> {
        self.write_size(v.len())?;
        for s in v {
            self.write_string(s.as_ref())?;
        }
        Ok(())
    }

    pub fn read_string_seq(&mut self) -> Result<Vec<String>> {
        let sz = self.read_checked_size(1)?;
        let mut v = Vec::with_capacity(sz);
        for _ in 0..sz {
            v.push(self.read_string()?);
        }
        Ok(v)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.ctx.pool().reclaim(buf);
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("buf", &self.buf)
            .field("size", &self.size)
            .field("read_depth", &self.read_encaps.len())
            .field("write_depth", &self.write_encaps.len())
            .finish()
    }
}
