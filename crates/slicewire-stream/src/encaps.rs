//! Encapsulations, slices and type ID compression.
//!
//! An encapsulation is a versioned, length-prefixed section of a stream:
//!
//! ```text
//! +----------------+-------+-------+---------------------+
//! | length (i32le) | major | minor | payload ...         |
//! +----------------+-------+-------+---------------------+
//!   length counts itself, both version bytes and the payload
//! ```
//!
//! Encapsulations nest. Each open one owns the object and type ID tables
//! used inside it; popped contexts go to a free list and are reused by the
//! next encapsulation instead of being reallocated.

use std::collections::{HashMap, VecDeque};

use crate::error::{Result, StreamError};
use crate::graph::ObjectKey;
use crate::object::{ObjectPtr, Patcher};
use crate::protocol::{ENCAPS_HEADER_SIZE, ENCODING_MAJOR, ENCODING_MINOR, SLICE_HEADER_SIZE};
use crate::stream::Stream;

/// Object and type ID bookkeeping on the write side of one encapsulation.
#[derive(Default)]
pub(crate) struct WriteTables {
    pub(crate) write_index: i32,
    /// Instances discovered but not yet written.
    pub(crate) to_be_marshaled: HashMap<ObjectKey, (i32, ObjectPtr)>,
    /// Instances whose body has been written.
    pub(crate) marshaled: HashMap<ObjectKey, (i32, ObjectPtr)>,
    pub(crate) type_id_index: usize,
    pub(crate) type_ids: HashMap<String, usize>,
}

impl WriteTables {
    fn clear(&mut self) {
        self.write_index = 0;
        self.to_be_marshaled.clear();
        self.marshaled.clear();
        self.type_id_index = 0;
        self.type_ids.clear();
    }
}

/// Object and type ID bookkeeping on the read side of one encapsulation.
#[derive(Default)]
pub(crate) struct ReadTables {
    pub(crate) unmarshaled: HashMap<i32, ObjectPtr>,
    /// Patchers waiting for the instance with a given index, in arrival order.
    pub(crate) patch_map: HashMap<i32, VecDeque<Box<dyn Patcher>>>,
    pub(crate) type_id_index: usize,
    pub(crate) type_ids: HashMap<usize, String>,
}

impl ReadTables {
    fn clear(&mut self) {
        self.unmarshaled.clear();
        self.patch_map.clear();
        self.type_id_index = 0;
        self.type_ids.clear();
    }
}

#[derive(Default)]
pub(crate) struct WriteEncaps {
    start: usize,
    /// Opened on demand by an object or type ID written outside any
    /// encapsulation. Has no header on the wire.
    implicit: bool,
    pub(crate) tables: Option<WriteTables>,
}

impl WriteEncaps {
    fn reset(&mut self, start: usize, implicit: bool) {
        self.start = start;
        self.implicit = implicit;
        self.release();
    }

    /// Drop every instance handle while keeping the tables' capacity.
    fn release(&mut self) {
        if let Some(tables) = self.tables.as_mut() {
            tables.clear();
        }
    }
}

#[derive(Default)]
pub(crate) struct ReadEncaps {
    start: usize,
    size: usize,
    encoding: (u8, u8),
    implicit: bool,
    pub(crate) tables: Option<ReadTables>,
}

impl ReadEncaps {
    fn reset(&mut self, start: usize, implicit: bool) {
        self.start = start;
        self.size = 0;
        self.encoding = (ENCODING_MAJOR, ENCODING_MINOR);
        self.implicit = implicit;
        self.release();
    }

    fn release(&mut self) {
        if let Some(tables) = self.tables.as_mut() {
            tables.clear();
        }
    }
}

impl Stream {
    fn push_write_encaps(&mut self, start: usize, implicit: bool) {
        let mut encaps = self.write_encaps_cache.pop().unwrap_or_default();
        encaps.reset(start, implicit);
        self.write_encaps.push(encaps);
    }

    fn push_read_encaps(&mut self, start: usize, implicit: bool) -> &mut ReadEncaps {
        let mut encaps = self.read_encaps_cache.pop().unwrap_or_default();
        encaps.reset(start, implicit);
        self.read_encaps.push(encaps);
        let last = self.read_encaps.len() - 1;
        &mut self.read_encaps[last]
    }

    /// Pop the innermost write context onto the free list, emptied.
    pub(crate) fn pop_write_encaps(&mut self) {
        if let Some(mut encaps) = self.write_encaps.pop() {
            encaps.release();
            self.write_encaps_cache.push(encaps);
        }
    }

    pub(crate) fn pop_read_encaps(&mut self) {
        if let Some(mut encaps) = self.read_encaps.pop() {
            encaps.release();
            self.read_encaps_cache.push(encaps);
        }
    }

    /// Open an encapsulation: a length placeholder and the encoding version.
    pub fn start_write_encaps(&mut self) -> Result<()> {
        let start = self.pos();
        self.write_int(0)?;
        self.write_byte(ENCODING_MAJOR)?;
        self.write_byte(ENCODING_MINOR)?;
        self.push_write_encaps(start, false);
        Ok(())
    }

    /// Close the innermost encapsulation, patching its length.
    pub fn end_write_encaps(&mut self) -> Result<()> {
        let start = match self.write_encaps.last() {
            Some(encaps) if !encaps.implicit => encaps.start,
            _ => {
                return Err(StreamError::Marshal(
                    "no encapsulation started for writing".to_string(),
                ))
            }
        };
        let len = self.pos().checked_sub(start).ok_or_else(|| {
            StreamError::Marshal(format!(
                "position {} is before the encapsulation started at {start}",
                self.pos()
            ))
        })?;
        let len = i32::try_from(len)
            .map_err(|_| StreamError::Marshal(format!("encapsulation of {len} bytes")))?;
        self.buf.put_i32_at(start, len)?;
        self.pop_write_encaps();
        Ok(())
    }

    /// Open an encapsulation for reading, validating its length and version.
    ///
    /// Nothing is opened when the header is rejected.
    pub fn start_read_encaps(&mut self) -> Result<()> {
        let start = self.pos();

        let size = self.read_int()?;
        if size < 0 {
            return Err(StreamError::NegativeSize(size));
        }
        let size = size as usize;
        if size < ENCAPS_HEADER_SIZE {
            return Err(StreamError::Encapsulation(format!(
                "declared size {size} is smaller than the header"
            )));
        }
        if size > self.size.saturating_sub(start) {
            return Err(StreamError::UnmarshalOutOfBounds(format!(
                "encapsulation of {size} bytes at offset {start}, message is {} bytes",
                self.size
            )));
        }

        let major = self.read_byte()?;
        let minor = self.read_byte()?;
        if major != ENCODING_MAJOR || minor > ENCODING_MINOR {
            return Err(StreamError::UnsupportedEncoding {
                bad_major: major,
                bad_minor: minor,
                major: ENCODING_MAJOR,
                minor: ENCODING_MINOR,
            });
        }

        let encaps = self.push_read_encaps(start, false);
        encaps.size = size;
        encaps.encoding = (major, minor);
        Ok(())
    }

    fn current_read_encaps(&self) -> Result<&ReadEncaps> {
        match self.read_encaps.last() {
            Some(encaps) if !encaps.implicit => Ok(encaps),
            _ => Err(StreamError::Encapsulation(
                "no encapsulation started for reading".to_string(),
            )),
        }
    }

    /// Close the innermost encapsulation, skipping whatever was not read.
    pub fn end_read_encaps(&mut self) -> Result<()> {
        let encaps = self.current_read_encaps()?;
        let end = encaps.start + encaps.size;
        self.set_pos(end)?;
        self.pop_read_encaps();
        Ok(())
    }

    /// Fail unless everything in the innermost encapsulation was consumed.
    pub fn check_read_encaps(&self) -> Result<()> {
        let encaps = self.current_read_encaps()?;
        let end = encaps.start + encaps.size;
        if self.pos() != end {
            return Err(StreamError::Encapsulation(format!(
                "position {} does not match encapsulation end {end}",
                self.pos()
            )));
        }
        Ok(())
    }

    /// Payload size of the innermost encapsulation, header excluded.
    pub fn get_read_encaps_size(&self) -> Result<usize> {
        let size = self.current_read_encaps()?.size;
        size.checked_sub(ENCAPS_HEADER_SIZE).ok_or_else(|| {
            StreamError::Encapsulation(format!("declared size {size} is smaller than the header"))
        })
    }

    /// Encoding version of the innermost encapsulation being read.
    pub fn read_encaps_encoding(&self) -> Option<(u8, u8)> {
        self.current_read_encaps().ok().map(|encaps| encaps.encoding)
    }

    /// Skip an entire encapsulation without interpreting it.
    pub fn skip_encaps(&mut self) -> Result<()> {
        let size = self.read_int()?;
        self.skip_framed(size)
    }

    /// Move past a frame whose 4-byte length has just been read.
    fn skip_framed(&mut self, size: i32) -> Result<()> {
        if size < 0 {
            return Err(StreamError::NegativeSize(size));
        }
        let size = size as usize;
        if size < SLICE_HEADER_SIZE {
            return Err(StreamError::UnmarshalOutOfBounds(format!(
                "frame size {size} is smaller than its length field"
            )));
        }
        let end = self.pos() + size - SLICE_HEADER_SIZE;
        self.set_pos(end)
    }

    /// Open a slice: a length placeholder patched by
    /// [`end_write_slice`](Stream::end_write_slice).
    pub fn start_write_slice(&mut self) -> Result<()> {
        self.write_int(0)?;
        self.write_slices.push(self.pos());
        Ok(())
    }

    pub fn end_write_slice(&mut self) -> Result<()> {
        let mark = self
            .write_slices
            .pop()
            .ok_or_else(|| StreamError::Marshal("no slice started for writing".to_string()))?;
        let len = self
            .pos()
            .checked_sub(mark)
            .ok_or_else(|| {
                StreamError::Marshal(format!(
                    "position {} is before the slice started at {mark}",
                    self.pos()
                ))
            })?
            + SLICE_HEADER_SIZE;
        let len = i32::try_from(len)
            .map_err(|_| StreamError::Marshal(format!("slice of {len} bytes")))?;
        self.buf.put_i32_at(mark - SLICE_HEADER_SIZE, len)?;
        Ok(())
    }

    pub fn start_read_slice(&mut self) -> Result<()> {
        let size = self.read_int()?;
        if size < 0 {
            return Err(StreamError::NegativeSize(size));
        }
        let size = size as usize;
        if size < SLICE_HEADER_SIZE {
            return Err(StreamError::UnmarshalOutOfBounds(format!(
                "slice size {size} is smaller than its length field"
            )));
        }
        let end = self.pos() + size - SLICE_HEADER_SIZE;
        if end > self.size {
            return Err(StreamError::UnmarshalOutOfBounds(format!(
                "slice ends at {end}, message is {} bytes",
                self.size
            )));
        }
        self.read_slices.push(end);
        Ok(())
    }

    /// Close the innermost slice. Fields a newer sender appended to the
    /// slice are skipped.
    pub fn end_read_slice(&mut self) -> Result<()> {
        let end = self
            .read_slices
            .pop()
            .ok_or_else(|| StreamError::Marshal("no slice started for reading".to_string()))?;
        if self.pos() > end {
            return Err(StreamError::UnmarshalOutOfBounds(format!(
                "read {} bytes past the end of the slice",
                self.pos() - end
            )));
        }
        self.set_pos(end)
    }

    /// Skip a slice whose type is not understood.
    pub fn skip_slice(&mut self) -> Result<()> {
        let size = self.read_int()?;
        self.skip_framed(size)
    }

    /// Write-side tables of the innermost encapsulation, opening an implicit
    /// one if none is open.
    pub(crate) fn write_tables(&mut self) -> &mut WriteTables {
        if self.write_encaps.is_empty() {
            let start = self.pos();
            self.push_write_encaps(start, true);
        }
        let last = self.write_encaps.len() - 1;
        self.write_encaps[last]
            .tables
            .get_or_insert_with(WriteTables::default)
    }

    pub(crate) fn read_tables(&mut self) -> &mut ReadTables {
        if self.read_encaps.is_empty() {
            let start = self.pos();
            self.push_read_encaps(start, true);
        }
        let last = self.read_encaps.len() - 1;
        self.read_encaps[last]
            .tables
            .get_or_insert_with(ReadTables::default)
    }

    /// Write a type ID, as a literal the first time it appears in the
    /// encapsulation and as an index afterwards.
    pub fn write_type_id(&mut self, id: &str) -> Result<()> {
        let tables = self.write_tables();
        match tables.type_ids.get(id).copied() {
            Some(index) => {
                self.write_bool(true)?;
                self.write_size(index)
            }
            None => {
                tables.type_id_index += 1;
                let index = tables.type_id_index;
                tables.type_ids.insert(id.to_string(), index);
                self.write_bool(false)?;
                self.write_string(id)
            }
        }
    }

    pub fn read_type_id(&mut self) -> Result<String> {
        if self.read_bool()? {
            let index = self.read_size()?;
            self.read_tables()
                .type_ids
                .get(&index)
                .cloned()
                .ok_or_else(|| {
                    StreamError::UnmarshalOutOfBounds(format!("missing type ID {index}"))
                })
        } else {
            let id = self.read_string()?;
            let tables = self.read_tables();
            tables.type_id_index += 1;
            tables.type_ids.insert(tables.type_id_index, id.clone());
            Ok(id)
        }
    }
}
