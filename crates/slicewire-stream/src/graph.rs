//! Object graph marshaling.
//!
//! References are written as negative indices; bodies are written later, in
//! waves, by [`Stream::write_pending_objects`]:
//!
//! ```text
//! wave := size(n) { i32(index) type-id slice* }^n
//! pending := wave* size(0)
//! ```
//!
//! A body may reference instances not yet written, which then go into the
//! next wave, so cyclic graphs are flushed without recursion.

use std::rc::Rc;
use std::sync::Arc;

use tracing::warn;

use crate::error::{Result, StreamError};
use crate::object::{BaseObject, ObjectPtr, Patcher};
use crate::protocol::BASE_OBJECT_TYPE_ID;
use crate::stream::Stream;
use crate::trace::{trace_slicing, SliceKind};

/// Identity of a shared instance: the address of its allocation.
///
/// Only valid while the instance is kept alive, which the write tables do by
/// holding a handle next to every key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ObjectKey(usize);

impl ObjectKey {
    pub(crate) fn of(v: &ObjectPtr) -> Self {
        ObjectKey(Rc::as_ptr(v) as *const () as usize)
    }
}

impl Stream {
    /// Write a reference to `v`, or a null reference.
    ///
    /// The instance body is not written here. Each distinct instance is
    /// assigned an index once per encapsulation; further references reuse it.
    pub fn write_object(&mut self, v: Option<&ObjectPtr>) -> Result<()> {
        let Some(v) = v else {
            return self.write_int(0);
        };
        let key = ObjectKey::of(v);
        let tables = self.write_tables();
        let known = tables
            .to_be_marshaled
            .get(&key)
            .or_else(|| tables.marshaled.get(&key))
            .map(|(index, _)| *index);
        let index = match known {
            Some(index) => index,
            None => {
                tables.write_index += 1;
                let index = tables.write_index;
                tables.to_be_marshaled.insert(key, (index, Rc::clone(v)));
                index
            }
        };
        self.write_int(-index)
    }

    /// Write the bodies of every instance referenced so far, wave by wave,
    /// then the terminating empty wave.
    pub fn write_pending_objects(&mut self) -> Result<()> {
        loop {
            let mut wave: Vec<_> = self
                .write_tables()
                .to_be_marshaled
                .iter()
                .map(|(key, (index, v))| (*key, *index, Rc::clone(v)))
                .collect();
            if wave.is_empty() {
                break;
            }
            wave.sort_unstable_by_key(|(_, index, _)| *index);

            self.write_size(wave.len())?;
            for (key, index, v) in &wave {
                self.write_tables()
                    .marshaled
                    .insert(*key, (*index, Rc::clone(v)));
                self.write_instance(v, *index)?;
            }

            let tables = self.write_tables();
            for (key, _, _) in &wave {
                tables.to_be_marshaled.remove(key);
            }
        }
        self.write_size(0)
    }

    fn write_instance(&mut self, v: &ObjectPtr, index: i32) -> Result<()> {
        self.write_int(index)?;
        if let Err(err) = v.pre_marshal() {
            warn!(type_id = v.object_id(), error = %err, "pre_marshal hook failed");
        }
        v.write(self)
    }

    /// Read an instance reference and hand the instance to `patcher` once it
    /// is available. A null reference is delivered immediately.
    pub fn read_object(&mut self, patcher: Box<dyn Patcher>) -> Result<()> {
        self.read_object_impl(Some(patcher))
    }

    fn read_object_impl(&mut self, patcher: Option<Box<dyn Patcher>>) -> Result<()> {
        let index = self.read_int()?;

        if index == 0 {
            if let Some(mut patcher) = patcher {
                patcher
                    .patch(None)
                    .map_err(|_| StreamError::NoObjectFactory {
                        type_id: patcher.expected_type().to_string(),
                    })?;
            }
            return Ok(());
        }

        if index < 0 {
            let Some(patcher) = patcher else {
                return Err(StreamError::UnmarshalOutOfBounds(format!(
                    "reference {index} where an instance was expected"
                )));
            };
            let index = index.checked_neg().ok_or_else(|| {
                StreamError::UnmarshalOutOfBounds(format!("invalid instance index {index}"))
            })?;
            self.read_tables()
                .patch_map
                .entry(index)
                .or_default()
                .push_back(patcher);
            return self.patch_references(index);
        }

        let tables = self.read_tables();
        if tables.unmarshaled.contains_key(&index) {
            return Err(StreamError::UnmarshalOutOfBounds(format!(
                "instance {index} received twice"
            )));
        }
        if let Some(patcher) = patcher {
            tables.patch_map.entry(index).or_default().push_back(patcher);
        }

        let v = loop {
            let id = self.read_type_id()?;
            if let Some(v) = self.create_object(&id) {
                break v;
            }
            if !self.slice_objects {
                return Err(StreamError::NoObjectFactory { type_id: id });
            }
            self.note_sliced(SliceKind::Class, &id);
            self.skip_slice()?;
        };

        self.read_tables()
            .unmarshaled
            .insert(index, Rc::clone(&v));
        self.object_list
            .get_or_insert_with(Vec::new)
            .push(Rc::clone(&v));

        v.read(self, false)?;
        self.patch_references(index)
    }

    /// Resolve a type ID to a fresh instance: exact factory, then the default
    /// factory, then the root type, then the static catalogue.
    fn create_object(&self, id: &str) -> Option<ObjectPtr> {
        let registry = Arc::clone(self.ctx.registry());
        if let Some(v) = registry
            .find_object_factory(id)
            .and_then(|factory| factory.create(id))
        {
            return Some(v);
        }
        if let Some(v) = registry
            .find_object_factory("")
            .and_then(|factory| factory.create(id))
        {
            return Some(v);
        }
        if id == BASE_OBJECT_TYPE_ID {
            return Some(Rc::new(BaseObject));
        }
        registry
            .load_object_factory(id)
            .and_then(|factory| factory.create(id))
    }

    /// Deliver instance `index` to every patcher waiting for it, in the order
    /// they were queued. Does nothing until the instance has been read.
    fn patch_references(&mut self, index: i32) -> Result<()> {
        let tables = self.read_tables();
        let Some(v) = tables.unmarshaled.get(&index).cloned() else {
            return Ok(());
        };
        let Some(patchers) = tables.patch_map.remove(&index) else {
            return Ok(());
        };
        for mut patcher in patchers {
            patcher
                .patch(Some(Rc::clone(&v)))
                .map_err(|_| StreamError::NoObjectFactory {
                    type_id: patcher.expected_type().to_string(),
                })?;
        }
        Ok(())
    }

    /// Read the instance bodies written by
    /// [`write_pending_objects`](Stream::write_pending_objects), then run
    /// every read instance's `post_unmarshal` hook once, in read order.
    pub fn read_pending_objects(&mut self) -> Result<()> {
        loop {
            let n = self.read_size()?;
            if n == 0 {
                break;
            }
            for _ in 0..n {
                self.read_object_impl(None)?;
            }
        }

        if let Some(index) = self.read_tables().patch_map.keys().min().copied() {
            return Err(StreamError::UnmarshalOutOfBounds(format!(
                "no instance received for index {index}"
            )));
        }

        let mut objects = self.object_list.take().unwrap_or_default();
        for v in &objects {
            if let Err(err) = v.post_unmarshal() {
                warn!(type_id = v.object_id(), error = %err, "post_unmarshal hook failed");
            }
        }
        objects.clear();
        self.object_list = Some(objects);
        Ok(())
    }

    pub(crate) fn note_sliced(&self, kind: SliceKind, type_id: &str) {
        let config = self.ctx.config();
        if config.trace_slicing {
            trace_slicing(kind, type_id, &config.slicing_category);
        }
        if let Some(observer) = self.ctx.slicing_observer() {
            observer.slice_skipped(kind, type_id, &config.slicing_category);
        }
    }
}
