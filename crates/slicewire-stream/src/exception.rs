//! User exceptions.
//!
//! ```text
//! exception := bool(uses_classes) { string(type-id) slice }* string("") [pending]
//! ```
//!
//! Slices are written most-derived first. A receiver skips the slices of
//! types it does not know and raises the first one it does.

use std::fmt;

use crate::error::{Result, StreamError};
use crate::object::AsAny;
use crate::stream::Stream;
use crate::trace::SliceKind;

/// An application-defined exception carried by value.
pub trait UserException: AsAny + fmt::Debug + fmt::Display {
    /// Type ID of the most-derived exception type.
    fn exception_id(&self) -> &str;

    /// Whether any slice references class instances.
    fn uses_classes(&self) -> bool {
        false
    }

    /// Write every slice, each preceded by its type ID as a plain string.
    fn write(&self, os: &mut Stream) -> Result<()>;

    /// Read every slice. When `read_id` is false the most-derived type ID
    /// has already been consumed.
    fn read(&mut self, is: &mut Stream, read_id: bool) -> Result<()>;
}

impl dyn UserException {
    pub fn downcast_ref<T: UserException>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl Stream {
    pub fn write_user_exception(&mut self, v: &dyn UserException) -> Result<()> {
        let uses_classes = v.uses_classes();
        self.write_bool(uses_classes)?;
        v.write(self)?;
        self.write_string("")?;
        if uses_classes {
            self.write_pending_objects()?;
        }
        Ok(())
    }

    /// Decode a user exception written by
    /// [`write_user_exception`](Stream::write_user_exception).
    ///
    /// Returns the first slice whose type is known, with the remaining
    /// slices skipped. Fails with [`StreamError::UnknownUserException`] if
    /// no slice is known.
    pub fn read_user_exception(&mut self) -> Result<Box<dyn UserException>> {
        let uses_classes = self.read_bool()?;
        let registry = std::sync::Arc::clone(self.ctx.registry());

        let mut id = self.read_string()?;
        while !id.is_empty() {
            let factory = registry
                .find_exception_factory(&id)
                .or_else(|| registry.load_exception_factory(&id));
            match factory {
                Some(factory) => {
                    let mut ex = factory.create();
                    ex.read(self, false)?;
                    self.skip_exception_slices()?;
                    if uses_classes {
                        self.read_pending_objects()?;
                    }
                    return Ok(ex);
                }
                None => {
                    self.note_sliced(SliceKind::Exception, &id);
                    self.skip_slice()?;
                    id = self.read_string()?;
                }
            }
        }

        Err(StreamError::UnknownUserException(
            "sender and receiver disagree about the exception type IDs in use".to_string(),
        ))
    }

    /// Decode a user exception and fail with it.
    ///
    /// Always returns an error: [`StreamError::User`] carrying the decoded
    /// exception, or the error that prevented decoding it.
    pub fn throw_exception(&mut self) -> Result<()> {
        let ex = self.read_user_exception()?;
        Err(StreamError::User(ex))
    }

    /// Skip base slices a known exception type did not read, up to the end
    /// of the chain.
    fn skip_exception_slices(&mut self) -> Result<()> {
        loop {
            let id = self.read_string()?;
            if id.is_empty() {
                return Ok(());
            }
            self.skip_slice()?;
        }
    }
}
