//! Versioned binary marshaling for slicewire.
//!
//! This is the core of slicewire. A [`Stream`] encodes and decodes:
//! - fixed-width primitives, sizes, strings, blobs and sequences
//! - encapsulations: nested, length-prefixed sections tagged with an
//!   encoding version
//! - class instance graphs, by reference, including cycles
//! - user exceptions
//!
//! Receivers tolerate newer senders: instance and exception state is split
//! into one slice per type level, and slices of unknown types are skipped.

pub mod config;
pub mod encaps;
pub mod error;
pub mod exception;
pub mod graph;
pub mod object;
pub mod protocol;
pub mod registry;
pub mod stream;
pub mod trace;

pub use config::{StreamConfig, StreamContext, DEFAULT_INITIAL_CAPACITY, DEFAULT_MAX_MESSAGE_SIZE};
pub use error::{Result, StreamError};
pub use exception::UserException;
pub use object::{
    read_base_slice, write_base_slice, AnySlot, AsAny, BaseObject, HookError, Object, ObjectPtr,
    ObjectSlot, PatchError, Patcher,
};
pub use protocol::{BASE_OBJECT_TYPE_ID, ENCAPS_HEADER_SIZE, ENCODING_MAJOR, ENCODING_MINOR};
pub use registry::{
    ExceptionConstructor, FactoryRegistry, ObjectConstructor, ObjectFactory, UserExceptionFactory,
};
pub use stream::Stream;
pub use trace::{SliceKind, SlicingObserver, SLICING_TARGET};
