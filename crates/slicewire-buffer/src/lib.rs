//! Byte storage for the slicewire marshaling engine.
//!
//! This is the lowest layer of slicewire. It provides:
//! - [`ByteBuffer`], a fixed-capacity octet region addressed by position and
//!   limit, with little-endian accessors for fixed-width primitives
//! - [`BufferPool`], the allocate/reallocate/reclaim interface the stream
//!   layer draws its storage from, and [`PooledBufferPool`], a free-list
//!   implementation of it

pub mod buffer;
pub mod error;
pub mod pool;

pub use buffer::ByteBuffer;
pub use error::{BufferError, Result};
pub use pool::{BufferPool, PoolConfig, PooledBufferPool};
