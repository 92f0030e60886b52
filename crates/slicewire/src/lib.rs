//! Versioned binary marshaling for RPC middleware.
//!
//! slicewire turns primitives, sequences, class instance graphs and user
//! exceptions into length-framed, versioned byte streams and back. Receivers
//! built against an older schema still decode messages from newer senders:
//! state is split into per-type slices, and slices of unknown types are
//! skipped.
//!
//! # Crate Structure
//!
//! - [`buffer`] — Position/limit byte buffers and the buffer pool
//! - [`stream`] — The marshaling engine: encapsulations, object graphs,
//!   type-id compression, user exceptions, factory registry
//! - [`transport`] — Transceivers moving streams across connections

/// Re-export buffer types.
pub mod buffer {
    pub use slicewire_buffer::*;
}

/// Re-export stream types.
pub mod stream {
    pub use slicewire_stream::*;
}

/// Re-export transport types.
pub mod transport {
    pub use slicewire_transport::*;
}
