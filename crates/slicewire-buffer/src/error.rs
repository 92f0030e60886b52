/// Errors raised by [`ByteBuffer`](crate::ByteBuffer) accessors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// A put would run past the buffer's limit.
    #[error("buffer overflow ({needed} bytes needed, {remaining} remaining)")]
    Overflow { needed: usize, remaining: usize },

    /// A get would run past the buffer's limit.
    #[error("buffer underflow ({needed} bytes needed, {remaining} remaining)")]
    Underflow { needed: usize, remaining: usize },

    /// The requested position lies beyond the current limit.
    #[error("invalid position {position} (limit {limit})")]
    InvalidPosition { position: usize, limit: usize },

    /// The requested limit lies beyond the buffer's capacity.
    #[error("invalid limit {limit} (capacity {capacity})")]
    InvalidLimit { limit: usize, capacity: usize },
}

pub type Result<T> = std::result::Result<T, BufferError>;
