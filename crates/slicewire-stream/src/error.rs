use slicewire_buffer::BufferError;

use crate::exception::UserException;

/// Errors that can occur while marshaling or unmarshaling a stream.
///
/// Every variant terminates processing of the current message. None of them
/// is retried by the stream itself.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// A decoded length or element count is negative.
    #[error("negative size {0}")]
    NegativeSize(i32),

    /// A read would run past the end of the data, or a referenced type ID or
    /// object index does not exist.
    #[error("unmarshal out of bounds: {0}")]
    UnmarshalOutOfBounds(String),

    /// The message would grow past the configured maximum size.
    #[error("message size {requested} exceeds maximum {max}")]
    MemoryLimit { requested: usize, max: usize },

    /// The encapsulation was encoded with a version this implementation
    /// cannot decode.
    #[error("unsupported encoding {bad_major}.{bad_minor} (supported {major}.{minor})")]
    UnsupportedEncoding {
        bad_major: u8,
        bad_minor: u8,
        major: u8,
        minor: u8,
    },

    /// The declared encapsulation size does not match the data consumed.
    #[error("encapsulation error: {0}")]
    Encapsulation(String),

    /// No factory could construct an instance of the type, or a received
    /// instance is not of the type its reference expects.
    #[error("no object factory for type {type_id}")]
    NoObjectFactory { type_id: String },

    /// None of the exception type IDs in a received chain is known.
    #[error("unknown user exception: {0}")]
    UnknownUserException(String),

    /// A user exception decoded from the stream.
    #[error("user exception {}", .0.exception_id())]
    User(Box<dyn UserException>),

    /// A factory is already registered under this type ID.
    #[error("{kind} factory already registered for {type_id}")]
    AlreadyRegistered { kind: &'static str, type_id: String },

    /// No factory is registered under this type ID.
    #[error("no {kind} factory registered for {type_id}")]
    NotRegistered { kind: &'static str, type_id: String },

    /// The stream was driven in a way the encoding does not allow.
    #[error("marshal error: {0}")]
    Marshal(String),
}

impl From<BufferError> for StreamError {
    fn from(err: BufferError) -> Self {
        StreamError::UnmarshalOutOfBounds(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
