use std::fmt;
use std::io;

use slicewire_stream::StreamError;
use slicewire_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

/// Decode failures mean the input is malformed; everything else is a bug in
/// how the command drives the stream.
pub fn stream_error(context: &str, err: StreamError) -> CliError {
    let code = match err {
        StreamError::NegativeSize(_)
        | StreamError::UnmarshalOutOfBounds(_)
        | StreamError::MemoryLimit { .. }
        | StreamError::UnsupportedEncoding { .. }
        | StreamError::Encapsulation(_)
        | StreamError::NoObjectFactory { .. }
        | StreamError::UnknownUserException(_)
        | StreamError::User(_) => DATA_INVALID,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        TransportError::Stream(err) => stream_error(context, err),
        other @ TransportError::Timeout => CliError::new(TIMEOUT, format!("{context}: {other}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_input_is_data_invalid() {
        let err = stream_error("decode", StreamError::NegativeSize(-1));
        assert_eq!(err.code, DATA_INVALID);
        assert_eq!(err.to_string(), "decode: negative size -1");
    }

    #[test]
    fn transport_errors_map_through() {
        assert_eq!(
            transport_error("recv", TransportError::Timeout).code,
            TIMEOUT
        );
        assert_eq!(
            transport_error("recv", TransportError::ConnectionLost).code,
            TRANSPORT_ERROR
        );
        let nested = TransportError::Stream(StreamError::Encapsulation("short".into()));
        assert_eq!(transport_error("recv", nested).code, DATA_INVALID);
        let missing = io::Error::from(io::ErrorKind::NotFound);
        assert_eq!(transport_error("open", missing.into()).code, FAILURE);
    }
}
