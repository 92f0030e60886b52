use slicewire_stream::StreamError;

/// Errors that can occur while moving a stream across a connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred on the underlying connection.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection before the message was complete.
    #[error("connection lost")]
    ConnectionLost,

    /// A read or write did not complete within the configured timeout.
    #[error("operation timed out")]
    Timeout,

    /// The stream rejected the received framing.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The transceiver has been closed.
    #[error("transceiver closed")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
