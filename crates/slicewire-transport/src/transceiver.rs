use std::io::ErrorKind;

use slicewire_stream::{Stream, StreamError, ENCAPS_HEADER_SIZE};
use tracing::{debug, trace};

use crate::config::TransceiverConfig;
use crate::connection::Connection;
use crate::error::{Result, TransportError};

/// Moves stream buffers across a connection.
///
/// The transceiver alone decides how to block, time out and retry partial
/// I/O. A failed call leaves the stream in an unspecified position; callers
/// discard it.
pub trait Transceiver {
    /// Send the stream's message, from the start up to its size.
    fn write(&mut self, stream: &mut Stream) -> Result<()>;

    /// Fill the stream from its current position up to its limit.
    fn read(&mut self, stream: &mut Stream) -> Result<()>;

    /// Stop sending. Pending data still reaches the peer.
    fn shutdown(&mut self) -> Result<()>;

    /// Shut down and refuse further I/O.
    fn close(&mut self) -> Result<()>;

    /// Receive one encapsulation: its 4-byte length first, then the rest.
    ///
    /// On success the stream holds exactly the encapsulation and is
    /// positioned at its start, ready for `start_read_encaps`.
    fn receive_encapsulation(&mut self, stream: &mut Stream) -> Result<()> {
        expect_length(stream)?;
        self.read(stream)?;
        let total = declared_length(stream)?;
        stream.resize(total, true)?;
        stream.set_pos(4)?;
        self.read(stream)?;
        stream.set_pos(0)?;
        Ok(())
    }
}

/// Reset `stream` to receive the 4-byte length of an encapsulation.
pub(crate) fn expect_length(stream: &mut Stream) -> Result<()> {
    stream.reset();
    stream.resize(4, true)?;
    stream.set_pos(0)?;
    Ok(())
}

/// Validate the length received by [`expect_length`].
pub(crate) fn declared_length(stream: &mut Stream) -> Result<usize> {
    stream.set_pos(0)?;
    let declared = stream.read_int()?;
    let total = usize::try_from(declared).map_err(|_| StreamError::NegativeSize(declared))?;
    if total < ENCAPS_HEADER_SIZE {
        return Err(StreamError::Encapsulation(format!(
            "declared size {total} is smaller than the header"
        ))
        .into());
    }
    Ok(total)
}

/// Blocking transceiver over any [`Connection`].
///
/// Interrupted calls are retried. A write that would block is retried unless
/// a write timeout is configured, in which case it reports
/// [`TransportError::Timeout`]; reads always report it.
pub struct StreamTransceiver<T> {
    inner: T,
    config: TransceiverConfig,
    closed: bool,
}

impl<T: Connection> StreamTransceiver<T> {
    /// Wrap a connection, leaving its timeouts as they are.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            config: TransceiverConfig::default(),
            closed: false,
        }
    }

    /// Wrap a connection and apply the configured timeouts to it.
    pub fn with_config(inner: T, config: TransceiverConfig) -> Result<Self> {
        inner.apply_timeouts(&config)?;
        Ok(Self {
            inner,
            config,
            closed: false,
        })
    }

    /// Borrow the underlying connection.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying connection.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the transceiver and return the connection.
    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &TransceiverConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(TransportError::Shutdown);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

impl<T: Connection> Transceiver for StreamTransceiver<T> {
    fn write(&mut self, stream: &mut Stream) -> Result<()> {
        self.ensure_open()?;
        let timeout_set = self.config.write_timeout.is_some();
        let buf = stream.prepare_write()?;
        let total = buf.remaining();

        while buf.has_remaining() {
            match self.inner.write(buf.remaining_slice()) {
                Ok(0) => return Err(TransportError::ConnectionLost),
                Ok(n) => {
                    buf.advance(n).map_err(StreamError::from)?;
                    trace!("sent {} of {} bytes", total - buf.remaining(), total);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_timeout(err.kind()) && timeout_set => {
                    return Err(TransportError::Timeout)
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        self.flush()
    }

    fn read(&mut self, stream: &mut Stream) -> Result<()> {
        self.ensure_open()?;
        let buf = stream.prepare_read();
        let total = buf.remaining();

        while buf.has_remaining() {
            match self.inner.read(buf.remaining_slice_mut()) {
                Ok(0) => return Err(TransportError::ConnectionLost),
                Ok(n) => {
                    buf.advance(n).map_err(StreamError::from)?;
                    trace!("received {} of {} bytes", total - buf.remaining(), total);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_timeout(err.kind()) => return Err(TransportError::Timeout),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.flush()?;
        match self.inner.shutdown_write() {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.shutdown();
        self.closed = true;
        debug!("transceiver closed");
        result
    }
}

impl<T> std::fmt::Debug for StreamTransceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransceiver")
            .field("config", &self.config)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

fn is_timeout(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
