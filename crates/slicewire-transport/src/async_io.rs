use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

use slicewire_stream::{Stream, StreamError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::config::TransceiverConfig;
use crate::error::{Result, TransportError};
use crate::transceiver::{declared_length, expect_length};

/// Transceiver over a tokio connection.
///
/// Mirrors [`StreamTransceiver`](crate::StreamTransceiver): the configured
/// timeouts bound each individual read or write call.
pub struct AsyncStreamTransceiver<T> {
    inner: T,
    config: TransceiverConfig,
    closed: bool,
}

impl<T> AsyncStreamTransceiver<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, TransceiverConfig::default())
    }

    pub fn with_config(inner: T, config: TransceiverConfig) -> Self {
        Self {
            inner,
            config,
            closed: false,
        }
    }

    /// Send the stream's message, from the start up to its size.
    pub async fn write(&mut self, stream: &mut Stream) -> Result<()> {
        self.ensure_open()?;
        let timeout = self.config.write_timeout;
        let buf = stream.prepare_write()?;
        let total = buf.remaining();

        while buf.has_remaining() {
            let written = deadline(timeout, self.inner.write(buf.remaining_slice())).await?;
            match written {
                Ok(0) => return Err(TransportError::ConnectionLost),
                Ok(n) => {
                    buf.advance(n).map_err(StreamError::from)?;
                    trace!("sent {} of {} bytes", total - buf.remaining(), total);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        deadline(timeout, self.inner.flush()).await??;
        Ok(())
    }

    /// Fill the stream from its current position up to its limit.
    pub async fn read(&mut self, stream: &mut Stream) -> Result<()> {
        self.ensure_open()?;
        let timeout = self.config.read_timeout;
        let buf = stream.prepare_read();
        let total = buf.remaining();

        while buf.has_remaining() {
            let received = deadline(timeout, self.inner.read(buf.remaining_slice_mut())).await?;
            match received {
                Ok(0) => return Err(TransportError::ConnectionLost),
                Ok(n) => {
                    buf.advance(n).map_err(StreamError::from)?;
                    trace!("received {} of {} bytes", total - buf.remaining(), total);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(())
    }

    /// Receive one encapsulation into `stream`, positioned at its start.
    pub async fn receive_encapsulation(&mut self, stream: &mut Stream) -> Result<()> {
        expect_length(stream)?;
        self.read(stream).await?;
        let total = declared_length(stream)?;
        stream.resize(total, true)?;
        stream.set_pos(4)?;
        self.read(stream).await?;
        stream.set_pos(0)?;
        Ok(())
    }

    /// Stop sending. Pending data still reaches the peer.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.ensure_open()?;
        match self.inner.shutdown().await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    /// Shut down and refuse further I/O.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.shutdown().await;
        self.closed = true;
        debug!("async transceiver closed");
        result
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &TransceiverConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(TransportError::Shutdown);
        }
        Ok(())
    }
}

impl<T> std::fmt::Debug for AsyncStreamTransceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncStreamTransceiver")
            .field("config", &self.config)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Run `op`, failing with [`TransportError::Timeout`] once `limit` elapses.
async fn deadline<F, R>(limit: Option<Duration>, op: F) -> Result<std::io::Result<R>>
where
    F: Future<Output = std::io::Result<R>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, op)
            .await
            .map_err(|_| TransportError::Timeout),
        None => Ok(op.await),
    }
}
