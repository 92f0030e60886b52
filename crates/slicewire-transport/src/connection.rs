use std::io::{Cursor, Read, Write};
use std::net::{Shutdown, TcpStream};

use crate::config::TransceiverConfig;

/// A blocking byte connection a [`StreamTransceiver`](crate::StreamTransceiver)
/// can drive.
///
/// The defaults suit in-memory connections, which have neither timeouts nor
/// a half-close.
pub trait Connection: Read + Write {
    /// Apply the configured read and write timeouts.
    fn apply_timeouts(&self, _config: &TransceiverConfig) -> std::io::Result<()> {
        Ok(())
    }

    /// Stop sending; the peer reads end-of-stream after pending data.
    fn shutdown_write(&self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
impl Connection for std::os::unix::net::UnixStream {
    fn apply_timeouts(&self, config: &TransceiverConfig) -> std::io::Result<()> {
        self.set_read_timeout(config.read_timeout)?;
        self.set_write_timeout(config.write_timeout)
    }

    fn shutdown_write(&self) -> std::io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

impl Connection for TcpStream {
    fn apply_timeouts(&self, config: &TransceiverConfig) -> std::io::Result<()> {
        self.set_read_timeout(config.read_timeout)?;
        self.set_write_timeout(config.write_timeout)
    }

    fn shutdown_write(&self) -> std::io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

impl Connection for Cursor<Vec<u8>> {}
