//! Transceivers for slicewire streams.
//!
//! A [`Transceiver`] moves the bytes a [`slicewire_stream::Stream`] has
//! prepared across a connection, and fills a stream with bytes received
//! from one. Blocking, timeouts and partial I/O are handled here; the stream
//! itself never performs I/O.
//!
//! [`StreamTransceiver`] works over any blocking `Read + Write` connection.
//! With the `async` feature, [`AsyncStreamTransceiver`] does the same over
//! tokio's `AsyncRead + AsyncWrite`.

pub mod config;
pub mod connection;
pub mod error;
pub mod transceiver;

#[cfg(feature = "async")]
pub mod async_io;

pub use config::TransceiverConfig;
pub use connection::Connection;
pub use error::{Result, TransportError};
pub use transceiver::{StreamTransceiver, Transceiver};

#[cfg(feature = "async")]
pub use async_io::AsyncStreamTransceiver;
