use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use slicewire_stream::{Stream, StreamConfig, StreamContext};
use slicewire_transport::{
    StreamTransceiver, Transceiver, TransceiverConfig, TransportError,
};
use tracing::{debug, info};

use crate::cmd::{PayloadKind, ThroughputArgs};
use crate::exit::{io_error, stream_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_report, OutputFormat, Report};

const BYTE_SEQ_SIZE: usize = 500_000;
const STRING_SEQ_SIZE: usize = 50_000;
const STRUCT_SEQ_SIZE: usize = 50_000;
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;
const IO_TIMEOUT: Duration = Duration::from_secs(30);

const SAMPLE_STRING: &str = "hello";
const SAMPLE_DOUBLE: f64 = 2.5;

#[derive(Debug, Serialize)]
struct KindResult {
    kind: &'static str,
    elements: usize,
    message_bytes: usize,
    repetitions: usize,
    elapsed_ms: f64,
    mb_per_sec: f64,
}

#[derive(Debug, Serialize)]
struct ThroughputOutput {
    results: Vec<KindResult>,
}

impl Report for ThroughputOutput {
    fn header(&self) -> Vec<&'static str> {
        vec!["KIND", "ELEMENTS", "BYTES", "REPETITIONS", "MS", "MB/S"]
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.results
            .iter()
            .map(|r| {
                vec![
                    r.kind.to_string(),
                    r.elements.to_string(),
                    r.message_bytes.to_string(),
                    r.repetitions.to_string(),
                    format!("{:.1}", r.elapsed_ms),
                    format!("{:.2}", r.mb_per_sec),
                ]
            })
            .collect()
    }
}

impl PayloadKind {
    fn expand(self) -> Vec<PayloadKind> {
        match self {
            PayloadKind::All => vec![PayloadKind::Byte, PayloadKind::String, PayloadKind::Struct],
            kind => vec![kind],
        }
    }

    fn name(self) -> &'static str {
        match self {
            PayloadKind::Byte => "byte",
            PayloadKind::String => "string",
            PayloadKind::Struct => "struct",
            PayloadKind::All => "all",
        }
    }

    fn tag(self) -> u8 {
        match self {
            PayloadKind::Byte => 1,
            PayloadKind::String => 2,
            PayloadKind::Struct => 3,
            PayloadKind::All => 0,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(PayloadKind::Byte),
            2 => Some(PayloadKind::String),
            3 => Some(PayloadKind::Struct),
            _ => None,
        }
    }

    fn default_size(self) -> usize {
        match self {
            PayloadKind::Byte => BYTE_SEQ_SIZE,
            PayloadKind::String => STRING_SEQ_SIZE,
            PayloadKind::Struct | PayloadKind::All => STRUCT_SEQ_SIZE,
        }
    }
}

pub fn run(args: ThroughputArgs, format: OutputFormat) -> CliResult<i32> {
    let (client, server) = UnixStream::pair().map_err(|err| io_error("socket pair", err))?;
    let config = TransceiverConfig {
        read_timeout: Some(IO_TIMEOUT),
        write_timeout: Some(IO_TIMEOUT),
    };

    // Decode errors can carry a user exception, which is not `Send`.
    let echo = thread::spawn(move || {
        serve(server, config).map_err(|err| transport_error("receiver", err))
    });

    let mut results = Vec::new();
    let mut outcome = StreamTransceiver::with_config(client, config)
        .map_err(|err| transport_error("configure client", err))
        .and_then(|mut tx| {
            let ctx = context();
            for kind in args.kind.expand() {
                let size = args.size.unwrap_or_else(|| kind.default_size());
                results.push(measure(&mut tx, &ctx, kind, size, args.repetitions)?);
            }
            tx.close().map_err(|err| transport_error("close", err))
        });

    let served = echo
        .join()
        .map_err(|_| CliError::new(INTERNAL, "receiver thread panicked"))?;
    if outcome.is_ok() {
        outcome = served;
    }
    outcome?;

    print_report(&ThroughputOutput { results }, format);
    Ok(SUCCESS)
}

fn context() -> Arc<StreamContext> {
    Arc::new(StreamContext::with_config(StreamConfig {
        max_message_size: MAX_MESSAGE_SIZE,
        ..StreamConfig::default()
    }))
}

/// Send `repetitions` messages of one kind, waiting for each acknowledgement.
fn measure(
    tx: &mut StreamTransceiver<UnixStream>,
    ctx: &Arc<StreamContext>,
    kind: PayloadKind,
    size: usize,
    repetitions: usize,
) -> CliResult<KindResult> {
    let mut os = Stream::new(Arc::clone(ctx));
    let mut ack = Stream::new(Arc::clone(ctx));
    let bytes = vec![0u8; size];
    let strings = vec![SAMPLE_STRING; size];

    let started = Instant::now();
    let mut message_bytes = 0;
    for _ in 0..repetitions {
        os.reset();
        encode(&mut os, kind, &bytes, &strings).map_err(|err| stream_error("encode", err))?;
        message_bytes = os.size();
        tx.write(&mut os)
            .map_err(|err| transport_error("send", err))?;

        tx.receive_encapsulation(&mut ack)
            .map_err(|err| transport_error("receive acknowledgement", err))?;
        let received = read_ack(&mut ack).map_err(|err| stream_error("acknowledgement", err))?;
        if received != size {
            return Err(CliError::new(
                INTERNAL,
                format!("receiver decoded {received} elements, sent {size}"),
            ));
        }
    }
    let elapsed = started.elapsed();

    let total = (message_bytes * repetitions) as f64;
    let secs = elapsed.as_secs_f64();
    let mb_per_sec = if secs > 0.0 { total / secs / 1_000_000.0 } else { 0.0 };
    info!(kind = kind.name(), repetitions, mb_per_sec, "throughput measured");

    Ok(KindResult {
        kind: kind.name(),
        elements: size,
        message_bytes,
        repetitions,
        elapsed_ms: secs * 1000.0,
        mb_per_sec,
    })
}

fn encode(
    os: &mut Stream,
    kind: PayloadKind,
    bytes: &[u8],
    strings: &[&str],
) -> slicewire_stream::Result<()> {
    os.start_write_encaps()?;
    os.write_byte(kind.tag())?;
    match kind {
        PayloadKind::Byte => os.write_byte_seq(bytes)?,
        PayloadKind::String => os.write_string_seq(strings)?,
        PayloadKind::Struct | PayloadKind::All => {
            os.write_size(strings.len())?;
            for s in strings {
                os.write_string(s)?;
                os.write_double(SAMPLE_DOUBLE)?;
            }
        }
    }
    os.end_write_encaps()
}

/// Decode one message and return how many elements it held.
fn decode(is: &mut Stream) -> Result<usize, TransportError> {
    is.start_read_encaps()?;
    let tag = is.read_byte()?;
    let count = match PayloadKind::from_tag(tag) {
        Some(PayloadKind::Byte) => is.read_byte_seq()?.len(),
        Some(PayloadKind::String) => is.read_string_seq()?.len(),
        Some(_) => {
            // Each element is at least an empty string and a double.
            let n = is.read_checked_size(9)?;
            for _ in 0..n {
                is.read_string()?;
                is.read_double()?;
            }
            n
        }
        None => {
            return Err(slicewire_stream::StreamError::Marshal(format!(
                "unknown payload tag {tag}"
            ))
            .into())
        }
    };
    is.check_read_encaps()?;
    is.end_read_encaps()?;
    Ok(count)
}

fn read_ack(ack: &mut Stream) -> slicewire_stream::Result<usize> {
    ack.start_read_encaps()?;
    let n = ack.read_size()?;
    ack.end_read_encaps()?;
    Ok(n)
}

/// Receive messages until the peer hangs up, acknowledging each one.
fn serve(socket: UnixStream, config: TransceiverConfig) -> Result<(), TransportError> {
    let mut rx = StreamTransceiver::with_config(socket, config)?;
    let ctx = context();
    let mut is = Stream::new(Arc::clone(&ctx));
    let mut ack = Stream::new(ctx);

    loop {
        match rx.receive_encapsulation(&mut is) {
            Ok(()) => {}
            Err(TransportError::ConnectionLost) => {
                debug!("sender hung up");
                return Ok(());
            }
            Err(err) => return Err(err),
        }
        let count = decode(&mut is)?;

        ack.reset();
        ack.start_write_encaps()?;
        ack.write_size(count)?;
        ack.end_write_encaps()?;
        rx.write(&mut ack)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_roundtrips_through_decode() {
        let ctx = context();
        let bytes = vec![7u8; 300];
        let strings = vec![SAMPLE_STRING; 300];
        for kind in PayloadKind::All.expand() {
            let mut os = Stream::new(Arc::clone(&ctx));
            encode(&mut os, kind, &bytes, &strings).unwrap();
            let mut is = Stream::from_bytes(Arc::clone(&ctx), os.as_bytes()).unwrap();
            assert_eq!(decode(&mut is).unwrap(), 300, "{}", kind.name());
        }
    }

    #[test]
    fn small_run_reports_each_kind() {
        let (client, server) = UnixStream::pair().unwrap();
        let config = TransceiverConfig::default();
        let echo = thread::spawn(move || serve(server, config).map_err(|err| err.to_string()));

        let ctx = context();
        let mut tx = StreamTransceiver::new(client);
        let result = measure(&mut tx, &ctx, PayloadKind::Struct, 100, 5).unwrap();
        tx.close().unwrap();
        echo.join().unwrap().unwrap();

        assert_eq!(result.kind, "struct");
        assert_eq!(result.repetitions, 5);
        // header + tag + size byte + 100 * (1 + 5 + 8)
        assert_eq!(result.message_bytes, 6 + 1 + 1 + 100 * 14);
    }
}
