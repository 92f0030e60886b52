use std::sync::Arc;

use serde::Serialize;
use slicewire_stream::{Stream, StreamConfig, StreamContext, DEFAULT_MAX_MESSAGE_SIZE};
use tracing::debug;

use crate::cmd::InspectArgs;
use crate::exit::{io_error, stream_error, CliResult, SUCCESS};
use crate::output::{print_report, OutputFormat, Report};

#[derive(Debug, Serialize)]
struct EncapsulationHeader {
    offset: usize,
    size: usize,
    encoding: String,
    payload_size: usize,
}

#[derive(Debug, Serialize)]
struct InspectOutput {
    path: String,
    total_bytes: usize,
    encapsulations: Vec<EncapsulationHeader>,
    trailing_bytes: usize,
}

impl Report for InspectOutput {
    fn header(&self) -> Vec<&'static str> {
        vec!["OFFSET", "SIZE", "ENCODING", "PAYLOAD"]
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.encapsulations
            .iter()
            .map(|e| {
                vec![
                    e.offset.to_string(),
                    e.size.to_string(),
                    e.encoding.clone(),
                    e.payload_size.to_string(),
                ]
            })
            .collect()
    }
}

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let context = format!("read {}", args.path.display());
    let data = std::fs::read(&args.path).map_err(|err| io_error(&context, err))?;

    let output = InspectOutput {
        path: args.path.display().to_string(),
        total_bytes: data.len(),
        trailing_bytes: 0,
        encapsulations: Vec::new(),
    };
    let output = walk(&data, args.skip, output)?;

    print_report(&output, format);
    Ok(SUCCESS)
}

fn walk(data: &[u8], skip: bool, mut output: InspectOutput) -> CliResult<InspectOutput> {
    let config = StreamConfig {
        max_message_size: data.len().max(DEFAULT_MAX_MESSAGE_SIZE),
        ..StreamConfig::default()
    };
    let mut is = Stream::from_bytes(Arc::new(StreamContext::with_config(config)), data)
        .map_err(|err| stream_error("load message", err))?;

    loop {
        let offset = is.pos();
        let context = format!("encapsulation at offset {offset}");
        is.start_read_encaps()
            .map_err(|err| stream_error(&context, err))?;
        let payload_size = is
            .get_read_encaps_size()
            .map_err(|err| stream_error(&context, err))?;
        let (major, minor) = is.read_encaps_encoding().unwrap_or_default();
        is.end_read_encaps()
            .map_err(|err| stream_error(&context, err))?;

        debug!(offset, payload_size, "decoded encapsulation header");
        output.encapsulations.push(EncapsulationHeader {
            offset,
            size: is.pos() - offset,
            encoding: format!("{major}.{minor}"),
            payload_size,
        });

        if !skip || is.pos() >= is.size() {
            break;
        }
    }

    output.trailing_bytes = is.size() - is.pos();
    Ok(output)
}
