use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::exit::CliResult;
#[cfg(not(unix))]
use crate::exit::{CliError, FAILURE};
use crate::output::OutputFormat;

pub mod inspect;
#[cfg(unix)]
pub mod throughput;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show version information.
    Version(VersionArgs),
    /// Decode the encapsulation headers of a captured message.
    Inspect(InspectArgs),
    /// Measure encode, transfer and decode throughput over a socket pair.
    Throughput(ThroughputArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Version(args) => version::run(args),
        Command::Inspect(args) => inspect::run(args, format),
        #[cfg(unix)]
        Command::Throughput(args) => throughput::run(args, format),
        #[cfg(not(unix))]
        Command::Throughput(_) => Err(CliError::new(
            FAILURE,
            "throughput needs Unix domain sockets",
        )),
    }
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// File holding one or more back-to-back encapsulations.
    pub path: PathBuf,
    /// Skip each body and walk every encapsulation in the file.
    #[arg(long)]
    pub skip: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PayloadKind {
    /// Byte sequences.
    Byte,
    /// String sequences.
    String,
    /// Sequences of (string, double) structs.
    Struct,
    /// Every kind above, one after the other.
    All,
}

#[derive(Args, Debug)]
pub struct ThroughputArgs {
    /// Payload to send.
    #[arg(long, default_value = "all")]
    pub kind: PayloadKind,
    /// Elements per sequence. Defaults to 500000 bytes or 50000 strings/structs.
    #[arg(long)]
    pub size: Option<usize>,
    /// Messages sent per payload kind.
    #[arg(long, default_value = "100")]
    pub repetitions: usize,
}
