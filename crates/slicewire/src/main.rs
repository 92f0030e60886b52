mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "slicewire", version, about = "Inspect and benchmark slicewire streams")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "warn",
        env = "SLICEWIRE_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    /// Show slicing trace events at debug level, regardless of --log-level.
    #[arg(long, global = true)]
    trace_slicing: bool,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level, cli.trace_slicing);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::PayloadKind;

    #[test]
    fn parses_inspect_subcommand() {
        let cli = Cli::try_parse_from(["slicewire", "inspect", "/tmp/msg.bin", "--skip"])
            .expect("inspect args should parse");
        let Command::Inspect(args) = cli.command else {
            panic!("expected inspect");
        };
        assert!(args.skip);
    }

    #[test]
    fn trace_slicing_is_global() {
        let cli = Cli::try_parse_from(["slicewire", "version", "--trace-slicing"])
            .expect("global flag should parse after the subcommand");
        assert!(cli.trace_slicing);
        let cli = Cli::try_parse_from(["slicewire", "version"]).expect("version should parse");
        assert!(!cli.trace_slicing);
    }

    #[test]
    fn parses_throughput_subcommand() {
        let cli = Cli::try_parse_from([
            "slicewire",
            "--format",
            "json",
            "throughput",
            "--kind",
            "string",
            "--repetitions",
            "3",
        ])
        .expect("throughput args should parse");
        let Command::Throughput(args) = cli.command else {
            panic!("expected throughput");
        };
        assert_eq!(args.kind, PayloadKind::String);
        assert_eq!(args.repetitions, 3);
    }

    #[test]
    fn rejects_unknown_payload_kind() {
        let err = Cli::try_parse_from(["slicewire", "throughput", "--kind", "float"])
            .expect_err("unknown kind should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
