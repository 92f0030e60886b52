use clap::ValueEnum;
use slicewire_stream::SLICING_TARGET;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// `level` everywhere; slicing events at least at debug when `trace_slicing`.
fn log_filter(level: LogLevel, trace_slicing: bool) -> Targets {
    let level = LevelFilter::from(level);
    let filter = Targets::new().with_default(level);
    if trace_slicing {
        filter.with_target(SLICING_TARGET, level.max(LevelFilter::DEBUG))
    } else {
        filter
    }
}

/// Send diagnostics to stderr; stdout carries command output only.
pub fn init_logging(format: LogFormat, level: LogLevel, trace_slicing: bool) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(LevelFilter::TRACE)
        .with_ansi(false)
        .with_target(true);
    let filter = log_filter(level, trace_slicing);

    let _ = match format {
        LogFormat::Text => builder.finish().with(filter).try_init(),
        LogFormat::Json => builder.json().finish().with(filter).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn slicing_target_follows_flag() {
        let quiet = log_filter(LogLevel::Warn, false);
        assert!(!quiet.would_enable(SLICING_TARGET, &Level::DEBUG));
        assert!(quiet.would_enable(SLICING_TARGET, &Level::WARN));

        let tracing = log_filter(LogLevel::Warn, true);
        assert!(tracing.would_enable(SLICING_TARGET, &Level::DEBUG));
        assert!(!tracing.would_enable("slicewire_transport", &Level::DEBUG));
    }

    #[test]
    fn trace_level_is_not_lowered() {
        let filter = log_filter(LogLevel::Trace, true);
        assert!(filter.would_enable(SLICING_TARGET, &Level::TRACE));
    }
}
