use std::time::Duration;

/// Timeouts applied to connections that support them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransceiverConfig {
    /// Read timeout. `None` blocks indefinitely.
    pub read_timeout: Option<Duration>,
    /// Write timeout. `None` blocks indefinitely.
    pub write_timeout: Option<Duration>,
}
