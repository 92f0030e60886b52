use std::fmt;

use tracing::debug;

/// What kind of value a skipped slice belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SliceKind {
    Class,
    Exception,
}

impl SliceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SliceKind::Class => "class",
            SliceKind::Exception => "exception",
        }
    }
}

impl fmt::Display for SliceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives a notification for every slice a stream skips.
pub trait SlicingObserver: Send + Sync {
    fn slice_skipped(&self, kind: SliceKind, type_id: &str, category: &str);
}

impl<F> SlicingObserver for F
where
    F: Fn(SliceKind, &str, &str) + Send + Sync,
{
    fn slice_skipped(&self, kind: SliceKind, type_id: &str, category: &str) {
        self(kind, type_id, category)
    }
}

/// Target of slicing trace events, for log filters.
pub const SLICING_TARGET: &str = "slicewire::slicing";

/// Emit the trace event for a skipped slice.
pub fn trace_slicing(kind: SliceKind, type_id: &str, category: &str) {
    debug!(
        target: SLICING_TARGET,
        kind = kind.as_str(),
        type_id,
        category,
        "unknown {kind} type, slicing to base type"
    );
}
