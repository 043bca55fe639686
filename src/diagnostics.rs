use std::fmt;
use std::sync::Mutex;

use serde::Serialize;

/// The series a ticket was dropped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Series {
    Ingest,
    CumulativeFlow,
    LeadTime,
    WorkItemAge,
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Series::Ingest => "ingest",
            Series::CumulativeFlow => "cumulative flow",
            Series::LeadTime => "lead time",
            Series::WorkItemAge => "work item age",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Delivered no later than it started, or delivered with no earlier stamp.
    NonPositiveLeadTime { lead_time: f64 },
    /// `state` is stamped before `predecessor`.
    OutOfOrderTimestamps { predecessor: String, state: String },
    NonPositiveAge { age: i64 },
    NoTimestamps,
    UnparseableTimestamp { state: String, value: String },
    MissingId,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NonPositiveLeadTime { lead_time } => {
                write!(f, "non-positive lead time ({lead_time:.2} days)")
            }
            SkipReason::OutOfOrderTimestamps { predecessor, state } => {
                write!(f, "'{state}' is stamped before '{predecessor}'")
            }
            SkipReason::NonPositiveAge { age } => write!(f, "non-positive age ({age} days)"),
            SkipReason::NoTimestamps => f.write_str("no state timestamps"),
            SkipReason::UnparseableTimestamp { state, value } => {
                write!(f, "unparseable timestamp {value:?} for '{state}'")
            }
            SkipReason::MissingId => f.write_str("missing work id"),
        }
    }
}

/// A ticket that was left out of (or partially read into) a series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub ticket_id: String,
    pub series: Series,
    pub reason: SkipReason,
}

impl Diagnostic {
    pub fn new(ticket_id: impl Into<String>, series: Series, reason: SkipReason) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            series,
            reason,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ticket {}: {}", self.series, self.ticket_id, self.reason)
    }
}

/// Receives a callback for every ticket the engine skips.
pub trait DiagnosticSink {
    fn on_ticket_skipped(&self, diagnostic: &Diagnostic);
}

/// Writes each diagnostic as a `log::warn!` line.
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn on_ticket_skipped(&self, diagnostic: &Diagnostic) {
        log::warn!("Skipping {diagnostic}");
    }
}

/// A no-op sink that silently drops diagnostics.
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn on_ticket_skipped(&self, _diagnostic: &Diagnostic) {}
}

/// Keeps every diagnostic so the caller can inspect or report them.
#[derive(Debug, Default)]
pub struct CollectingSink {
    collected: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain what has been collected so far.
    pub fn take(&self) -> Vec<Diagnostic> {
        let mut guard = self.collected.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *guard)
    }

    pub fn len(&self) -> usize {
        self.collected.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for CollectingSink {
    fn on_ticket_skipped(&self, diagnostic: &Diagnostic) {
        log::debug!("Collected {diagnostic}");
        self.collected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(diagnostic.clone());
    }
}
