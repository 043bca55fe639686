pub mod config;
pub mod date_util;
pub mod diagnostics;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod window;

use chrono::NaiveDate;
use serde::Serialize;

pub use config::{EngineOptions, MovingRangeMode, OutOfOrderPolicy, TieBreak};
pub use date_util::EpochSeconds;
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticSink, LogSink, NoopSink, Series, SkipReason};
pub use error::{Error, Result};
pub use ingest::{IngestFilter, ServiceData};
pub use metrics::lead_time::DEFAULT_HISTOGRAM_BINS;
pub use metrics::{
    AsOfMetrics, CfdRecord, ControlLimits, HistogramBin, LeadTimeRecord, LeadTimeSummary, MovingRangeRecord,
    PercentileLines, StateCycleTime, WorkItemAge, XmrLimits,
};
pub use model::{Ticket, Workflow};
pub use window::{BaselineWindow, Period};

/// Main entry point: a workflow and the options every computation uses.
///
/// The engine holds no per-call state. Each method takes its inputs by
/// reference and returns a fresh result, so one engine can serve any number
/// of views or threads.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlowEngine {
    workflow: Workflow,
    options: EngineOptions,
}

/// Headline numbers for one ticket set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowReport {
    pub tickets: usize,
    pub delivered: usize,
    pub first_day: Option<NaiveDate>,
    pub last_day: Option<NaiveDate>,
    /// Work in progress on the last day of the cumulative flow.
    pub wip: Option<u64>,
    pub lead_time: LeadTimeSummary,
    /// Limits over the trailing reporting range, when it holds enough data.
    pub limits: Option<XmrLimits>,
}

impl FlowEngine {
    pub fn new(workflow: Workflow, options: EngineOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { workflow, options })
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    // ── Series builders ────────────────────────────────────────────

    /// Daily cumulative flow; skipped tickets are logged.
    pub fn cumulative_flow(&self, tickets: &[Ticket]) -> Vec<CfdRecord> {
        self.cumulative_flow_with(tickets, &LogSink)
    }

    pub fn cumulative_flow_with(&self, tickets: &[Ticket], sink: &dyn DiagnosticSink) -> Vec<CfdRecord> {
        metrics::cfd::build(tickets, &self.workflow, &self.options, sink)
    }

    /// Per-ticket lead times sorted by delivery; skipped tickets are logged.
    pub fn lead_times(&self, tickets: &[Ticket]) -> Vec<LeadTimeRecord> {
        self.lead_times_with(tickets, &LogSink)
    }

    pub fn lead_times_with(&self, tickets: &[Ticket], sink: &dyn DiagnosticSink) -> Vec<LeadTimeRecord> {
        metrics::lead_time::build(tickets, &self.workflow, &self.options, sink)
    }

    /// Moving ranges in the configured mode.
    pub fn moving_ranges(&self, lead_times: &[LeadTimeRecord]) -> Result<Vec<MovingRangeRecord>> {
        metrics::moving_range::build(lead_times, self.options.moving_range_mode)
    }

    pub fn lead_time_summary(&self, lead_times: &[LeadTimeRecord]) -> LeadTimeSummary {
        metrics::lead_time::summarize(lead_times)
    }

    /// Lead times in `bins` equal-width bins.
    pub fn lead_time_histogram(&self, lead_times: &[LeadTimeRecord], bins: usize) -> Vec<HistogramBin> {
        metrics::lead_time::histogram(lead_times, bins)
    }

    /// Age of every ticket at `as_of`; skipped tickets are logged.
    pub fn work_item_ages(&self, tickets: &[Ticket], as_of: EpochSeconds) -> Vec<WorkItemAge> {
        self.work_item_ages_with(tickets, as_of, &LogSink)
    }

    pub fn work_item_ages_with(
        &self,
        tickets: &[Ticket],
        as_of: EpochSeconds,
        sink: &dyn DiagnosticSink,
    ) -> Vec<WorkItemAge> {
        metrics::age::build(tickets, &self.workflow, as_of, sink)
    }

    // ── Limits ─────────────────────────────────────────────────────

    /// Individuals-chart limits, with moving ranges in the configured mode.
    pub fn individuals_limits(&self, lead_times: &[LeadTimeRecord], window: &BaselineWindow) -> Result<ControlLimits> {
        let ranges = self.moving_ranges(lead_times)?;
        metrics::control::individuals_limits_with(lead_times, &ranges, window)
    }

    pub fn moving_range_limits(
        &self,
        moving_ranges: &[MovingRangeRecord],
        window: &BaselineWindow,
    ) -> Result<ControlLimits> {
        metrics::control::moving_range_limits(moving_ranges, window)
    }

    pub fn xmr_limits(&self, lead_times: &[LeadTimeRecord], window: &BaselineWindow) -> Result<XmrLimits> {
        metrics::control::xmr_limits(lead_times, self.options.moving_range_mode, window)
    }

    // ── Point queries ──────────────────────────────────────────────

    /// Metrics at one point of `cfd`. `None` means no data at that point.
    pub fn as_of(&self, cfd: &[CfdRecord], date: NaiveDate, cumulative_count: u64) -> Option<AsOfMetrics> {
        metrics::as_of::resolve(cfd, &self.workflow, date, cumulative_count)
    }

    /// Headline numbers, with limits over the default trailing reporting
    /// range when at least two deliveries fall inside it.
    pub fn report(&self, tickets: &[Ticket], sink: &dyn DiagnosticSink) -> FlowReport {
        let cfd = self.cumulative_flow_with(tickets, sink);
        let lead_times = self.lead_times_with(tickets, sink);

        let first_day = cfd.first().map(|r| r.date);
        let last_day = cfd.last().map(|r| r.date);
        let wip = cfd.last().map(|r| {
            r.reached(&self.workflow, 0)
                .saturating_sub(r.reached(&self.workflow, self.workflow.terminal_index()))
        });

        let limits = match (first_day, last_day) {
            (Some(first), Some(last)) => {
                match window::reporting_range(first, last, window::DEFAULT_REPORTING_RANGE_DAYS)
                    .and_then(|w| self.xmr_limits(&lead_times, &w))
                {
                    Ok(limits) => Some(limits),
                    Err(e) => {
                        log::debug!("No limits for report: {e}");
                        None
                    }
                }
            }
            _ => None,
        };

        FlowReport {
            tickets: tickets.len(),
            delivered: lead_times.len(),
            first_day,
            last_day,
            wip,
            lead_time: self.lead_time_summary(&lead_times),
            limits,
        }
    }
}
