use super::admit;
use super::types::{HistogramBin, LeadTimeRecord, LeadTimeSummary, PercentileLines};
use crate::config::{EngineOptions, TieBreak};
use crate::date_util::{day_of, days_between};
use crate::diagnostics::{Diagnostic, DiagnosticSink, Series, SkipReason};
use crate::model::{Ticket, Workflow};

/// Build the per-ticket lead-time series, sorted by delivery instant.
///
/// Lead time runs from the first stamped state to delivery, in exact
/// fractional days. Tickets delivered without any earlier stamp, or with a
/// non-positive lead time, are reported to `sink` and left out.
pub fn build(
    tickets: &[Ticket],
    workflow: &Workflow,
    options: &EngineOptions,
    sink: &dyn DiagnosticSink,
) -> Vec<LeadTimeRecord> {
    let offset = options.offset();
    let mut records: Vec<LeadTimeRecord> = Vec::new();

    for ticket in tickets {
        let Some(delivered_at) = ticket.delivered(workflow) else {
            continue;
        };
        if !admit(ticket, workflow, options, Series::LeadTime, sink) {
            continue;
        }
        let Some(delivered_date) = day_of(delivered_at, offset) else {
            sink.on_ticket_skipped(&Diagnostic::new(
                ticket.id.clone(),
                Series::LeadTime,
                SkipReason::UnparseableTimestamp {
                    state: workflow.terminal().to_string(),
                    value: delivered_at.to_string(),
                },
            ));
            continue;
        };

        let (start_state, lead_time) = match ticket.start(workflow) {
            Some((index, started_at)) => (
                workflow.states()[index].clone(),
                days_between(started_at, delivered_at).exact,
            ),
            None => (workflow.terminal().to_string(), 0.0),
        };
        if lead_time <= 0.0 {
            sink.on_ticket_skipped(&Diagnostic::new(
                ticket.id.clone(),
                Series::LeadTime,
                SkipReason::NonPositiveLeadTime { lead_time },
            ));
            continue;
        }

        records.push(LeadTimeRecord {
            ticket_id: ticket.id.clone(),
            delivered_date,
            delivered_at,
            start_state,
            lead_time,
        });
    }

    // sort_by is stable, so InputOrder keeps the supplied order on ties
    match options.tie_break {
        TieBreak::TicketId => records.sort_by(|a, b| {
            a.delivered_at
                .cmp(&b.delivered_at)
                .then_with(|| a.ticket_id.cmp(&b.ticket_id))
        }),
        TieBreak::InputOrder => records.sort_by_key(|r| r.delivered_at),
    }
    records
}

/// Bar count used when the caller does not pick one.
pub const DEFAULT_HISTOGRAM_BINS: usize = 10;

/// Equal-width histogram of lead times over `[min, max]`.
///
/// Bins are half-open except the last, which also holds `max`. When every
/// lead time is equal the result is a single zero-width bin. Empty input or
/// zero bins give no bins.
pub fn histogram(records: &[LeadTimeRecord], bins: usize) -> Vec<HistogramBin> {
    if records.is_empty() || bins == 0 {
        return Vec::new();
    }

    let (min, max) = records
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
            (lo.min(r.lead_time), hi.max(r.lead_time))
        });
    if min == max {
        return vec![HistogramBin {
            lower: min,
            upper: max,
            count: records.len(),
        }];
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for r in records {
        let i = ((r.lead_time - min) / width).floor() as usize;
        counts[i.min(bins - 1)] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: min + width * i as f64,
            upper: if i + 1 == bins { max } else { min + width * (i + 1) as f64 },
            count,
        })
        .collect()
}

/// Average, median and range of a lead-time series plus its percentile lines.
pub fn summarize(records: &[LeadTimeRecord]) -> LeadTimeSummary {
    if records.is_empty() {
        return LeadTimeSummary::default();
    }

    let mut days: Vec<f64> = records.iter().map(|r| r.lead_time).collect();
    days.sort_by(f64::total_cmp);

    let avg = days.iter().sum::<f64>() / days.len() as f64;

    #[allow(clippy::manual_is_multiple_of)]
    let median = if days.len() % 2 == 0 {
        let mid = days.len() / 2;
        (days[mid - 1] + days[mid]) / 2.0
    } else {
        days[days.len() / 2]
    };

    LeadTimeSummary {
        count: days.len(),
        average: Some(avg),
        median: Some(median),
        min: days.first().copied(),
        max: days.last().copied(),
        percentiles: percentile_lines_sorted(&days),
    }
}

/// 50/70/85/95th percentile lines of a lead-time series.
pub fn percentile_lines(records: &[LeadTimeRecord]) -> PercentileLines {
    let mut days: Vec<f64> = records.iter().map(|r| r.lead_time).collect();
    days.sort_by(f64::total_cmp);
    percentile_lines_sorted(&days)
}

fn percentile_lines_sorted(sorted: &[f64]) -> PercentileLines {
    PercentileLines {
        p50: percentile(sorted, 0.5),
        p70: percentile(sorted, 0.7),
        p85: percentile(sorted, 0.85),
        p95: percentile(sorted, 0.95),
    }
}

/// The element at `floor(n * p)` of an ascending slice.
fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let idx = (sorted.len() as f64 * p).floor() as usize;
    sorted.get(idx).copied()
}
