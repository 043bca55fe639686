use chrono::NaiveDate;

use super::types::{AsOfMetrics, CfdRecord, StateCycleTime};
use crate::model::Workflow;

/// Resolve the metrics that applied at one point of a cumulative-flow chart.
///
/// `query_count` is a vertical position on a chart that stacks the bands
/// with the terminal state at the bottom, so the walk accumulates bands from
/// the terminal state upward. Cycle and lead times are found by scanning
/// earlier days backward for the most recent one on which the band above had
/// not yet grown past today's level.
///
/// Returns `None` when `query_date` has no record (no interpolation) or when
/// `query_count` lies above the top of the stack. `cfd` must be sorted by
/// date, as built by [`crate::metrics::cfd::build`].
pub fn resolve(
    cfd: &[CfdRecord],
    workflow: &Workflow,
    query_date: NaiveDate,
    query_count: u64,
) -> Option<AsOfMetrics> {
    let pos = cfd.binary_search_by_key(&query_date, |r| r.date).ok()?;
    let current = &cfd[pos];
    let history = &cfd[..pos];
    let current_state_index = band_at(current, workflow, query_count)?;
    let terminal = workflow.terminal_index();

    let cycle_time_date_before = boundary_crossing(history, current, workflow, current_state_index);
    let cycle_time = cycle_time_date_before.map(|d| (query_date - d).num_days());

    let delivered = current.reached(workflow, terminal);
    let lead_time_date_before = scan_back(history, |r| r.reached(workflow, 0) <= delivered);
    let lead_time = lead_time_date_before.map(|d| (query_date - d).num_days());

    let cycle_times: Vec<StateCycleTime> = (1..workflow.len())
        .map(|i| StateCycleTime {
            state: workflow.states()[i].clone(),
            days: boundary_crossing(history, current, workflow, i).map(|d| (query_date - d).num_days()),
        })
        .collect();

    let mut biggest_cycle_time: Option<&StateCycleTime> = None;
    for entry in &cycle_times {
        if let Some(days) = entry.days {
            if biggest_cycle_time.and_then(|b| b.days).map_or(true, |best| days > best) {
                biggest_cycle_time = Some(entry);
            }
        }
    }
    let biggest_cycle_time = biggest_cycle_time.cloned();

    let wip = current.reached(workflow, 0).saturating_sub(delivered);
    let throughput = lead_time.filter(|lt| *lt > 0).map(|lt| wip as f64 / lt as f64);

    Some(AsOfMetrics {
        date: query_date,
        current_state: workflow.states()[current_state_index].clone(),
        current_state_index,
        cycle_time,
        cycle_time_date_before,
        lead_time,
        lead_time_date_before,
        cycle_times,
        biggest_cycle_time,
        wip,
        throughput,
    })
}

/// The workflow index of the band containing `query_count`, walking from
/// the terminal state upward.
pub fn band_at(record: &CfdRecord, workflow: &Workflow, query_count: u64) -> Option<usize> {
    let mut cumulative = 0u64;
    for (i, state) in workflow.states().iter().enumerate().rev() {
        cumulative += record.count(state);
        if query_count <= cumulative {
            return Some(i);
        }
    }
    None
}

/// Most recent earlier day on which arrivals into the predecessor of state
/// `index` were no more than today's arrivals into `index`.
fn boundary_crossing(
    history: &[CfdRecord],
    current: &CfdRecord,
    workflow: &Workflow,
    index: usize,
) -> Option<NaiveDate> {
    if index == 0 {
        return None;
    }
    let target = current.reached(workflow, index);
    scan_back(history, |r| r.reached(workflow, index - 1) <= target)
}

fn scan_back(history: &[CfdRecord], pred: impl Fn(&CfdRecord) -> bool) -> Option<NaiveDate> {
    history.iter().rev().find(|r| pred(r)).map(|r| r.date)
}
