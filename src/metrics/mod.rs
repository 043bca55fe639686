pub mod age;
pub mod as_of;
pub mod cfd;
pub mod control;
pub mod lead_time;
pub mod moving_range;
pub mod types;

pub use types::*;

use crate::config::{EngineOptions, OutOfOrderPolicy};
use crate::diagnostics::{Diagnostic, DiagnosticSink, Series, SkipReason};
use crate::model::{Ticket, Workflow};

/// Whether `ticket` takes part in `series` under `options`. A rejected
/// ticket is reported to `sink`.
///
/// Stamps without a calendar day always reject the ticket. Out-of-order
/// stamps reject it unless the policy tolerates them.
pub(crate) fn admit(
    ticket: &Ticket,
    workflow: &Workflow,
    options: &EngineOptions,
    series: Series,
    sink: &dyn DiagnosticSink,
) -> bool {
    if let Some((state, ts)) = ticket.first_unrepresentable(workflow, options.offset()) {
        sink.on_ticket_skipped(&Diagnostic::new(
            ticket.id.clone(),
            series,
            SkipReason::UnparseableTimestamp {
                state: state.to_string(),
                value: ts.to_string(),
            },
        ));
        return false;
    }
    if options.out_of_order == OutOfOrderPolicy::Tolerate {
        return true;
    }
    match ticket.first_out_of_order(workflow) {
        Some((predecessor, state)) => {
            sink.on_ticket_skipped(&Diagnostic::new(
                ticket.id.clone(),
                series,
                SkipReason::OutOfOrderTimestamps {
                    predecessor: predecessor.to_string(),
                    state: state.to_string(),
                },
            ));
            false
        }
        None => true,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use super::types::{CfdRecord, LeadTimeRecord};
    use crate::date_util::EpochSeconds;
    use crate::model::Ticket;

    pub const DAY: i64 = 86_400;
    /// 2023-03-21T00:00:00Z
    pub const BASE: EpochSeconds = 1_679_356_800;

    /// `day` days and `hour` hours after [`BASE`].
    pub fn at(day: i64, hour: i64) -> EpochSeconds {
        BASE + day * DAY + hour * 3_600
    }

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn ticket(id: &str, stamps: &[(&str, EpochSeconds)]) -> Ticket {
        stamps
            .iter()
            .fold(Ticket::new(id), |t, (state, ts)| t.with_state(*state, Some(*ts)))
    }

    /// A lead-time record delivered at noon UTC on `date`.
    pub fn lead_time(id: &str, date: NaiveDate, value: f64) -> LeadTimeRecord {
        LeadTimeRecord {
            ticket_id: id.to_string(),
            delivered_date: date,
            delivered_at: date.and_hms_opt(12, 0, 0).unwrap().and_utc().timestamp(),
            start_state: "in_progress".to_string(),
            lead_time: value,
        }
    }

    pub fn cfd_record(date: NaiveDate, counts: &[(&str, u64)]) -> CfdRecord {
        CfdRecord {
            date,
            counts: counts
                .iter()
                .map(|(s, n)| (s.to_string(), *n))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    pub fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }
}
