use super::types::WorkItemAge;
use crate::date_util::{days_between, EpochSeconds};
use crate::diagnostics::{Diagnostic, DiagnosticSink, Series, SkipReason};
use crate::model::{Ticket, Workflow};

/// Age of every ticket at the instant `as_of`, counted in whole days from
/// its first stamped state, the first day counting as one.
///
/// The result is ordered by the workflow index of each ticket's current
/// state, then by ticket id.
pub fn build(
    tickets: &[Ticket],
    workflow: &Workflow,
    as_of: EpochSeconds,
    sink: &dyn DiagnosticSink,
) -> Vec<WorkItemAge> {
    let mut ages: Vec<WorkItemAge> = tickets
        .iter()
        .filter_map(|ticket| {
            let Some(((initial, initial_at), (current, _))) = ticket.first_and_last(workflow) else {
                sink.on_ticket_skipped(&Diagnostic::new(
                    ticket.id.clone(),
                    Series::WorkItemAge,
                    SkipReason::NoTimestamps,
                ));
                return None;
            };

            let age_days = days_between(initial_at, as_of).rounded.saturating_add(1);
            if age_days <= 0 {
                sink.on_ticket_skipped(&Diagnostic::new(
                    ticket.id.clone(),
                    Series::WorkItemAge,
                    SkipReason::NonPositiveAge { age: age_days },
                ));
                return None;
            }

            Some(WorkItemAge {
                ticket_id: ticket.id.clone(),
                ticket_type: ticket.ticket_type.clone(),
                initial_state: workflow.states()[initial].clone(),
                initial_at,
                current_state: workflow.states()[current].clone(),
                current_state_index: current,
                age_days,
            })
        })
        .collect();

    ages.sort_by(|a, b| {
        a.current_state_index
            .cmp(&b.current_state_index)
            .then_with(|| a.ticket_id.cmp(&b.ticket_id))
    });
    ages
}
