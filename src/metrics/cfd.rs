use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::admit;
use super::types::CfdRecord;
use crate::config::EngineOptions;
use crate::date_util::days_inclusive;
use crate::diagnostics::{DiagnosticSink, Series};
use crate::model::{occupied_state, Ticket, Workflow};

/// Build the daily cumulative-flow series.
///
/// The series spans the first to the last delivery day, inclusive. On each
/// day a ticket sits in exactly one band: the furthest state whose stamp is
/// on or before that day. A state the ticket skipped (no stamp) is never its
/// successor, so a skip does not leave it counted twice. Tickets that were
/// never delivered do not widen the range but stay in their last state for
/// the rest of it.
pub fn build(
    tickets: &[Ticket],
    workflow: &Workflow,
    options: &EngineOptions,
    sink: &dyn DiagnosticSink,
) -> Vec<CfdRecord> {
    let offset = options.offset();
    let stamp_days: Vec<Vec<Option<NaiveDate>>> = tickets
        .iter()
        .filter(|t| admit(t, workflow, options, Series::CumulativeFlow, sink))
        .map(|t| t.stamp_days(workflow, offset))
        .collect();

    let terminal = workflow.terminal_index();
    let Some((first_day, last_day)) = delivery_range(&stamp_days, terminal) else {
        log::debug!("No delivered tickets; cumulative flow is empty");
        return Vec::new();
    };
    log::debug!(
        "Building cumulative flow for {} tickets from {first_day} to {last_day}",
        stamp_days.len()
    );

    days_inclusive(first_day, last_day)
        .map(|day| {
            let mut per_state = vec![0u64; workflow.len()];
            for stamps in &stamp_days {
                if let Some(i) = occupied_state(stamps, day) {
                    per_state[i] += 1;
                }
            }
            let counts: BTreeMap<String, u64> = workflow
                .states()
                .iter()
                .cloned()
                .zip(per_state)
                .collect();
            CfdRecord { date: day, counts }
        })
        .collect()
}

fn delivery_range(stamp_days: &[Vec<Option<NaiveDate>>], terminal: usize) -> Option<(NaiveDate, NaiveDate)> {
    let mut delivered = stamp_days.iter().filter_map(|days| days[terminal]);
    let first = delivered.next()?;
    Some(delivered.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutOfOrderPolicy;
    use crate::diagnostics::{CollectingSink, NoopSink, SkipReason};
    use crate::metrics::fixtures::{at, date, ticket};

    fn sample() -> Vec<Ticket> {
        vec![
            ticket(
                "A",
                &[
                    ("analysis_active", at(0, 10)),
                    ("in_progress", at(1, 9)),
                    ("delivered", at(3, 15)),
                ],
            ),
            ticket(
                "B",
                &[
                    ("analysis_done", at(1, 12)),
                    ("dev_complete", at(2, 8)),
                    ("delivered", at(5, 11)),
                ],
            ),
            ticket(
                "C",
                &[("in_progress", at(2, 14)), ("verification_start", at(4, 16))],
            ),
        ]
    }

    fn build_default(tickets: &[Ticket]) -> Vec<CfdRecord> {
        build(tickets, &Workflow::default(), &EngineOptions::default(), &NoopSink)
    }

    #[test]
    fn test_empty_input() {
        assert!(build_default(&[]).is_empty());
    }

    #[test]
    fn test_no_delivered_tickets() {
        let tickets = vec![ticket("A", &[("in_progress", at(0, 0))])];
        assert!(build_default(&tickets).is_empty());
    }

    #[test]
    fn test_range_spans_delivery_days_inclusive() {
        let cfd = build_default(&sample());
        let dates: Vec<_> = cfd.iter().map(|r| r.date).collect();
        assert_eq!(
            dates,
            vec![date(2023, 3, 24), date(2023, 3, 25), date(2023, 3, 26)]
        );
    }

    #[test]
    fn test_counts_per_day() {
        let cfd = build_default(&sample());

        assert_eq!(cfd[0].count("delivered"), 1);
        assert_eq!(cfd[0].count("dev_complete"), 1);
        assert_eq!(cfd[0].count("in_progress"), 1);
        assert_eq!(cfd[0].count("verification_start"), 0);

        assert_eq!(cfd[1].count("delivered"), 1);
        assert_eq!(cfd[1].count("dev_complete"), 1);
        assert_eq!(cfd[1].count("verification_start"), 1);
        assert_eq!(cfd[1].count("in_progress"), 0);

        assert_eq!(cfd[2].count("delivered"), 2);
        assert_eq!(cfd[2].count("verification_start"), 1);
        assert_eq!(cfd[2].count("dev_complete"), 0);
    }

    #[test]
    fn test_every_state_has_a_key() {
        let cfd = build_default(&sample());
        for record in &cfd {
            assert_eq!(record.counts.len(), 6);
        }
    }

    #[test]
    fn test_undelivered_ticket_stays_in_last_state() {
        let tickets = vec![
            ticket("stuck", &[("analysis_active", at(0, 0)), ("in_progress", at(1, 0))]),
            ticket("done", &[("analysis_active", at(0, 0)), ("delivered", at(30, 0))]),
        ];
        let cfd = build_default(&tickets);
        assert_eq!(cfd.len(), 1);
        assert_eq!(cfd[0].count("in_progress"), 1);

        let tickets = vec![
            ticket("stuck", &[("analysis_active", at(0, 0)), ("in_progress", at(1, 0))]),
            ticket("early", &[("analysis_active", at(0, 0)), ("delivered", at(2, 0))]),
            ticket("late", &[("analysis_active", at(0, 0)), ("delivered", at(20, 0))]),
        ];
        let cfd = build_default(&tickets);
        assert_eq!(cfd.len(), 19);
        assert!(cfd.iter().all(|r| r.count("in_progress") == 1));
    }

    #[test]
    fn test_skipped_state_not_double_counted() {
        // dev_complete missing between in_progress and verification_start
        let tickets = vec![ticket(
            "skip",
            &[
                ("in_progress", at(0, 0)),
                ("verification_start", at(2, 0)),
                ("delivered", at(4, 0)),
            ],
        ), ticket("anchor", &[("analysis_active", at(0, 0)), ("delivered", at(0, 12))])];
        let cfd = build_default(&tickets);
        assert_eq!(cfd[0].count("in_progress"), 1);
        assert_eq!(cfd[2].count("in_progress"), 0);
        assert_eq!(cfd[2].count("verification_start"), 1);
        for record in &cfd {
            assert_eq!(record.total(), 2);
        }
    }

    #[test]
    fn test_conservation() {
        let wf = Workflow::default();
        let tickets = sample();
        let cfd = build_default(&tickets);
        for record in &cfd {
            let entered = tickets
                .iter()
                .filter(|t| t.state_on(&wf, record.date, EngineOptions::default().offset()).is_some())
                .count() as u64;
            assert_eq!(record.total(), entered, "on {}", record.date);
            assert_eq!(record.reached(&wf, 0), entered);
        }
    }

    #[test]
    fn test_terminal_count_non_decreasing() {
        let mut tickets = sample();
        for i in 0..20 {
            tickets.push(ticket(
                &format!("X-{i}"),
                &[
                    ("analysis_active", at(i % 4, 1)),
                    ("in_progress", at(i % 4 + 1, 2)),
                    ("delivered", at(i % 7 + 3, 3)),
                ],
            ));
        }
        let cfd = build_default(&tickets);
        for pair in cfd.windows(2) {
            assert!(pair[1].count("delivered") >= pair[0].count("delivered"));
        }
    }

    #[test]
    fn test_out_of_order_ticket_skipped_by_default() {
        let mut tickets = sample();
        tickets.push(ticket(
            "bad",
            &[("in_progress", at(4, 0)), ("dev_complete", at(2, 0)), ("delivered", at(5, 0))],
        ));
        let sink = CollectingSink::new();
        let cfd = build(&tickets, &Workflow::default(), &EngineOptions::default(), &sink);
        assert_eq!(cfd[2].count("delivered"), 2);

        let diagnostics = sink.take();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].ticket_id, "bad");
        assert_eq!(diagnostics[0].series, Series::CumulativeFlow);
        assert!(matches!(diagnostics[0].reason, SkipReason::OutOfOrderTimestamps { .. }));
    }

    #[test]
    fn test_out_of_order_ticket_tolerated() {
        let mut tickets = sample();
        tickets.push(ticket(
            "bad",
            &[("in_progress", at(4, 0)), ("dev_complete", at(2, 0)), ("delivered", at(5, 0))],
        ));
        let opts = EngineOptions::default().with_out_of_order(OutOfOrderPolicy::Tolerate);
        let sink = CollectingSink::new();
        let cfd = build(&tickets, &Workflow::default(), &opts, &sink);
        assert!(sink.is_empty());
        // day 3: bad has reached dev_complete (stamped day 2) and stays there
        assert_eq!(cfd[0].count("dev_complete"), 2);
        // day 4: in_progress is stamped, but dev_complete is further along
        assert_eq!(cfd[1].count("dev_complete"), 2);
        assert_eq!(cfd[2].count("delivered"), 3);
    }

    #[test]
    fn test_ticket_with_stamp_without_calendar_day_skipped() {
        let mut tickets = sample();
        tickets.push(ticket("far", &[("in_progress", at(1, 0)), ("delivered", i64::MAX)]));
        let opts = EngineOptions::default().with_out_of_order(OutOfOrderPolicy::Tolerate);
        let sink = CollectingSink::new();
        let cfd = build(&tickets, &Workflow::default(), &opts, &sink);
        assert_eq!(cfd, build_default(&sample()));

        let diagnostics = sink.take();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].ticket_id, "far");
        assert!(matches!(diagnostics[0].reason, SkipReason::UnparseableTimestamp { .. }));
    }

    #[test]
    fn test_idempotent() {
        let tickets = sample();
        assert_eq!(build_default(&tickets), build_default(&tickets));
    }
}
