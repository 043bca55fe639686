use chrono::NaiveDate;

use super::types::{LeadTimeRecord, MovingRangeRecord};
use crate::config::MovingRangeMode;
use crate::error::{Error, Result};

/// Build the moving-range series from a lead-time series sorted by delivery.
///
/// Fewer than two points is `Error::InsufficientData`, never an empty
/// "no variation" series. In `PerDay` mode the points are calendar days,
/// each the mean lead time of that day's deliveries.
pub fn build(series: &[LeadTimeRecord], mode: MovingRangeMode) -> Result<Vec<MovingRangeRecord>> {
    debug_assert!(
        series.windows(2).all(|w| w[0].delivered_at <= w[1].delivered_at),
        "lead-time series must be sorted by delivery"
    );

    let points: Vec<Point<'_>> = match mode {
        MovingRangeMode::PerTicket => series
            .iter()
            .map(|r| Point {
                date: r.delivered_date,
                ticket: Some(&r.ticket_id),
                value: r.lead_time,
            })
            .collect(),
        MovingRangeMode::PerDay => daily_means(series),
    };

    if points.len() < 2 {
        return Err(Error::InsufficientData {
            required: 2,
            actual: points.len(),
        });
    }

    Ok(points
        .windows(2)
        .map(|pair| MovingRangeRecord {
            from_date: pair[0].date,
            to_date: pair[1].date,
            from_ticket: pair[0].ticket.map(str::to_string),
            to_ticket: pair[1].ticket.map(str::to_string),
            value: moving_range(pair[0].value, pair[1].value),
        })
        .collect())
}

/// Absolute difference between two successive values.
pub fn moving_range(previous: f64, current: f64) -> f64 {
    (current - previous).abs()
}

struct Point<'a> {
    date: NaiveDate,
    ticket: Option<&'a str>,
    value: f64,
}

fn daily_means(series: &[LeadTimeRecord]) -> Vec<Point<'_>> {
    let mut points: Vec<Point<'_>> = Vec::new();
    let mut count = 0usize;
    for r in series {
        match points.last_mut() {
            Some(last) if last.date == r.delivered_date => {
                // running mean
                count += 1;
                last.value += (r.lead_time - last.value) / count as f64;
            }
            _ => {
                count = 1;
                points.push(Point {
                    date: r.delivered_date,
                    ticket: None,
                    value: r.lead_time,
                });
            }
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineOptions;
    use crate::diagnostics::NoopSink;
    use crate::metrics::fixtures::{approx_eq, date, lead_time, ticket, DAY};
    use crate::metrics::lead_time as lead_times;
    use crate::model::Workflow;

    #[test]
    fn test_five_equal_lead_times_give_four_zero_ranges() {
        let deliveries = [1_679_347_200i64, 1_679_433_600, 1_679_520_000, 1_679_606_400, 1_680_211_200];
        let tickets: Vec<_> = deliveries
            .iter()
            .enumerate()
            .map(|(i, &d)| ticket(&format!("T-{i}"), &[("analysis_active", d - 3 * DAY), ("delivered", d)]))
            .collect();
        let series = lead_times::build(&tickets, &Workflow::default(), &EngineOptions::default(), &NoopSink);

        let ranges = build(&series, MovingRangeMode::PerTicket).unwrap();
        assert_eq!(ranges.len(), 4);
        assert!(ranges.iter().all(|r| r.value == 0.0));
        assert_eq!(ranges[0].from_date, date(2023, 3, 20));
        assert_eq!(ranges[0].to_date, date(2023, 3, 21));
        assert_eq!(ranges[3].to_date, date(2023, 3, 30));
        assert_eq!(ranges[0].from_ticket.as_deref(), Some("T-0"));
        assert_eq!(ranges[0].to_ticket.as_deref(), Some("T-1"));
    }

    #[test]
    fn test_values_are_absolute_differences() {
        let series = vec![
            lead_time("A", date(2023, 4, 3), 10.0),
            lead_time("B", date(2023, 4, 4), 20.0),
            lead_time("C", date(2023, 4, 5), 12.5),
        ];
        let ranges = build(&series, MovingRangeMode::PerTicket).unwrap();
        let values: Vec<f64> = ranges.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![10.0, 7.5]);
    }

    #[test]
    fn test_moving_range_symmetry() {
        assert_eq!(moving_range(3.5, 10.0), moving_range(10.0, 3.5));
        assert_eq!(moving_range(4.0, 4.0), 0.0);
    }

    #[test]
    fn test_insufficient_data() {
        assert!(matches!(
            build(&[], MovingRangeMode::PerTicket),
            Err(Error::InsufficientData { required: 2, actual: 0 })
        ));
        let one = vec![lead_time("A", date(2023, 4, 3), 10.0)];
        assert!(matches!(
            build(&one, MovingRangeMode::PerTicket),
            Err(Error::InsufficientData { required: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_per_day_averages_same_day_deliveries() {
        let series = vec![
            lead_time("A", date(2023, 4, 3), 2.0),
            lead_time("B", date(2023, 4, 3), 4.0),
            lead_time("C", date(2023, 4, 3), 9.0),
            lead_time("D", date(2023, 4, 5), 1.0),
            lead_time("E", date(2023, 4, 6), 3.0),
            lead_time("F", date(2023, 4, 6), 7.0),
        ];
        let ranges = build(&series, MovingRangeMode::PerDay).unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].from_date, date(2023, 4, 3));
        assert_eq!(ranges[0].to_date, date(2023, 4, 5));
        assert!(approx_eq(ranges[0].value, 4.0)); // |1 - 5|
        assert!(approx_eq(ranges[1].value, 4.0)); // |5 - 1|
        assert!(ranges[0].from_ticket.is_none());

        let per_ticket = build(&series, MovingRangeMode::PerTicket).unwrap();
        assert_eq!(per_ticket.len(), 5);
    }

    #[test]
    fn test_per_day_single_day_is_insufficient() {
        let series = vec![
            lead_time("A", date(2023, 4, 3), 2.0),
            lead_time("B", date(2023, 4, 3), 4.0),
        ];
        assert!(matches!(
            build(&series, MovingRangeMode::PerDay),
            Err(Error::InsufficientData { required: 2, actual: 1 })
        ));
    }
}
