use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::date_util::EpochSeconds;
use crate::model::Workflow;

/// One day of the cumulative-flow series: how many tickets occupy each state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfdRecord {
    pub date: NaiveDate,
    pub counts: BTreeMap<String, u64>,
}

impl CfdRecord {
    pub fn count(&self, state: &str) -> u64 {
        self.counts.get(state).copied().unwrap_or(0)
    }

    /// Tickets in the workflow on this day.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Tickets that have reached the state at `index` or any later state.
    /// This is the height of that state's band top on a stacked chart whose
    /// bottom band is the terminal state.
    pub fn reached(&self, workflow: &Workflow, index: usize) -> u64 {
        workflow
            .states()
            .iter()
            .skip(index)
            .map(|s| self.count(s))
            .sum()
    }
}

/// Lead time of one delivered ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadTimeRecord {
    pub ticket_id: String,
    pub delivered_date: NaiveDate,
    pub delivered_at: EpochSeconds,
    /// The first stamped state, where the lead time starts.
    pub start_state: String,
    /// Exact fractional days.
    pub lead_time: f64,
}

impl LeadTimeRecord {
    /// Floored days, for display only.
    pub fn rounded_days(&self) -> i64 {
        self.lead_time.floor() as i64
    }
}

/// Absolute difference between two chronologically adjacent lead times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovingRangeRecord {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    /// Set in per-ticket mode only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_ticket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_ticket: Option<String>,
    pub value: f64,
}

/// Center line and natural process limits over a baseline window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlLimits {
    pub center: f64,
    pub upper: f64,
    /// `None` whenever the computed lower limit is not positive.
    pub lower: Option<f64>,
    pub avg_moving_range: f64,
    pub baseline_start: NaiveDate,
    pub baseline_end: NaiveDate,
    /// Number of points averaged into `center`.
    pub sample_size: usize,
}

/// Limits for both charts of an XmR pair over the same window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XmrLimits {
    pub individuals: ControlLimits,
    pub moving_range: ControlLimits,
}

/// Cycle time across the boundary into `state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateCycleTime {
    pub state: String,
    pub days: Option<i64>,
}

/// What applied at one point of the cumulative-flow chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsOfMetrics {
    pub date: NaiveDate,
    pub current_state: String,
    pub current_state_index: usize,
    pub cycle_time: Option<i64>,
    pub cycle_time_date_before: Option<NaiveDate>,
    pub lead_time: Option<i64>,
    pub lead_time_date_before: Option<NaiveDate>,
    /// One entry per state after the first, in workflow order.
    pub cycle_times: Vec<StateCycleTime>,
    pub biggest_cycle_time: Option<StateCycleTime>,
    pub wip: u64,
    /// Items per day implied by Little's law.
    pub throughput: Option<f64>,
}

/// Percentile lines drawn over a lead-time scatterplot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PercentileLines {
    pub p50: Option<f64>,
    pub p70: Option<f64>,
    pub p85: Option<f64>,
    pub p95: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadTimeSummary {
    pub count: usize,
    pub average: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub percentiles: PercentileLines,
}

/// One bar of a lead-time histogram, covering `lower..upper` days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// How long a ticket has been in the workflow and where it is now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemAge {
    pub ticket_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_type: Option<String>,
    pub initial_state: String,
    pub initial_at: EpochSeconds,
    pub current_state: String,
    pub current_state_index: usize,
    pub age_days: i64,
}
