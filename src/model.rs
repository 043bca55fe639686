use std::collections::{BTreeMap, HashSet};

use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::date_util::{day_of, EpochSeconds};
use crate::error::{Error, Result};

pub const DEFAULT_STATES: [&str; 6] = [
    "analysis_active",
    "analysis_done",
    "in_progress",
    "dev_complete",
    "verification_start",
    "delivered",
];

/// Ordered workflow states. The last state is the terminal "delivered" state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Workflow {
    states: Vec<String>,
}

impl Workflow {
    pub fn new<I, S>(states: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let states: Vec<String> = states.into_iter().map(Into::into).collect();
        if states.is_empty() {
            return Err(Error::InvalidWorkflow("at least one state is required".into()));
        }
        let mut seen = HashSet::new();
        for s in &states {
            if s.trim().is_empty() {
                return Err(Error::InvalidWorkflow("state names cannot be blank".into()));
            }
            if !seen.insert(s.as_str()) {
                return Err(Error::InvalidWorkflow(format!("duplicate state '{s}'")));
            }
        }
        Ok(Self { states })
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Always false; a workflow has at least one state.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn first(&self) -> &str {
        &self.states[0]
    }

    pub fn terminal(&self) -> &str {
        &self.states[self.terminal_index()]
    }

    pub fn terminal_index(&self) -> usize {
        self.states.len() - 1
    }

    pub fn index_of(&self, state: &str) -> Option<usize> {
        self.states.iter().position(|s| s == state)
    }
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            states: DEFAULT_STATES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TryFrom<Vec<String>> for Workflow {
    type Error = Error;

    fn try_from(states: Vec<String>) -> Result<Self> {
        Workflow::new(states)
    }
}

impl From<Workflow> for Vec<String> {
    fn from(w: Workflow) -> Self {
        w.states
    }
}

/// One unit of work and the instant it entered each workflow state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    /// `None` (or absent) means the ticket has not entered that state.
    #[serde(default)]
    pub timestamps: BTreeMap<String, Option<EpochSeconds>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_type: Option<String>,
}

impl Ticket {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamps: BTreeMap::new(),
            repo: None,
            ticket_type: None,
        }
    }

    pub fn with_state(mut self, state: impl Into<String>, ts: Option<EpochSeconds>) -> Self {
        self.timestamps.insert(state.into(), ts);
        self
    }

    pub fn timestamp(&self, state: &str) -> Option<EpochSeconds> {
        self.timestamps.get(state).copied().flatten()
    }

    pub fn delivered(&self, workflow: &Workflow) -> Option<EpochSeconds> {
        self.timestamp(workflow.terminal())
    }

    /// First stamped state before the terminal one, as `(index, timestamp)`.
    pub fn start(&self, workflow: &Workflow) -> Option<(usize, EpochSeconds)> {
        workflow.states()[..workflow.terminal_index()]
            .iter()
            .enumerate()
            .find_map(|(i, s)| self.timestamp(s).map(|ts| (i, ts)))
    }

    /// First and last stamped states in workflow order.
    pub fn first_and_last(&self, workflow: &Workflow) -> Option<((usize, EpochSeconds), (usize, EpochSeconds))> {
        let mut stamped = workflow
            .states()
            .iter()
            .enumerate()
            .filter_map(|(i, s)| self.timestamp(s).map(|ts| (i, ts)));
        let first = stamped.next()?;
        let last = stamped.last().unwrap_or(first);
        Some((first, last))
    }

    /// The first pair of stamped states, in workflow order, where the later
    /// state carries an earlier timestamp. `None` when stamps never go back.
    pub fn first_out_of_order<'w>(&self, workflow: &'w Workflow) -> Option<(&'w str, &'w str)> {
        let mut previous: Option<(&str, EpochSeconds)> = None;
        for state in workflow.states() {
            let Some(ts) = self.timestamp(state) else {
                continue;
            };
            if let Some((prev_state, prev_ts)) = previous {
                if ts < prev_ts {
                    return Some((prev_state, state));
                }
            }
            previous = Some((state, ts));
        }
        None
    }

    pub fn is_monotonic(&self, workflow: &Workflow) -> bool {
        self.first_out_of_order(workflow).is_none()
    }

    /// The first stamped state, in workflow order, whose stamp has no
    /// calendar day in `offset`.
    pub fn first_unrepresentable<'w>(
        &self,
        workflow: &'w Workflow,
        offset: FixedOffset,
    ) -> Option<(&'w str, EpochSeconds)> {
        workflow.states().iter().find_map(|s| {
            let ts = self.timestamp(s)?;
            day_of(ts, offset).is_none().then_some((s.as_str(), ts))
        })
    }

    /// Calendar day of each state's stamp, indexed like the workflow.
    /// A stamp with no calendar day reads as `None`; see
    /// [`Ticket::first_unrepresentable`].
    pub fn stamp_days(&self, workflow: &Workflow, offset: FixedOffset) -> Vec<Option<NaiveDate>> {
        workflow
            .states()
            .iter()
            .map(|s| self.timestamp(s).and_then(|ts| day_of(ts, offset)))
            .collect()
    }

    /// Index of the state the ticket occupies on `day`: the furthest state
    /// whose stamp falls on or before that day.
    pub fn state_on(&self, workflow: &Workflow, day: NaiveDate, offset: FixedOffset) -> Option<usize> {
        occupied_state(&self.stamp_days(workflow, offset), day)
    }
}

pub(crate) fn occupied_state(stamp_days: &[Option<NaiveDate>], day: NaiveDate) -> Option<usize> {
    stamp_days
        .iter()
        .rposition(|d| matches!(d, Some(d) if *d <= day))
}
