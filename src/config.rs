use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MAX_OFFSET_SECONDS: i32 = 24 * 3600;

/// How to order two deliveries stamped at the same instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Ascending ticket id.
    #[default]
    TicketId,
    /// Keep the order in which tickets were supplied.
    InputOrder,
}

/// What to do with a ticket whose stamps go backwards in workflow order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfOrderPolicy {
    /// Exclude the ticket from the series and report it.
    #[default]
    Skip,
    /// Keep the ticket; on any day it occupies the furthest state reached.
    Tolerate,
}

/// Unit of analysis for the moving-range series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovingRangeMode {
    /// One point per delivered ticket.
    #[default]
    PerTicket,
    /// Same-day deliveries averaged into one point per calendar day.
    PerDay,
}

/// Options every computation receives explicitly. Nothing here is read
/// from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Offset used to turn epoch seconds into calendar days.
    pub utc_offset_seconds: i32,
    pub tie_break: TieBreak,
    pub out_of_order: OutOfOrderPolicy,
    pub moving_range_mode: MovingRangeMode,
}

impl EngineOptions {
    pub fn validate(&self) -> Result<()> {
        if self.utc_offset_seconds.abs() >= MAX_OFFSET_SECONDS {
            return Err(Error::Config(format!(
                "utc_offset_seconds must be within ±{MAX_OFFSET_SECONDS}, got {}",
                self.utc_offset_seconds
            )));
        }
        Ok(())
    }

    /// The day-normalisation offset. Falls back to UTC when the configured
    /// value was never validated and is out of range.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_seconds).unwrap_or_else(|| Utc.fix())
    }

    pub fn with_utc_offset(mut self, seconds: i32) -> Self {
        self.utc_offset_seconds = seconds;
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn with_out_of_order(mut self, policy: OutOfOrderPolicy) -> Self {
        self.out_of_order = policy;
        self
    }

    pub fn with_moving_range_mode(mut self, mode: MovingRangeMode) -> Self {
        self.moving_range_mode = mode;
        self
    }
}
