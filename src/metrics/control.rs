//! XmR (individuals and moving range) process behaviour limits.
//!
//! The scaling constants are the standard ones for subgroups of two and are
//! applied exactly as given.

use super::moving_range;
use super::types::{ControlLimits, LeadTimeRecord, MovingRangeRecord, XmrLimits};
use crate::config::MovingRangeMode;
use crate::error::{Error, Result};
use crate::window::BaselineWindow;

/// Natural process limit scaling for the individuals chart.
pub const NPL_SCALING: f64 = 2.66;
/// Upper range limit scaling for the moving-range chart.
pub const URL_SCALING: f64 = 3.27;

/// Individuals-chart limits over `window`, using per-ticket moving ranges
/// derived from `lead_times`.
pub fn individuals_limits(lead_times: &[LeadTimeRecord], window: &BaselineWindow) -> Result<ControlLimits> {
    let ranges = moving_range::build(lead_times, MovingRangeMode::PerTicket)?;
    individuals_limits_with(lead_times, &ranges, window)
}

/// Individuals-chart limits with a caller-built moving-range series.
///
/// `center` is the mean lead time of deliveries inside the window, the
/// average moving range uses ranges whose `to_date` is inside it. A lower
/// limit that is not positive is reported as `None`.
pub fn individuals_limits_with(
    lead_times: &[LeadTimeRecord],
    moving_ranges: &[MovingRangeRecord],
    window: &BaselineWindow,
) -> Result<ControlLimits> {
    let (center, sample_size) = mean_in_window(
        lead_times.iter().filter(|r| window.contains(r.delivered_date)).map(|r| r.lead_time),
    )
    .ok_or(Error::EmptyBaseline {
        series: "lead time",
        start: window.start,
        end: window.end,
    })?;
    let avg_moving_range = average_moving_range(moving_ranges, window)?;

    let spread = NPL_SCALING * avg_moving_range;
    let lower = center - spread;
    Ok(ControlLimits {
        center,
        upper: center + spread,
        lower: (lower > 0.0).then_some(lower),
        avg_moving_range,
        baseline_start: window.start,
        baseline_end: window.end,
        sample_size,
    })
}

/// Moving-range chart limits: the average moving range as center line and
/// `3.27 * AmR` as upper limit. There is no lower limit.
pub fn moving_range_limits(moving_ranges: &[MovingRangeRecord], window: &BaselineWindow) -> Result<ControlLimits> {
    let (avg_moving_range, sample_size) = average_with_count(moving_ranges, window)?;
    Ok(ControlLimits {
        center: avg_moving_range,
        upper: URL_SCALING * avg_moving_range,
        lower: None,
        avg_moving_range,
        baseline_start: window.start,
        baseline_end: window.end,
        sample_size,
    })
}

/// Both charts of the XmR pair over one window.
pub fn xmr_limits(
    lead_times: &[LeadTimeRecord],
    mode: MovingRangeMode,
    window: &BaselineWindow,
) -> Result<XmrLimits> {
    let ranges = moving_range::build(lead_times, mode)?;
    Ok(XmrLimits {
        individuals: individuals_limits_with(lead_times, &ranges, window)?,
        moving_range: moving_range_limits(&ranges, window)?,
    })
}

/// Mean moving range over ranges whose `to_date` falls inside `window`.
pub fn average_moving_range(moving_ranges: &[MovingRangeRecord], window: &BaselineWindow) -> Result<f64> {
    average_with_count(moving_ranges, window).map(|(avg, _)| avg)
}

fn average_with_count(moving_ranges: &[MovingRangeRecord], window: &BaselineWindow) -> Result<(f64, usize)> {
    mean_in_window(
        moving_ranges.iter().filter(|r| window.contains(r.to_date)).map(|r| r.value),
    )
    .ok_or(Error::EmptyBaseline {
        series: "moving range",
        start: window.start,
        end: window.end,
    })
}

fn mean_in_window(values: impl Iterator<Item = f64>) -> Option<(f64, usize)> {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| (sum / n as f64, n))
}
