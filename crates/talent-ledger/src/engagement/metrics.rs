//! Derived task fields. Every function here is pure so the write path can recompute them
//! on each save and tests can pin the thresholds without touching storage.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::domain::TrackStatus;
use super::error::EngineError;

pub const MAX_REPORTED_HOURS: Decimal = Decimal::from_parts(24, 0, 0, false, 0);
pub const ON_TRACK_THRESHOLD: u8 = 90;
pub const OFF_TRACK_THRESHOLD: u8 = 70;

const SECONDS_PER_HOUR: i64 = 3600;

/// Time information supplied with a task submission.
///
/// A complete `start_time`/`end_time` pair takes precedence over `hours_worked`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeReport {
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hours_worked: Option<Decimal>,
}

impl TimeReport {
    pub fn span(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            start_time: Some(start_time),
            end_time: Some(end_time),
            hours_worked: None,
        }
    }

    pub fn hours(hours_worked: Decimal) -> Self {
        Self {
            start_time: None,
            end_time: None,
            hours_worked: Some(hours_worked),
        }
    }
}

/// Round a monetary or hour figure to two decimal places, midpoint away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Authoritative worked-hours figure for a submission.
pub fn reported_hours(report: &TimeReport) -> Result<Decimal, EngineError> {
    let hours = match (report.start_time, report.end_time) {
        (Some(start), Some(end)) => {
            if end < start {
                return Err(EngineError::validation("end_time must not be earlier than start_time"));
            }
            let seconds = (end - start).num_seconds().max(0);
            round2(Decimal::from(seconds) / Decimal::from(SECONDS_PER_HOUR))
        }
        (Some(_), None) | (None, Some(_)) => {
            return Err(EngineError::validation(
                "start_time and end_time must be supplied together",
            ));
        }
        (None, None) => match report.hours_worked {
            Some(hours) => {
                check_hours_range(hours)?;
                round2(hours)
            }
            None => {
                return Err(EngineError::validation(
                    "either a start_time/end_time pair or hours_worked is required",
                ));
            }
        },
    };

    check_hours_range(hours)?;
    Ok(hours)
}

fn check_hours_range(hours: Decimal) -> Result<(), EngineError> {
    if hours < Decimal::ZERO || hours > MAX_REPORTED_HOURS {
        return Err(EngineError::validation(format!(
            "reported hours must lie within [0, {MAX_REPORTED_HOURS}], got {hours}"
        )));
    }
    Ok(())
}

/// Validate an optional progress figure, defaulting to zero.
pub fn progress_percent(progress: Option<u8>) -> Result<u8, EngineError> {
    let progress = progress.unwrap_or(0);
    if progress > 100 {
        return Err(EngineError::validation(format!(
            "progress_percent must lie within [0, 100], got {progress}"
        )));
    }
    Ok(progress)
}

pub fn track_status(progress_percent: u8) -> TrackStatus {
    if progress_percent >= ON_TRACK_THRESHOLD {
        TrackStatus::OnTrack
    } else if progress_percent >= OFF_TRACK_THRESHOLD {
        TrackStatus::OffTrack
    } else {
        TrackStatus::AtRisk
    }
}

/// Amount owed for `hours` at `hourly_rate`.
pub fn settlement_amount(hours: Decimal, hourly_rate: Decimal) -> Decimal {
    round2(hours * hourly_rate)
}
