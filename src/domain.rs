use std::fmt::{Display, Formatter};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const SECONDS_PER_HOUR: u64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(TaskId)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("task name must not be empty")]
    EmptyName,
}

/// One tracked task, serialized exactly as the snapshot record
/// `{id, name, timeSpent, isRunning, lastStart}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub time_spent: u64,
    pub is_running: bool,
    /// Start of the interval not yet folded into `time_spent`. Only
    /// meaningful while `is_running` is set.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_start: DateTime<Utc>,
}

impl Task {
    pub(crate) fn started(id: TaskId, name: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            time_spent: 0,
            is_running: true,
            last_start: now,
        }
    }

    /// Credits the whole seconds elapsed since `last_start` and advances
    /// `last_start` by exactly that much, so the sub-second remainder carries
    /// over into the next fold.
    pub(crate) fn fold(&mut self, now: DateTime<Utc>) -> u64 {
        if now < self.last_start {
            self.last_start = now;
            return 0;
        }

        let seconds = whole_seconds_between(self.last_start, now);
        self.time_spent += seconds;
        self.last_start += Duration::seconds(seconds as i64);
        seconds
    }

    /// Credits the whole gap since `last_start` and restarts the interval at
    /// `now`, discarding any remainder.
    pub(crate) fn fold_gap(&mut self, now: DateTime<Utc>) -> u64 {
        let seconds = whole_seconds_between(self.last_start, now);
        self.time_spent += seconds;
        self.last_start = now;
        seconds
    }

    pub(crate) fn pause(&mut self, now: DateTime<Utc>) -> u64 {
        if !self.is_running {
            return 0;
        }
        let seconds = self.fold(now);
        self.is_running = false;
        seconds
    }

    pub(crate) fn resume(&mut self, now: DateTime<Utc>) {
        self.last_start = now;
        self.is_running = true;
    }
}

fn whole_seconds_between(start: DateTime<Utc>, stop: DateTime<Utc>) -> u64 {
    let millis = (stop - start).num_milliseconds();
    if millis <= 0 { 0 } else { (millis / 1000) as u64 }
}

pub fn validate_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        Err(ValidationError::EmptyName)
    } else {
        Ok(name.to_string())
    }
}

pub fn total_seconds(tasks: &[Task]) -> u64 {
    tasks.iter().map(|task| task.time_spent).sum()
}

pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / SECONDS_PER_HOUR;
    let minutes = (total_seconds % SECONDS_PER_HOUR) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Hours with two decimals, as a browser's `(seconds / 3600).toFixed(2)`
/// prints them: the quotient is rounded to an `f64` first, then to the
/// nearest hundredth of that binary value, ties going up.
pub fn format_hours(total_seconds: u64) -> String {
    let hours = total_seconds as f64 / SECONDS_PER_HOUR as f64;
    let hundredths = nearest_hundredths(hours);
    format!("{}.{:02}", hundredths / 100, hundredths % 100)
}

/// Exact `round_half_up(value * 100)` for a non-negative finite `f64`.
fn nearest_hundredths(value: f64) -> u128 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }

    // value == mantissa * 2^exponent exactly.
    let bits = value.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & ((1u64 << 52) - 1);
    let (mantissa, exponent) = if biased == 0 {
        (fraction as u128, -1074)
    } else {
        ((fraction | (1u64 << 52)) as u128, biased - 1075)
    };

    if exponent >= 0 {
        return (mantissa * 100) << exponent.min(64) as u32;
    }
    let shift = (-exponent) as u32;
    if shift > 100 {
        return 0;
    }

    // Compare 200 * value against 2n + 1, both scaled by 2^shift.
    let doubled = mantissa * 200;
    let unit = 1u128 << shift;
    let floor = (mantissa * 100) >> shift;
    if doubled >= (2 * floor + 1) * unit {
        floor + 1
    } else {
        floor
    }
}

pub fn format_total_line(total_seconds: u64) -> String {
    format!(
        "Total Time Spent: {} ({} hrs)",
        format_duration(total_seconds),
        format_hours(total_seconds)
    )
}
