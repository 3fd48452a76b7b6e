use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::domain::TaskId;

pub const TICK_PERIOD_MILLIS: i64 = 1_000;

/// Recurring one-second tick per running task, keyed by task id. A cancelled
/// entry is gone, so it can never come back as due.
#[derive(Debug, Clone)]
pub(crate) struct TickTimers {
    period: Duration,
    next_due: HashMap<TaskId, DateTime<Utc>>,
}

impl TickTimers {
    pub(crate) fn new() -> Self {
        Self {
            period: Duration::milliseconds(TICK_PERIOD_MILLIS),
            next_due: HashMap::new(),
        }
    }

    pub(crate) fn arm(&mut self, task_id: TaskId, now: DateTime<Utc>) {
        self.next_due.insert(task_id, now + self.period);
    }

    pub(crate) fn cancel(&mut self, task_id: TaskId) -> bool {
        self.next_due.remove(&task_id).is_some()
    }

    pub(crate) fn is_armed(&self, task_id: TaskId) -> bool {
        self.next_due.contains_key(&task_id)
    }

    #[cfg(test)]
    pub(crate) fn armed_count(&self) -> usize {
        self.next_due.len()
    }

    pub(crate) fn due(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        let mut due = self
            .next_due
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(task_id, _)| *task_id)
            .collect::<Vec<_>>();
        due.sort();
        due
    }

    pub(crate) fn next_due(&self) -> Option<DateTime<Utc>> {
        self.next_due.values().min().copied()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::TickTimers;
    use crate::domain::TaskId;

    #[test]
    fn armed_timer_becomes_due_after_one_period() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let mut timers = TickTimers::new();
        timers.arm(TaskId(7), now);

        assert!(timers.due(now + Duration::milliseconds(999)).is_empty());
        assert_eq!(timers.due(now + Duration::seconds(1)), vec![TaskId(7)]);
        assert_eq!(timers.next_due(), Some(now + Duration::seconds(1)));
    }

    #[test]
    fn cancelled_timer_is_never_due() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let mut timers = TickTimers::new();
        timers.arm(TaskId(7), now);

        assert!(timers.cancel(TaskId(7)));
        assert!(!timers.cancel(TaskId(7)));
        assert!(!timers.is_armed(TaskId(7)));
        assert!(timers.due(now + Duration::hours(1)).is_empty());
        assert_eq!(timers.next_due(), None);
    }
}
