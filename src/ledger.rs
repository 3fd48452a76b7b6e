use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::domain::{Task, TaskId, ValidationError, total_seconds, validate_name};
use crate::storage::{StorageError, TaskStore};
use crate::timers::TickTimers;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Told about every committed change, ticks included.
pub trait ChangeListener {
    fn ledger_changed(&mut self, tasks: &[Task], total_seconds: u64);
}

pub struct NoopListener;

impl ChangeListener for NoopListener {
    fn ledger_changed(&mut self, _tasks: &[Task], _total_seconds: u64) {}
}

/// Sole owner of the task set. At most one task is running after any call
/// returns, and every state change is saved before the call returns.
///
/// Calls that name an unknown id do nothing and succeed.
pub struct Ledger {
    tasks: Vec<Task>,
    timers: TickTimers,
    last_issued: i64,
    recovered: bool,
    store: Box<dyn TaskStore>,
    clock: Box<dyn Clock>,
    listener: Box<dyn ChangeListener>,
}

impl Ledger {
    /// Loads the persisted snapshot and runs recovery against the clock.
    pub fn open(store: Box<dyn TaskStore>, clock: Box<dyn Clock>) -> Result<Self, LedgerError> {
        let tasks = store.load()?;
        let last_issued = tasks.iter().map(|task| task.id.0).max().unwrap_or(0);
        let mut ledger = Self {
            tasks,
            timers: TickTimers::new(),
            last_issued,
            recovered: false,
            store,
            clock,
            listener: Box::new(NoopListener),
        };
        let now = ledger.clock.now();
        ledger.recover(now)?;
        Ok(ledger)
    }

    pub fn set_listener(&mut self, listener: Box<dyn ChangeListener>) {
        self.listener = listener;
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn running_task(&self) -> Option<&Task> {
        self.tasks.iter().find(|task| task.is_running)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn total_time(&self) -> u64 {
        total_seconds(&self.tasks)
    }

    pub fn add(&mut self, name: &str) -> Result<TaskId, LedgerError> {
        let name = validate_name(name)?;
        let now = self.clock.now();

        self.pause_all(now);
        let id = self.issue_id(now);
        self.tasks.push(Task::started(id, name, now));
        self.timers.arm(id, now);

        tracing::info!(task_id = %id, "added task");
        self.commit()?;
        Ok(id)
    }

    pub fn toggle(&mut self, id: TaskId) -> Result<(), LedgerError> {
        let Some(index) = self.index_of(id) else {
            tracing::debug!(task_id = %id, "toggle ignored, no such task");
            return Ok(());
        };
        let now = self.clock.now();

        if self.tasks[index].is_running {
            self.timers.cancel(id);
            let seconds = self.tasks[index].pause(now);
            tracing::info!(task_id = %id, seconds, "paused task");
        } else {
            self.pause_all(now);
            self.tasks[index].resume(now);
            self.timers.arm(id, now);
            tracing::info!(task_id = %id, "started task");
        }

        self.commit()
    }

    /// Folds the elapsed running interval of `id`. Only a task whose tick is
    /// armed can be folded; pausing or removing a task cancels its tick.
    pub fn tick(&mut self, id: TaskId) -> Result<(), LedgerError> {
        if !self.timers.is_armed(id) {
            return Ok(());
        }
        let Some(index) = self.index_of(id) else {
            return Ok(());
        };
        let now = self.clock.now();

        let seconds = self.tasks[index].fold(now);
        self.timers.arm(id, now);
        tracing::debug!(task_id = %id, seconds, "tick");
        self.commit()
    }

    /// Fires every tick that has come due; returns how many fired.
    pub fn run_due_ticks(&mut self) -> Result<usize, LedgerError> {
        let due = self.timers.due(self.clock.now());
        for id in &due {
            self.tick(*id)?;
        }
        Ok(due.len())
    }

    pub fn next_tick_at(&self) -> Option<DateTime<Utc>> {
        self.timers.next_due()
    }

    pub fn rename(&mut self, id: TaskId, new_name: &str) -> Result<(), LedgerError> {
        let Ok(name) = validate_name(new_name) else {
            tracing::debug!(task_id = %id, "rename ignored, blank name");
            return Ok(());
        };
        let Some(index) = self.index_of(id) else {
            tracing::debug!(task_id = %id, "rename ignored, no such task");
            return Ok(());
        };

        self.tasks[index].name = name;
        tracing::info!(task_id = %id, "renamed task");
        self.commit()
    }

    pub fn remove(&mut self, id: TaskId) -> Result<(), LedgerError> {
        let Some(index) = self.index_of(id) else {
            tracing::debug!(task_id = %id, "remove ignored, no such task");
            return Ok(());
        };

        self.timers.cancel(id);
        self.tasks.remove(index);
        tracing::info!(task_id = %id, "removed task");
        self.commit()
    }

    /// Credits running tasks with the time that passed while no session was
    /// alive, then resumes their ticks. Runs once per ledger; later calls do
    /// nothing.
    pub fn recover(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.recovered {
            tracing::warn!("recovery already ran for this session");
            return Ok(());
        }
        self.recovered = true;

        let keep_running = self
            .tasks
            .iter()
            .filter(|task| task.is_running)
            .max_by_key(|task| (task.last_start, task.id))
            .map(|task| task.id);
        let Some(keep_running) = keep_running else {
            return Ok(());
        };

        for task in self.tasks.iter_mut().filter(|task| task.is_running) {
            let seconds = task.fold_gap(now);
            tracing::info!(task_id = %task.id, seconds, "recovered time from previous session");
            if task.id == keep_running {
                self.timers.arm(task.id, now);
            } else {
                task.is_running = false;
                tracing::warn!(task_id = %task.id, "snapshot had several running tasks, pausing");
            }
        }

        self.commit()
    }

    fn index_of(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    /// Cancels every tick before folding, so no paused task can still fire.
    fn pause_all(&mut self, now: DateTime<Utc>) {
        for task in self.tasks.iter_mut().filter(|task| task.is_running) {
            self.timers.cancel(task.id);
            let seconds = task.pause(now);
            tracing::info!(task_id = %task.id, seconds, "paused task");
        }
    }

    fn issue_id(&mut self, now: DateTime<Utc>) -> TaskId {
        let id = now.timestamp_millis().max(self.last_issued + 1);
        self.last_issued = id;
        TaskId(id)
    }

    fn commit(&mut self) -> Result<(), LedgerError> {
        self.store.save(&self.tasks)?;
        let total = self.total_time();
        self.listener.ledger_changed(&self.tasks, total);
        Ok(())
    }
}
