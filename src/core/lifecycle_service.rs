use serde::Serialize;
use tracing::debug;

use crate::core::events::{record, EventContext};
use crate::core::validation;
use crate::error::Result;
use crate::id::EpicId;
use crate::status::{EntityKind, EpicStatus, TestOutcome, TestStatus, WorkStatus};
use crate::types::{Epic, EventKind, Timestamp};

/// Per-status tally for phases or tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkCounts {
    pub total: usize,
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    pub cancelled: usize,
}

impl WorkCounts {
    fn tally(statuses: impl Iterator<Item = WorkStatus>) -> Self {
        statuses.fold(Self::default(), |mut acc, status| {
            acc.total += 1;
            match status {
                WorkStatus::Pending => acc.pending += 1,
                WorkStatus::Active => acc.active += 1,
                WorkStatus::Completed => acc.completed += 1,
                WorkStatus::Cancelled => acc.cancelled += 1,
            }
            acc
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TestCounts {
    pub total: usize,
    pub pending: usize,
    pub active: usize,
    pub done: usize,
    pub cancelled: usize,
    pub passing: usize,
    pub failing: usize,
}

/// Aggregate view of an epic, returned by `complete` and shown by `status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpicSummary {
    pub epic_id: EpicId,
    pub name: String,
    pub status: EpicStatus,
    pub phases: WorkCounts,
    pub tasks: WorkCounts,
    pub tests: TestCounts,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    /// Seconds from start to completion; absent until both are known.
    pub duration_seconds: Option<i64>,
}

pub fn summarize(epic: &Epic) -> EpicSummary {
    let tests = epic.tests.iter().fold(TestCounts::default(), |mut acc, test| {
        acc.total += 1;
        match test.status() {
            TestStatus::Pending => acc.pending += 1,
            TestStatus::Active => acc.active += 1,
            TestStatus::Done => acc.done += 1,
            TestStatus::Cancelled => acc.cancelled += 1,
        }
        match test.result() {
            Some(TestOutcome::Passing) => acc.passing += 1,
            Some(TestOutcome::Failing) => acc.failing += 1,
            None => {}
        }
        acc
    });

    EpicSummary {
        epic_id: epic.id.clone(),
        name: epic.name.clone(),
        status: epic.status,
        phases: WorkCounts::tally(epic.phases.iter().map(|p| p.status)),
        tasks: WorkCounts::tally(epic.tasks.iter().map(|t| t.status)),
        tests,
        started_at: epic.started_at,
        completed_at: epic.completed_at,
        duration_seconds: match (epic.started_at, epic.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        },
    }
}

/// Starts and completes the epic itself.
pub struct LifecycleService<'a> {
    epic: &'a mut Epic,
}

impl<'a> LifecycleService<'a> {
    pub fn new(epic: &'a mut Epic) -> Self {
        Self { epic }
    }

    pub fn start(&mut self, at: Timestamp) -> Result<EpicSummary> {
        validation::start_epic(self.epic)?;

        self.epic.status = EpicStatus::Active;
        self.epic.started_at = Some(at);
        let data = format!("Epic {} started: {}", self.epic.id, self.epic.name);

        debug!(epic_id = %self.epic.id, "epic started");
        record(self.epic, EventKind::EpicStarted, data, at, EventContext::epic());
        Ok(summarize(self.epic))
    }

    pub fn complete(&mut self, at: Timestamp) -> Result<EpicSummary> {
        validation::complete_epic(self.epic)?;
        validation::ensure_not_before(EntityKind::Epic, &self.epic.id, self.epic.started_at, at)?;

        self.epic.status = EpicStatus::Completed;
        self.epic.completed_at = Some(at);
        let data = format!("Epic {} completed: {}", self.epic.id, self.epic.name);

        debug!(epic_id = %self.epic.id, "epic completed");
        record(
            self.epic,
            EventKind::EpicCompleted,
            data,
            at,
            EventContext::epic(),
        );
        Ok(summarize(self.epic))
    }
}
