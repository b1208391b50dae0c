//! Test utilities for building epics in a known state.

use chrono::{Duration, TimeZone, Utc};

use crate::id::{EpicId, PhaseId, TaskId, TestId};
use crate::status::{EpicStatus, PhaseStatus, TaskStatus, TestOutcome};
use crate::types::{Epic, Phase, Task, Test, TestState, Timestamp};

/// Fixed clock: 2024-01-01T00:00:00Z plus `minutes`.
pub fn ts(minutes: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid base timestamp")
        + Duration::minutes(minutes)
}

fn pid(raw: &str) -> PhaseId {
    raw.parse().expect("valid phase id")
}

fn tid(raw: &str) -> TaskId {
    raw.parse().expect("valid task id")
}

fn xid(raw: &str) -> TestId {
    raw.parse().expect("valid test id")
}

/// Fluent builder for epics used across unit tests.
///
/// Entities are appended in call order, which is also document order.
pub struct EpicBuilder {
    epic: Epic,
}

impl EpicBuilder {
    pub fn new(id: &str) -> Self {
        let id: EpicId = id.parse().expect("valid epic id");
        Self {
            epic: Epic::new(id, "Test epic", ts(0)),
        }
    }

    pub fn status(mut self, status: EpicStatus) -> Self {
        self.epic.status = status;
        if status != EpicStatus::Pending {
            self.epic.started_at = Some(ts(0));
        }
        self
    }

    pub fn phase(self, id: &str) -> Self {
        self.phase_with(id, PhaseStatus::Pending)
    }

    pub fn phase_with(mut self, id: &str, status: PhaseStatus) -> Self {
        let mut phase = Phase::new(pid(id), format!("Phase {id}"));
        phase.status = status;
        if status != PhaseStatus::Pending {
            phase.started_at = Some(ts(0));
        }
        self.epic.phases.push(phase);
        self
    }

    /// Mark `test` as a prerequisite for starting `phase`.
    pub fn prerequisite(mut self, phase: &str, test: &str) -> Self {
        if let Some(p) = self.epic.phase_mut(&pid(phase)) {
            p.prerequisite_tests.push(xid(test));
        }
        self
    }

    pub fn task(self, id: &str, phase: &str) -> Self {
        self.task_with(id, phase, TaskStatus::Pending)
    }

    pub fn task_with(mut self, id: &str, phase: &str, status: TaskStatus) -> Self {
        let mut task = Task::new(tid(id), pid(phase), format!("Task {id}"));
        task.status = status;
        if status != TaskStatus::Pending {
            task.started_at = Some(ts(0));
        }
        if status == TaskStatus::Cancelled {
            task.cancellation_reason = Some("not needed".to_string());
        }
        self.epic.tasks.push(task);
        self
    }

    pub fn test(self, id: &str, task: &str) -> Self {
        self.test_with(id, task, TestState::Pending)
    }

    pub fn test_with(mut self, id: &str, task: &str, state: TestState) -> Self {
        let task_id = tid(task);
        let phase_id = self
            .epic
            .task(&task_id)
            .map(|t| t.phase_id.clone())
            .expect("test fixture references a declared task");
        let mut test = Test::new(xid(id), task_id, phase_id, format!("Test {id}"));
        if state != TestState::Pending {
            test.started_at = Some(ts(0));
        }
        test.state = state;
        self.epic.tests.push(test);
        self
    }

    pub fn build(self) -> Epic {
        self.epic
    }
}

pub fn done_passing() -> TestState {
    TestState::Done {
        result: TestOutcome::Passing,
    }
}

pub fn active_failing() -> TestState {
    TestState::Active {
        result: Some(TestOutcome::Failing),
    }
}

pub fn cancelled(reason: &str) -> TestState {
    TestState::Cancelled {
        reason: reason.to_string(),
        result: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_derives_test_phase_from_task() {
        let epic = EpicBuilder::new("E1")
            .phase("P1")
            .task("T1", "P1")
            .test("X1", "T1")
            .build();
        assert_eq!(epic.tests[0].phase_id, "P1");
        assert_eq!(epic.tests[0].task_id, "T1");
    }

    #[test]
    fn builder_preserves_document_order() {
        let epic = EpicBuilder::new("E1")
            .phase("P2")
            .phase("P1")
            .task("T9", "P1")
            .task("T1", "P1")
            .build();
        let phases: Vec<&str> = epic.phases.iter().map(|p| p.id.as_str()).collect();
        let tasks: Vec<&str> = epic.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(phases, vec!["P2", "P1"]);
        assert_eq!(tasks, vec!["T9", "T1"]);
    }

    #[test]
    fn ts_is_minute_granular() {
        assert_eq!((ts(5) - ts(0)).num_minutes(), 5);
    }
}
