use tracing::debug;

use crate::core::events::{record, EventContext};
use crate::core::validation::{self, require_phase};
use crate::error::{join_ids, EpicError, Result};
use crate::id::{PhaseId, TaskId, TestId};
use crate::status::{EntityKind, PhaseStatus, TaskStatus};
use crate::types::{Epic, EventKind, Phase, TestState, Timestamp};

pub struct PhaseService<'a> {
    epic: &'a mut Epic,
}

impl<'a> PhaseService<'a> {
    pub fn new(epic: &'a mut Epic) -> Self {
        Self { epic }
    }

    pub fn get(&self, id: &PhaseId) -> Result<Phase> {
        require_phase(self.epic, id).cloned()
    }

    pub fn start(&mut self, id: &PhaseId, at: Timestamp) -> Result<Phase> {
        validation::start_phase(self.epic, id)?;

        let phase = self.phase_mut(id)?;
        phase.status = PhaseStatus::Active;
        phase.started_at = Some(at);
        let data = format!("Phase {} started: {}", phase.id, phase.name);

        debug!(phase_id = %id, "phase started");
        record(
            self.epic,
            EventKind::PhaseStarted,
            data,
            at,
            EventContext::phase(id),
        );
        self.get(id)
    }

    pub fn complete(&mut self, id: &PhaseId, at: Timestamp) -> Result<Phase> {
        validation::complete_phase(self.epic, id)?;
        let started_at = require_phase(self.epic, id)?.started_at;
        validation::ensure_not_before(EntityKind::Phase, id, started_at, at)?;

        let phase = self.phase_mut(id)?;
        phase.status = PhaseStatus::Completed;
        phase.completed_at = Some(at);
        let data = format!("Phase {} completed: {}", phase.id, phase.name);

        debug!(phase_id = %id, "phase completed");
        record(
            self.epic,
            EventKind::PhaseCompleted,
            data,
            at,
            EventContext::phase(id),
        );
        self.get(id)
    }

    /// Cancel a phase along with its unfinished tasks and unsettled tests.
    ///
    /// The cascade is recorded as one `phase_cancelled` event listing every
    /// entity it touched.
    pub fn cancel(&mut self, id: &PhaseId, reason: &str, at: Timestamp) -> Result<Phase> {
        let reason = reason.trim();
        validation::cancel_phase(self.epic, id, reason)?;
        let started_at = require_phase(self.epic, id)?.started_at;
        validation::ensure_not_before(EntityKind::Phase, id, started_at, at)?;
        for task in self.epic.tasks_in_phase(id).filter(|t| !t.status.is_finished()) {
            validation::ensure_not_before(EntityKind::Task, &task.id, task.started_at, at)?;
        }
        for test in self.epic.tests_in_phase(id).filter(|t| !t.status().is_settled()) {
            validation::ensure_not_before(EntityKind::Test, &test.id, test.started_at, at)?;
        }

        let mut cancelled_tasks: Vec<TaskId> = Vec::new();
        for task in self.epic.tasks.iter_mut().filter(|t| &t.phase_id == id) {
            if !task.status.is_finished() {
                task.status = TaskStatus::Cancelled;
                task.cancelled_at = Some(at);
                task.cancellation_reason = Some(reason.to_string());
                cancelled_tasks.push(task.id.clone());
            }
        }

        let mut cancelled_tests: Vec<TestId> = Vec::new();
        for test in self.epic.tests.iter_mut().filter(|t| &t.phase_id == id) {
            if !test.status().is_settled() {
                test.state = TestState::Cancelled {
                    reason: reason.to_string(),
                    result: test.result(),
                };
                test.cancelled_at = Some(at);
                cancelled_tests.push(test.id.clone());
            }
        }

        let phase = self.phase_mut(id)?;
        phase.status = PhaseStatus::Cancelled;
        phase.cancelled_at = Some(at);
        phase.cancellation_reason = Some(reason.to_string());

        let mut data = format!("Phase {id} cancelled: {reason}");
        if !cancelled_tasks.is_empty() {
            data.push_str(&format!("; tasks {}", join_ids(&cancelled_tasks)));
        }
        if !cancelled_tests.is_empty() {
            data.push_str(&format!("; tests {}", join_ids(&cancelled_tests)));
        }

        debug!(
            phase_id = %id,
            tasks = cancelled_tasks.len(),
            tests = cancelled_tests.len(),
            "phase cancelled"
        );
        record(
            self.epic,
            EventKind::PhaseCancelled,
            data,
            at,
            EventContext::phase(id),
        );
        self.get(id)
    }

    fn phase_mut(&mut self, id: &PhaseId) -> Result<&mut Phase> {
        self.epic
            .phase_mut(id)
            .ok_or_else(|| EpicError::not_found(EntityKind::Phase, id))
    }
}

/// The unique active phase, if any.
pub fn active_phase(epic: &Epic) -> Option<&Phase> {
    epic.phases.iter().find(|p| p.status == PhaseStatus::Active)
}

/// First pending phase in document order.
pub fn first_pending_phase(epic: &Epic) -> Option<&Phase> {
    epic.phases.iter().find(|p| p.status == PhaseStatus::Pending)
}
