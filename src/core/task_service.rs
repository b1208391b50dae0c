use tracing::debug;

use crate::core::events::{record, EventContext};
use crate::core::validation::{self, require_task};
use crate::error::{EpicError, Result};
use crate::id::{PhaseId, TaskId};
use crate::status::{EntityKind, TaskStatus};
use crate::types::{Epic, EventKind, Task, Timestamp};

pub struct TaskService<'a> {
    epic: &'a mut Epic,
}

impl<'a> TaskService<'a> {
    pub fn new(epic: &'a mut Epic) -> Self {
        Self { epic }
    }

    pub fn get(&self, id: &TaskId) -> Result<Task> {
        require_task(self.epic, id).cloned()
    }

    pub fn start(&mut self, id: &TaskId, at: Timestamp) -> Result<Task> {
        validation::start_task(self.epic, id)?;

        let task = self.task_mut(id)?;
        task.status = TaskStatus::Active;
        task.started_at = Some(at);
        let data = format!("Task {} started: {}", task.id, task.name);
        let context = EventContext::task(&task.phase_id, id);

        debug!(task_id = %id, "task started");
        record(self.epic, EventKind::TaskStarted, data, at, context);
        self.get(id)
    }

    pub fn complete(&mut self, id: &TaskId, at: Timestamp) -> Result<Task> {
        validation::complete_task(self.epic, id)?;
        let started_at = require_task(self.epic, id)?.started_at;
        validation::ensure_not_before(EntityKind::Task, id, started_at, at)?;

        let task = self.task_mut(id)?;
        task.status = TaskStatus::Completed;
        task.completed_at = Some(at);
        let data = format!("Task {} completed: {}", task.id, task.name);
        let context = EventContext::task(&task.phase_id, id);

        debug!(task_id = %id, "task completed");
        record(self.epic, EventKind::TaskCompleted, data, at, context);
        self.get(id)
    }

    pub fn cancel(&mut self, id: &TaskId, reason: &str, at: Timestamp) -> Result<Task> {
        let reason = reason.trim();
        validation::cancel_task(self.epic, id, reason)?;
        let started_at = require_task(self.epic, id)?.started_at;
        validation::ensure_not_before(EntityKind::Task, id, started_at, at)?;

        let task = self.task_mut(id)?;
        task.status = TaskStatus::Cancelled;
        task.cancelled_at = Some(at);
        task.cancellation_reason = Some(reason.to_string());
        let context = EventContext::task(&task.phase_id, id);

        debug!(task_id = %id, reason, "task cancelled");
        record(
            self.epic,
            EventKind::TaskCancelled,
            format!("Task {id} cancelled: {reason}"),
            at,
            context,
        );
        self.get(id)
    }

    fn task_mut(&mut self, id: &TaskId) -> Result<&mut Task> {
        self.epic
            .task_mut(id)
            .ok_or_else(|| EpicError::not_found(EntityKind::Task, id))
    }
}

/// The active task of a phase, if any.
pub fn active_task<'a>(epic: &'a Epic, phase_id: &'a PhaseId) -> Option<&'a Task> {
    epic.tasks_in_phase(phase_id)
        .find(|t| t.status == TaskStatus::Active)
}

/// Pending tasks of a phase in document order.
pub fn pending_tasks_in_phase<'a>(epic: &'a Epic, phase_id: &'a PhaseId) -> Vec<&'a Task> {
    epic.tasks_in_phase(phase_id)
        .filter(|t| t.status == TaskStatus::Pending)
        .collect()
}

pub fn tasks_in_phase<'a>(epic: &'a Epic, phase_id: &'a PhaseId) -> Vec<&'a Task> {
    epic.tasks_in_phase(phase_id).collect()
}
