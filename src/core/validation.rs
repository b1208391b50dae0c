//! Precondition checks for every workflow transition.
//!
//! Each check takes the whole epic plus the target id and either returns
//! `Ok(())` or the typed failure. Nothing here mutates state.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

use crate::error::{EpicError, Result, TaskConstraintReason};
use crate::id::{PhaseId, TaskId, TestId};
use crate::status::{ensure_transition, EntityKind, EpicStatus, PhaseStatus, TaskStatus, TestStatus};
use crate::types::{Epic, Phase, Task, Test, Timestamp};

pub(crate) fn require_phase<'a>(epic: &'a Epic, id: &PhaseId) -> Result<&'a Phase> {
    epic.phase(id)
        .ok_or_else(|| EpicError::not_found(EntityKind::Phase, id))
}

pub(crate) fn require_task<'a>(epic: &'a Epic, id: &TaskId) -> Result<&'a Task> {
    epic.task(id)
        .ok_or_else(|| EpicError::not_found(EntityKind::Task, id))
}

pub(crate) fn require_test<'a>(epic: &'a Epic, id: &TestId) -> Result<&'a Test> {
    epic.test(id)
        .ok_or_else(|| EpicError::not_found(EntityKind::Test, id))
}

/// Reasons for cancellation and failure must carry some text.
pub(crate) fn require_reason(kind: EntityKind, id: &impl fmt::Display, reason: &str) -> Result<()> {
    if reason.trim().is_empty() {
        return Err(EpicError::validation(format!(
            "a reason is required to cancel or fail {kind} {id}"
        )));
    }
    Ok(())
}

/// An end timestamp may not precede the matching start timestamp.
pub(crate) fn ensure_not_before(
    kind: EntityKind,
    id: &impl fmt::Display,
    started_at: Option<Timestamp>,
    at: Timestamp,
) -> Result<()> {
    match started_at {
        Some(started) if at < started => Err(EpicError::validation(format!(
            "{kind} {id}: timestamp {} precedes start {}",
            at.to_rfc3339(),
            started.to_rfc3339()
        ))),
        _ => Ok(()),
    }
}

// ============ Epic ============

pub fn start_epic(epic: &Epic) -> Result<()> {
    ensure_transition(EntityKind::Epic, &epic.id, epic.status, EpicStatus::Active)
}

pub fn complete_epic(epic: &Epic) -> Result<()> {
    ensure_transition(EntityKind::Epic, &epic.id, epic.status, EpicStatus::Completed)?;

    let unfinished_phases: Vec<PhaseId> = epic
        .phases
        .iter()
        .filter(|p| !p.status.is_finished())
        .map(|p| p.id.clone())
        .collect();
    let failing_tests: Vec<TestId> = epic
        .tests
        .iter()
        .filter(|t| t.is_failing())
        .map(|t| t.id.clone())
        .collect();

    if !unfinished_phases.is_empty() || !failing_tests.is_empty() {
        return Err(EpicError::EpicIncomplete {
            unfinished_phases,
            failing_tests,
        });
    }
    Ok(())
}

// ============ Phase ============

/// Prerequisite tests of `phase` that are not done yet.
pub fn unmet_prerequisites(epic: &Epic, phase: &Phase) -> Vec<TestId> {
    phase
        .prerequisite_tests
        .iter()
        .filter(|test_id| {
            epic.test(test_id)
                .map_or(true, |t| t.status() != TestStatus::Done)
        })
        .cloned()
        .collect()
}

pub fn start_phase(epic: &Epic, phase_id: &PhaseId) -> Result<()> {
    let phase = require_phase(epic, phase_id)?;
    ensure_transition(EntityKind::Phase, &phase.id, phase.status, PhaseStatus::Active)?;

    if let Some(active) = epic
        .phases
        .iter()
        .find(|p| p.status == PhaseStatus::Active && &p.id != phase_id)
    {
        return Err(EpicError::PhaseConstraint {
            requested: phase_id.clone(),
            active_phase_id: active.id.clone(),
        });
    }

    let blocking = unmet_prerequisites(epic, phase);
    if !blocking.is_empty() {
        return Err(EpicError::PhaseTestPrerequisite {
            phase_id: phase_id.clone(),
            tests: blocking,
        });
    }

    Ok(())
}

pub fn complete_phase(epic: &Epic, phase_id: &PhaseId) -> Result<()> {
    let phase = require_phase(epic, phase_id)?;
    ensure_transition(
        EntityKind::Phase,
        &phase.id,
        phase.status,
        PhaseStatus::Completed,
    )?;

    let pending_tasks: Vec<TaskId> = epic
        .tasks_in_phase(phase_id)
        .filter(|t| !t.status.is_finished())
        .map(|t| t.id.clone())
        .collect();
    if !pending_tasks.is_empty() {
        return Err(EpicError::PhaseIncomplete {
            phase_id: phase_id.clone(),
            pending_tasks,
        });
    }

    let incomplete_tests: Vec<TestId> = epic
        .tests_in_phase(phase_id)
        .filter(|t| !t.status().is_settled())
        .map(|t| t.id.clone())
        .collect();
    if !incomplete_tests.is_empty() {
        return Err(EpicError::PhaseTestDependency {
            phase_id: phase_id.clone(),
            incomplete_tests,
        });
    }

    Ok(())
}

pub fn cancel_phase(epic: &Epic, phase_id: &PhaseId, reason: &str) -> Result<()> {
    let phase = require_phase(epic, phase_id)?;
    ensure_transition(
        EntityKind::Phase,
        &phase.id,
        phase.status,
        PhaseStatus::Cancelled,
    )?;
    require_reason(EntityKind::Phase, phase_id, reason)
}

// ============ Task ============

pub fn start_task(epic: &Epic, task_id: &TaskId) -> Result<()> {
    let task = require_task(epic, task_id)?;
    ensure_transition(EntityKind::Task, &task.id, task.status, TaskStatus::Active)?;

    let phase = require_phase(epic, &task.phase_id)?;
    if phase.status != PhaseStatus::Active {
        return Err(EpicError::TaskConstraint {
            task_id: task_id.clone(),
            reason: TaskConstraintReason::PhaseNotActive {
                phase_id: phase.id.clone(),
                phase_status: phase.status,
            },
        });
    }

    if let Some(active) = epic
        .tasks_in_phase(&phase.id)
        .find(|t| t.status == TaskStatus::Active && &t.id != task_id)
    {
        return Err(EpicError::TaskConstraint {
            task_id: task_id.clone(),
            reason: TaskConstraintReason::ActiveTaskExists {
                active_task_id: active.id.clone(),
            },
        });
    }

    Ok(())
}

pub fn complete_task(epic: &Epic, task_id: &TaskId) -> Result<()> {
    let task = require_task(epic, task_id)?;
    ensure_transition(EntityKind::Task, &task.id, task.status, TaskStatus::Completed)?;

    let pending_tests: Vec<TestId> = epic
        .tests_for_task(task_id)
        .filter(|t| !t.status().is_settled())
        .map(|t| t.id.clone())
        .collect();
    if !pending_tests.is_empty() {
        return Err(EpicError::TaskIncomplete {
            task_id: task_id.clone(),
            pending_tests,
        });
    }

    Ok(())
}

pub fn cancel_task(epic: &Epic, task_id: &TaskId, reason: &str) -> Result<()> {
    let task = require_task(epic, task_id)?;
    ensure_transition(EntityKind::Task, &task.id, task.status, TaskStatus::Cancelled)?;
    require_reason(EntityKind::Task, task_id, reason)
}

// ============ Test ============

/// A test may only run while its task is active or completed.
fn ensure_task_runnable(epic: &Epic, test: &Test) -> Result<()> {
    let task = require_task(epic, &test.task_id)?;
    if matches!(task.status, TaskStatus::Active | TaskStatus::Completed) {
        Ok(())
    } else {
        Err(EpicError::TestPrerequisite {
            test_id: test.id.clone(),
            task_id: task.id.clone(),
            task_status: task.status,
        })
    }
}

/// Only a pending test can be started. Reopening a done test goes through
/// `fail_test`, which checks the task gate.
pub fn start_test(epic: &Epic, test_id: &TestId) -> Result<()> {
    let test = require_test(epic, test_id)?;
    if test.status() != TestStatus::Pending {
        return Err(EpicError::InvalidTransition {
            kind: EntityKind::Test,
            id: test.id.to_string(),
            from: test.status().to_string(),
            to: TestStatus::Active.to_string(),
        });
    }
    ensure_task_runnable(epic, test)
}

/// Pass is allowed from active, from done (re-pass), and from pending, in
/// which case the test is started implicitly.
pub fn pass_test(epic: &Epic, test_id: &TestId) -> Result<()> {
    let test = require_test(epic, test_id)?;
    match test.status() {
        TestStatus::Active | TestStatus::Done => Ok(()),
        TestStatus::Pending => ensure_task_runnable(epic, test),
        TestStatus::Cancelled => Err(EpicError::InvalidTransition {
            kind: EntityKind::Test,
            id: test.id.to_string(),
            from: TestStatus::Cancelled.to_string(),
            to: TestStatus::Done.to_string(),
        }),
    }
}

/// Fail is allowed from active, from pending (implicit start) and from done,
/// which reopens the test as a regression. A done test under a completed
/// task cannot regress because the task gate has already closed.
pub fn fail_test(epic: &Epic, test_id: &TestId, reason: &str) -> Result<()> {
    let test = require_test(epic, test_id)?;
    match test.status() {
        TestStatus::Active => {}
        TestStatus::Pending => ensure_task_runnable(epic, test)?,
        TestStatus::Done => {
            let task = require_task(epic, &test.task_id)?;
            if task.status != TaskStatus::Active {
                return Err(EpicError::TestPrerequisite {
                    test_id: test.id.clone(),
                    task_id: task.id.clone(),
                    task_status: task.status,
                });
            }
        }
        TestStatus::Cancelled => {
            ensure_transition(EntityKind::Test, &test.id, TestStatus::Cancelled, TestStatus::Active)?;
        }
    }
    require_reason(EntityKind::Test, test_id, reason)
}

pub fn cancel_test(epic: &Epic, test_id: &TestId, reason: &str) -> Result<()> {
    let test = require_test(epic, test_id)?;
    ensure_transition(EntityKind::Test, &test.id, test.status(), TestStatus::Cancelled)?;
    require_reason(EntityKind::Test, test_id, reason)
}

// ============ Document structure ============

fn first_duplicate<'a, T: Eq + Hash + 'a>(ids: impl Iterator<Item = &'a T>) -> Option<&'a T> {
    let mut seen = HashSet::new();
    ids.into_iter().find(|id| !seen.insert(*id))
}

/// Structural checks applied whenever a document is loaded.
pub fn validate_document(epic: &Epic) -> Result<()> {
    if let Some(dup) = first_duplicate(epic.phases.iter().map(|p| &p.id)) {
        return Err(EpicError::validation(format!("duplicate phase id {dup}")));
    }
    if let Some(dup) = first_duplicate(epic.tasks.iter().map(|t| &t.id)) {
        return Err(EpicError::validation(format!("duplicate task id {dup}")));
    }
    if let Some(dup) = first_duplicate(epic.tests.iter().map(|t| &t.id)) {
        return Err(EpicError::validation(format!("duplicate test id {dup}")));
    }
    if let Some(dup) = first_duplicate(epic.events.iter().map(|e| &e.id)) {
        return Err(EpicError::validation(format!("duplicate event id {dup}")));
    }

    for task in &epic.tasks {
        if epic.phase(&task.phase_id).is_none() {
            return Err(EpicError::validation(format!(
                "task {} references unknown phase {}",
                task.id, task.phase_id
            )));
        }
    }

    for test in &epic.tests {
        let task = epic.task(&test.task_id).ok_or_else(|| {
            EpicError::validation(format!(
                "test {} references unknown task {}",
                test.id, test.task_id
            ))
        })?;
        if task.phase_id != test.phase_id {
            return Err(EpicError::validation(format!(
                "test {} declares phase {} but task {} belongs to phase {}",
                test.id, test.phase_id, task.id, task.phase_id
            )));
        }
    }

    for phase in &epic.phases {
        if let Some(missing) = phase
            .prerequisite_tests
            .iter()
            .find(|test_id| epic.test(test_id).is_none())
        {
            return Err(EpicError::validation(format!(
                "phase {} lists unknown prerequisite test {}",
                phase.id, missing
            )));
        }
    }

    Ok(())
}
