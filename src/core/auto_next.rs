//! Picks and performs the next legal action on an epic.
//!
//! Planning is pure ([`recommend`]); [`AutoNext::run`] executes the plan
//! through the phase and task services. One call completes at most one
//! phase and starts at most one phase.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::core::phase_service::{active_phase, first_pending_phase, PhaseService};
use crate::core::task_service::{active_task, TaskService};
use crate::core::validation::unmet_prerequisites;
use crate::error::{join_ids, Result};
use crate::id::{PhaseId, TaskId, TestId};
use crate::status::{EpicStatus, PhaseStatus, TaskStatus};
use crate::types::{Epic, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    StartPhase,
    StartTask,
    NoWork,
    CompleteEpic,
}

impl NextAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StartPhase => "start_phase",
            Self::StartTask => "start_task",
            Self::NoWork => "no_work",
            Self::CompleteEpic => "complete_epic",
        }
    }
}

impl fmt::Display for NextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Plan {
    EpicFinished,
    TaskInProgress {
        phase_id: PhaseId,
        task_id: TaskId,
    },
    StartTask {
        phase_id: PhaseId,
        task_id: TaskId,
    },
    Stalled {
        phase_id: PhaseId,
        empty: bool,
    },
    /// Optionally close the active phase, then open the next pending one.
    /// `start: None` means nothing is left and the epic can complete.
    Advance {
        complete: Option<PhaseId>,
        start: Option<(PhaseId, Option<TaskId>)>,
    },
    /// The next pending phase waits on prerequisite tests. A finished
    /// active phase is still closed.
    Blocked {
        complete: Option<PhaseId>,
        phase_id: PhaseId,
        tests: Vec<TestId>,
    },
    /// Every phase is finished but the epic was never started.
    Unstarted { complete: Option<PhaseId> },
}

fn first_pending_task(epic: &Epic, phase_id: &PhaseId) -> Option<TaskId> {
    epic.tasks_in_phase(phase_id)
        .find(|t| t.status == TaskStatus::Pending)
        .map(|t| t.id.clone())
}

fn plan(epic: &Epic) -> Plan {
    if epic.status == EpicStatus::Completed {
        return Plan::EpicFinished;
    }

    let mut complete = None;
    if let Some(phase) = active_phase(epic) {
        if let Some(task) = active_task(epic, &phase.id) {
            return Plan::TaskInProgress {
                phase_id: phase.id.clone(),
                task_id: task.id.clone(),
            };
        }
        if let Some(task_id) = first_pending_task(epic, &phase.id) {
            return Plan::StartTask {
                phase_id: phase.id.clone(),
                task_id,
            };
        }
        let mut tasks = epic.tasks_in_phase(&phase.id).peekable();
        let empty = tasks.peek().is_none();
        if empty || !tasks.all(|t| t.status.is_finished()) {
            return Plan::Stalled {
                phase_id: phase.id.clone(),
                empty,
            };
        }
        complete = Some(phase.id.clone());
    }

    match first_pending_phase(epic) {
        Some(phase) => {
            let tests = unmet_prerequisites(epic, phase);
            if !tests.is_empty() {
                return Plan::Blocked {
                    complete,
                    phase_id: phase.id.clone(),
                    tests,
                };
            }
            let task = first_pending_task(epic, &phase.id);
            Plan::Advance {
                complete,
                start: Some((phase.id.clone(), task)),
            }
        }
        None if epic.status == EpicStatus::Pending => Plan::Unstarted { complete },
        None => Plan::Advance {
            complete,
            start: None,
        },
    }
}

/// What auto-next would do next, without doing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub action: NextAction,
    pub phase_id: Option<PhaseId>,
    pub task_id: Option<TaskId>,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.action, &self.phase_id, &self.task_id) {
            (NextAction::StartTask, _, Some(task)) => write!(f, "start_task {task}"),
            (NextAction::StartPhase, Some(phase), _) => write!(f, "start_phase {phase}"),
            (action, _, _) => write!(f, "{action}"),
        }
    }
}

pub fn recommend(epic: &Epic) -> Recommendation {
    match plan(epic) {
        Plan::EpicFinished
        | Plan::TaskInProgress { .. }
        | Plan::Stalled { .. }
        | Plan::Unstarted { .. } => Recommendation {
            action: NextAction::NoWork,
            phase_id: None,
            task_id: None,
        },
        Plan::Blocked { phase_id, .. } => Recommendation {
            action: NextAction::NoWork,
            phase_id: Some(phase_id),
            task_id: None,
        },
        Plan::StartTask { phase_id, task_id } => Recommendation {
            action: NextAction::StartTask,
            phase_id: Some(phase_id),
            task_id: Some(task_id),
        },
        Plan::Advance {
            start: Some((phase_id, task_id)),
            ..
        } => Recommendation {
            action: NextAction::StartPhase,
            phase_id: Some(phase_id),
            task_id,
        },
        Plan::Advance { start: None, .. } => Recommendation {
            action: NextAction::CompleteEpic,
            phase_id: None,
            task_id: None,
        },
    }
}

/// Outcome of one auto-next invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutoNextResult {
    pub action: NextAction,
    pub phase_id: Option<PhaseId>,
    pub task_id: Option<TaskId>,
    pub phase_name: Option<String>,
    pub task_name: Option<String>,
    pub phase_status: Option<PhaseStatus>,
    pub task_status: Option<TaskStatus>,
    pub started_at: Option<Timestamp>,
    pub auto_selected: bool,
    pub message: String,
    /// Phase closed on the way, when the active phase had no work left.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_phase_id: Option<PhaseId>,
}

impl AutoNextResult {
    fn idle(action: NextAction, message: String) -> Self {
        Self {
            action,
            phase_id: None,
            task_id: None,
            phase_name: None,
            task_name: None,
            phase_status: None,
            task_status: None,
            started_at: None,
            auto_selected: false,
            message,
            completed_phase_id: None,
        }
    }
}

pub struct AutoNext<'a> {
    epic: &'a mut Epic,
}

impl<'a> AutoNext<'a> {
    pub fn new(epic: &'a mut Epic) -> Self {
        Self { epic }
    }

    /// Execute one step. On error the epic is left as it was.
    pub fn run(&mut self, at: Timestamp) -> Result<AutoNextResult> {
        let plan = plan(self.epic);
        debug!(?plan, "auto-next plan");

        let mut draft = self.epic.clone();
        let result = execute(&mut draft, plan, at)?;
        *self.epic = draft;
        Ok(result)
    }
}

fn close_phase(epic: &mut Epic, complete: Option<&PhaseId>, at: Timestamp) -> Result<String> {
    match complete {
        Some(phase_id) => {
            PhaseService::new(epic).complete(phase_id, at)?;
            Ok(format!("Completed phase {phase_id}. "))
        }
        None => Ok(String::new()),
    }
}

fn execute(epic: &mut Epic, plan: Plan, at: Timestamp) -> Result<AutoNextResult> {
    match plan {
        Plan::EpicFinished => Ok(AutoNextResult::idle(
            NextAction::NoWork,
            format!("Epic {} is already completed", epic.id),
        )),
        Plan::TaskInProgress { phase_id, task_id } => {
            let mut result = AutoNextResult::idle(
                NextAction::NoWork,
                format!("Task {task_id} is already in progress in phase {phase_id}"),
            );
            result.phase_id = Some(phase_id);
            result.task_id = Some(task_id);
            Ok(result)
        }
        Plan::Stalled { phase_id, empty } => {
            let message = if empty {
                format!("Phase {phase_id} is active but has no tasks")
            } else {
                format!("Phase {phase_id} has no task that can be started")
            };
            let mut result = AutoNextResult::idle(NextAction::NoWork, message);
            result.phase_id = Some(phase_id);
            Ok(result)
        }
        Plan::StartTask { phase_id, task_id } => {
            let task = TaskService::new(epic).start(&task_id, at)?;
            let phase = PhaseService::new(epic).get(&phase_id)?;
            Ok(AutoNextResult {
                action: NextAction::StartTask,
                phase_id: Some(phase.id),
                task_id: Some(task.id.clone()),
                phase_name: Some(phase.name),
                task_name: Some(task.name.clone()),
                phase_status: Some(phase.status),
                task_status: Some(task.status),
                started_at: task.started_at,
                auto_selected: true,
                message: format!("Started task {}: {}", task.id, task.name),
                completed_phase_id: None,
            })
        }
        Plan::Blocked {
            complete,
            phase_id,
            tests,
        } => {
            let prefix = close_phase(epic, complete.as_ref(), at)?;
            let mut result = AutoNextResult::idle(
                NextAction::NoWork,
                format!(
                    "{prefix}Phase {phase_id} is waiting on prerequisite tests {}",
                    join_ids(&tests)
                ),
            );
            result.phase_id = Some(phase_id);
            result.completed_phase_id = complete;
            Ok(result)
        }
        Plan::Unstarted { complete } => {
            let prefix = close_phase(epic, complete.as_ref(), at)?;
            let mut result = AutoNextResult::idle(
                NextAction::NoWork,
                format!(
                    "{prefix}All phases are finished but epic {} was never started; run `epic start`",
                    epic.id
                ),
            );
            result.completed_phase_id = complete;
            Ok(result)
        }
        Plan::Advance { complete, start } => {
            let prefix = close_phase(epic, complete.as_ref(), at)?;

            let Some((phase_id, task_id)) = start else {
                let mut result = AutoNextResult::idle(
                    NextAction::CompleteEpic,
                    format!("{prefix}All phases are finished; run `epic complete`"),
                );
                result.completed_phase_id = complete;
                return Ok(result);
            };

            PhaseService::new(epic).start(&phase_id, at)?;
            let task = match &task_id {
                Some(id) => Some(TaskService::new(epic).start(id, at)?),
                None => None,
            };
            let phase = PhaseService::new(epic).get(&phase_id)?;

            let message = match &task {
                Some(task) => format!(
                    "{prefix}Started phase {} and task {}: {}",
                    phase.id, task.id, task.name
                ),
                None => format!("{prefix}Started phase {}: {}", phase.id, phase.name),
            };
            Ok(AutoNextResult {
                action: NextAction::StartPhase,
                phase_id: Some(phase.id),
                task_id: task.as_ref().map(|t| t.id.clone()),
                phase_name: Some(phase.name),
                task_name: task.as_ref().map(|t| t.name.clone()),
                phase_status: Some(phase.status),
                task_status: task.as_ref().map(|t| t.status),
                started_at: phase.started_at,
                auto_selected: true,
                message,
                completed_phase_id: complete,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testutil::{done_passing, ts, EpicBuilder};

    fn kinds(epic: &Epic) -> Vec<&str> {
        epic.events.iter().map(|e| e.kind.as_str()).collect()
    }

    #[test]
    fn empty_active_phase_is_no_work() {
        let mut epic = EpicBuilder::new("E1")
            .phase_with("P1", PhaseStatus::Active)
            .build();

        let result = AutoNext::new(&mut epic).run(ts(1)).unwrap();

        assert_eq!(result.action, NextAction::NoWork);
        assert!(result.message.contains("P1"));
        assert!(epic.events.is_empty());
    }

    #[test]
    fn advancing_from_pending_epic() {
        let mut epic = EpicBuilder::new("E1")
            .phase("P1")
            .phase("P2")
            .task("T1", "P1")
            .build();

        let result = AutoNext::new(&mut epic).run(ts(1)).unwrap();

        assert_eq!(result.action, NextAction::StartPhase);
        assert_eq!(result.phase_id.as_ref().unwrap(), "P1");
        assert_eq!(result.task_id.as_ref().unwrap(), "T1");
        assert!(result.auto_selected);
        assert_eq!(epic.phases[0].status, PhaseStatus::Active);
        assert_eq!(epic.tasks[0].status, TaskStatus::Active);
        assert_eq!(epic.status, EpicStatus::Pending);
        assert_eq!(kinds(&epic), vec!["phase_started", "task_started"]);
    }

    #[test]
    fn active_task_means_no_work() {
        let mut epic = EpicBuilder::new("E1")
            .phase_with("P1", PhaseStatus::Active)
            .task_with("T1", "P1", TaskStatus::Active)
            .task("T2", "P1")
            .build();

        let result = AutoNext::new(&mut epic).run(ts(1)).unwrap();
        assert_eq!(result.action, NextAction::NoWork);
        assert_eq!(result.task_id.as_ref().unwrap(), "T1");
        assert!(epic.events.is_empty());
    }

    #[test]
    fn starts_first_pending_task_in_document_order() {
        let mut epic = EpicBuilder::new("E1")
            .phase_with("P1", PhaseStatus::Active)
            .task_with("T1", "P1", TaskStatus::Completed)
            .task("T3", "P1")
            .task("T2", "P1")
            .build();

        let result = AutoNext::new(&mut epic).run(ts(1)).unwrap();
        assert_eq!(result.action, NextAction::StartTask);
        assert_eq!(result.task_id.as_ref().unwrap(), "T3");
        assert_eq!(result.task_status, Some(TaskStatus::Active));
    }

    #[test]
    fn finished_phase_is_closed_and_next_opened() {
        let mut epic = EpicBuilder::new("E1")
            .phase_with("P1", PhaseStatus::Active)
            .phase("P2")
            .phase("P3")
            .task_with("T1", "P1", TaskStatus::Completed)
            .task_with("T2", "P1", TaskStatus::Cancelled)
            .test_with("X1", "T1", done_passing())
            .build();

        let result = AutoNext::new(&mut epic).run(ts(5)).unwrap();

        assert_eq!(result.action, NextAction::StartPhase);
        assert_eq!(result.completed_phase_id.as_ref().unwrap(), "P1");
        assert_eq!(result.phase_id.as_ref().unwrap(), "P2");
        assert_eq!(result.task_id, None);
        assert_eq!(epic.phases[2].status, PhaseStatus::Pending);
        assert_eq!(kinds(&epic), vec!["phase_completed", "phase_started"]);
    }

    #[test]
    fn last_phase_closed_recommends_complete_epic() {
        let mut epic = EpicBuilder::new("E1")
            .status(EpicStatus::Active)
            .phase_with("P1", PhaseStatus::Active)
            .task_with("T1", "P1", TaskStatus::Completed)
            .build();

        let result = AutoNext::new(&mut epic).run(ts(5)).unwrap();
        assert_eq!(result.action, NextAction::CompleteEpic);
        assert_eq!(epic.phases[0].status, PhaseStatus::Completed);
    }

    #[test]
    fn no_work_and_complete_epic_are_idempotent() {
        let mut epic = EpicBuilder::new("E1")
            .status(EpicStatus::Active)
            .phase_with("P1", PhaseStatus::Completed)
            .build();
        let before = epic.clone();

        for _ in 0..2 {
            let result = AutoNext::new(&mut epic).run(ts(5)).unwrap();
            assert_eq!(result.action, NextAction::CompleteEpic);
        }
        assert_eq!(epic, before);
    }

    #[test]
    fn unsettled_tests_block_phase_closure() {
        let mut epic = EpicBuilder::new("E1")
            .phase_with("P1", PhaseStatus::Active)
            .phase("P2")
            .task_with("T1", "P1", TaskStatus::Cancelled)
            .test("X1", "T1")
            .build();
        let before = epic.clone();

        let err = AutoNext::new(&mut epic).run(ts(5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PhaseTestDependency);
        assert_eq!(epic, before);
    }

    #[test]
    fn blocked_next_phase_still_closes_finished_phase() {
        let mut epic = EpicBuilder::new("E1")
            .status(EpicStatus::Active)
            .phase_with("P1", PhaseStatus::Active)
            .phase("P2")
            .phase("P3")
            .prerequisite("P2", "X9")
            .task_with("T1", "P1", TaskStatus::Completed)
            .task("T9", "P3")
            .test_with("X1", "T1", done_passing())
            .test("X9", "T9")
            .build();

        let result = AutoNext::new(&mut epic).run(ts(5)).unwrap();

        assert_eq!(result.action, NextAction::NoWork);
        assert_eq!(result.completed_phase_id.as_ref().unwrap(), "P1");
        assert_eq!(result.phase_id.as_ref().unwrap(), "P2");
        assert!(result.message.contains("X9"), "{}", result.message);
        assert_eq!(epic.phases[0].status, PhaseStatus::Completed);
        assert_eq!(epic.phases[1].status, PhaseStatus::Pending);
        assert_eq!(kinds(&epic), vec!["phase_completed"]);

        let rec = recommend(&epic);
        assert_eq!(rec.action, NextAction::NoWork);
        assert_eq!(rec.phase_id.as_ref().unwrap(), "P2");
    }

    #[test]
    fn failed_step_leaves_epic_untouched() {
        let mut epic = EpicBuilder::new("E1")
            .status(EpicStatus::Active)
            .phase_with("P1", PhaseStatus::Active)
            .phase("P2")
            .task_with("T1", "P1", TaskStatus::Completed)
            .task("T2", "P2")
            .build();
        let before = epic.clone();

        // earlier than P1's start
        let err = AutoNext::new(&mut epic).run(ts(-5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(epic, before);
    }

    #[test]
    fn unstarted_epic_with_finished_phases_asks_for_start() {
        let mut epic = EpicBuilder::new("E1")
            .phase_with("P1", PhaseStatus::Completed)
            .phase_with("P2", PhaseStatus::Cancelled)
            .build();
        let before = epic.clone();

        let result = AutoNext::new(&mut epic).run(ts(5)).unwrap();
        assert_eq!(result.action, NextAction::NoWork);
        assert!(result.message.contains("epic start"), "{}", result.message);
        assert_eq!(recommend(&epic).action, NextAction::NoWork);
        assert_eq!(epic, before);
    }

    #[test]
    fn recommend_mirrors_run_without_mutating() {
        let epic = EpicBuilder::new("E1")
            .phase_with("P1", PhaseStatus::Completed)
            .phase("P2")
            .task("T4", "P2")
            .build();

        let rec = recommend(&epic);
        assert_eq!(rec.action, NextAction::StartPhase);
        assert_eq!(rec.to_string(), "start_phase P2");
        assert_eq!(rec.task_id.as_ref().unwrap(), "T4");
    }

    #[test]
    fn completed_epic_has_no_work() {
        let epic = EpicBuilder::new("E1").status(EpicStatus::Completed).build();
        assert_eq!(recommend(&epic).action, NextAction::NoWork);
    }
}
