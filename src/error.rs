use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::id::{PhaseId, TaskId, TestId};
use crate::status::{EntityKind, PhaseStatus, TaskStatus};

/// Why a task could not be started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskConstraintReason {
    /// The task's phase is not the active phase.
    PhaseNotActive {
        phase_id: PhaseId,
        phase_status: PhaseStatus,
    },
    /// Another task in the same phase is already active.
    ActiveTaskExists { active_task_id: TaskId },
}

impl fmt::Display for TaskConstraintReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PhaseNotActive {
                phase_id,
                phase_status,
            } => write!(f, "phase {phase_id} is {phase_status}, not active"),
            Self::ActiveTaskExists { active_task_id } => {
                write!(f, "task {active_task_id} is already active in this phase")
            }
        }
    }
}

/// Stable, machine-readable error classification.
///
/// Used as the key for hint overrides and in JSON error output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidTransition,
    PhaseConstraint,
    TaskConstraint,
    PhaseIncomplete,
    TaskIncomplete,
    EpicIncomplete,
    PhaseTestDependency,
    PhaseTestPrerequisite,
    TestPrerequisite,
    Validation,
    Io,
    Config,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidTransition => "invalid_transition",
            Self::PhaseConstraint => "phase_constraint",
            Self::TaskConstraint => "task_constraint",
            Self::PhaseIncomplete => "phase_incomplete",
            Self::TaskIncomplete => "task_incomplete",
            Self::EpicIncomplete => "epic_incomplete",
            Self::PhaseTestDependency => "phase_test_dependency",
            Self::PhaseTestPrerequisite => "phase_test_prerequisite",
            Self::TestPrerequisite => "test_prerequisite",
            Self::Validation => "validation",
            Self::Io => "io",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn join_ids<T: fmt::Display>(ids: &[T]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug)]
pub enum EpicError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Cannot move {kind} {id} from {from} to {to}")]
    InvalidTransition {
        kind: EntityKind,
        id: String,
        from: String,
        to: String,
    },

    #[error("Cannot start phase {requested}: phase {active_phase_id} is already active")]
    PhaseConstraint {
        requested: PhaseId,
        active_phase_id: PhaseId,
    },

    #[error("Cannot start task {task_id}: {reason}")]
    TaskConstraint {
        task_id: TaskId,
        reason: TaskConstraintReason,
    },

    #[error("Cannot complete phase {phase_id}: unfinished tasks {}", join_ids(.pending_tasks))]
    PhaseIncomplete {
        phase_id: PhaseId,
        pending_tasks: Vec<TaskId>,
    },

    #[error("Cannot complete task {task_id}: unsettled tests {}", join_ids(.pending_tests))]
    TaskIncomplete {
        task_id: TaskId,
        pending_tests: Vec<TestId>,
    },

    #[error(
        "Cannot complete epic: unfinished phases [{}], failing tests [{}]",
        join_ids(.unfinished_phases),
        join_ids(.failing_tests)
    )]
    EpicIncomplete {
        unfinished_phases: Vec<PhaseId>,
        failing_tests: Vec<TestId>,
    },

    #[error("Cannot complete phase {phase_id}: unsettled tests {}", join_ids(.incomplete_tests))]
    PhaseTestDependency {
        phase_id: PhaseId,
        incomplete_tests: Vec<TestId>,
    },

    #[error("Cannot start phase {phase_id}: prerequisite tests not done {}", join_ids(.tests))]
    PhaseTestPrerequisite { phase_id: PhaseId, tests: Vec<TestId> },

    #[error("Cannot run test {test_id}: task {task_id} is {task_status}")]
    TestPrerequisite {
        test_id: TestId,
        task_id: TaskId,
        task_status: TaskStatus,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Epic document is locked by another process: {}", .0.display())]
    Locked(PathBuf),

    #[error("No current epic - run `epic use <path>` or pass --epic")]
    NoCurrentEpic,
}

impl EpicError {
    pub fn not_found(kind: EntityKind, id: &impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::PhaseConstraint { .. } => ErrorKind::PhaseConstraint,
            Self::TaskConstraint { .. } => ErrorKind::TaskConstraint,
            Self::PhaseIncomplete { .. } => ErrorKind::PhaseIncomplete,
            Self::TaskIncomplete { .. } => ErrorKind::TaskIncomplete,
            Self::EpicIncomplete { .. } => ErrorKind::EpicIncomplete,
            Self::PhaseTestDependency { .. } => ErrorKind::PhaseTestDependency,
            Self::PhaseTestPrerequisite { .. } => ErrorKind::PhaseTestPrerequisite,
            Self::TestPrerequisite { .. } => ErrorKind::TestPrerequisite,
            Self::Validation(_) | Self::Xml(_) => ErrorKind::Validation,
            Self::Io(_) | Self::Locked(_) => ErrorKind::Io,
            Self::Json(_) | Self::NoCurrentEpic => ErrorKind::Config,
        }
    }
}

pub type Result<T> = std::result::Result<T, EpicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_incomplete_lists_pending_tasks() {
        let err = EpicError::PhaseIncomplete {
            phase_id: "P1".parse().unwrap(),
            pending_tasks: vec!["T2".parse().unwrap(), "T3".parse().unwrap()],
        };
        assert_eq!(
            err.to_string(),
            "Cannot complete phase P1: unfinished tasks T2, T3"
        );
        assert_eq!(err.kind(), ErrorKind::PhaseIncomplete);
    }

    #[test]
    fn task_constraint_renders_reason() {
        let err = EpicError::TaskConstraint {
            task_id: "T2".parse().unwrap(),
            reason: TaskConstraintReason::ActiveTaskExists {
                active_task_id: "T1".parse().unwrap(),
            },
        };
        assert_eq!(
            err.to_string(),
            "Cannot start task T2: task T1 is already active in this phase"
        );
    }

    #[test]
    fn kind_names_are_snake_case() {
        assert_eq!(ErrorKind::PhaseTestPrerequisite.as_str(), "phase_test_prerequisite");
        assert_eq!(
            serde_json::to_string(&ErrorKind::NotFound).unwrap(),
            "\"not_found\""
        );
    }

    #[test]
    fn io_errors_classified_as_io() {
        let err: EpicError = std::io::Error::other("disk on fire").into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
