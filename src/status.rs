//! Status enumerations and legal-transition tables for every entity kind.
//!
//! ```text
//! Epic:  pending → active → completed
//! Phase: pending → active | cancelled;  active → completed | cancelled
//! Task:  pending → active | cancelled;  active → completed | cancelled
//! Test:  pending → active | cancelled;  active → done | cancelled;  done → active
//! ```
//!
//! Documents written by older tooling use `planning` / `wip` / `done`; those
//! names are accepted on read and projected onto the canonical set.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EpicError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Epic,
    Phase,
    Task,
    Test,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Phase => "phase",
            Self::Task => "task",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared behaviour of the per-entity status enums.
pub trait Lifecycle: Copy + Eq + fmt::Display {
    fn can_transition_to(self, target: Self) -> bool;

    fn is_terminal(self) -> bool;
}

/// Fail with `InvalidTransition` unless `from → to` is in the table.
pub fn ensure_transition<S: Lifecycle>(
    kind: EntityKind,
    id: &impl fmt::Display,
    from: S,
    to: S,
) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(EpicError::InvalidTransition {
            kind,
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

// ============ Epic ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpicStatus {
    Pending,
    Active,
    Completed,
}

impl EpicStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    /// Parse a wire value, accepting legacy names.
    pub fn parse_wire(raw: &str) -> Option<Self> {
        match raw {
            "pending" | "planning" => Some(Self::Pending),
            "active" | "wip" => Some(Self::Active),
            "completed" | "done" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl Lifecycle for EpicStatus {
    fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Active) | (Self::Active, Self::Completed)
        )
    }

    fn is_terminal(self) -> bool {
        self == Self::Completed
    }
}

impl fmt::Display for EpicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Phase / Task ============

/// Phases and tasks share the same four-state lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl WorkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse a wire value, projecting `planning`/`wip`/`done`.
    pub fn parse_wire(raw: &str) -> Option<Self> {
        match raw {
            "pending" | "planning" => Some(Self::Pending),
            "active" | "wip" => Some(Self::Active),
            "completed" | "done" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Completed or cancelled: no further work expected.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl Lifecycle for WorkStatus {
    fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Active)
                | (Self::Pending, Self::Cancelled)
                | (Self::Active, Self::Completed)
                | (Self::Active, Self::Cancelled)
        )
    }

    fn is_terminal(self) -> bool {
        self == Self::Cancelled
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type PhaseStatus = WorkStatus;
pub type TaskStatus = WorkStatus;

// ============ Test ============

/// Lifecycle position of a test. The outcome lives in [`TestOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Pending,
    Active,
    Done,
    Cancelled,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse_wire(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "done" => Some(Self::Done),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Done or cancelled: no longer gates task/phase completion.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

impl Lifecycle for TestStatus {
    fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Active)
                | (Self::Pending, Self::Cancelled)
                | (Self::Active, Self::Done)
                | (Self::Active, Self::Cancelled)
                | (Self::Done, Self::Active)
        )
    }

    fn is_terminal(self) -> bool {
        self == Self::Cancelled
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last recorded outcome of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    Passing,
    Failing,
}

impl TestOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passing => "passing",
            Self::Failing => "failing",
        }
    }

    pub fn parse_wire(raw: &str) -> Option<Self> {
        match raw {
            "passing" | "passed" => Some(Self::Passing),
            "failing" | "failed" => Some(Self::Failing),
            _ => None,
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Project a legacy single-field test status onto `(test_status, test_result)`.
pub fn project_legacy_test_status(raw: &str) -> Option<(TestStatus, Option<TestOutcome>)> {
    match raw {
        "planning" | "pending" => Some((TestStatus::Pending, None)),
        "wip" | "active" => Some((TestStatus::Active, None)),
        "done" | "passed" | "passing" => Some((TestStatus::Done, Some(TestOutcome::Passing))),
        "failed" | "failing" => Some((TestStatus::Active, Some(TestOutcome::Failing))),
        "cancelled" => Some((TestStatus::Cancelled, None)),
        _ => None,
    }
}
