pub mod epic;
pub mod phase;
pub mod task;
pub mod test;

use std::path::PathBuf;

use serde::Serialize;

use crate::core::invariants::Violation;
use crate::core::{AutoNextResult, EpicSummary, Recommendation};
use crate::id::{EpicId, PhaseId, TaskId};
use crate::status::EpicStatus;
use crate::types::{Event, Phase, Task, TestView};

pub use epic::{EventsArgs, NewArgs};
pub use phase::PhaseCommand;
pub use task::TaskCommand;
pub use test::TestCommand;

/// Parse an id from a CLI string.
pub(crate) fn parse_id<T>(s: &str) -> std::result::Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    s.parse::<T>().map_err(|e| e.to_string())
}

/// What a command produced, before it is rendered as text, JSON or XML.
#[derive(Debug)]
pub enum Output {
    Initialized(InitReport),
    Created(CreatedReport),
    Switched(SwitchReport),
    Summary(EpicSummary),
    Status(StatusReport),
    Current(CurrentReport),
    AutoNext(AutoNextResult),
    Events(Vec<Event>),
    Validation(ValidationReport),
    Phase(Phase),
    Phases(Vec<Phase>),
    Task(Task),
    Tasks(Vec<Task>),
    Test(TestView),
    Tests(Vec<TestView>),
}

impl Output {
    /// Whether the command succeeded but reported a problem (exit code 1).
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Validation(report) if !report.valid)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub root: PathBuf,
    pub config_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedReport {
    pub path: PathBuf,
    pub epic_id: EpicId,
    pub name: String,
    pub current: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchReport {
    pub current_epic: PathBuf,
    pub previous_epic: Option<PathBuf>,
    pub epic_id: EpicId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub path: String,
    pub summary: EpicSummary,
    pub active_phase: Option<Phase>,
    pub active_task: Option<Task>,
    pub next: Recommendation,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentReport {
    pub path: String,
    pub epic_id: EpicId,
    pub name: String,
    pub status: EpicStatus,
    pub active_phase: Option<PhaseId>,
    pub active_task: Option<TaskId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub path: String,
    pub valid: bool,
    pub violations: Vec<Violation>,
}
