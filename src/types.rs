use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{EpicId, EventId, PhaseId, TaskId, TestId};
use crate::status::{EpicStatus, PhaseStatus, TaskStatus, TestOutcome, TestStatus};

pub type Timestamp = DateTime<Utc>;

/// Top-level work item: owns every phase, task, test and event.
///
/// Children reference their parents by id only, so the collections can be
/// reordered or rebuilt without fixing up pointers.
#[derive(Debug, Clone, PartialEq)]
pub struct Epic {
    pub id: EpicId,
    pub name: String,
    pub status: EpicStatus,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub assignee: Option<String>,
    pub priority: Option<String>,
    pub description: Option<String>,
    pub phases: Vec<Phase>,
    pub tasks: Vec<Task>,
    pub tests: Vec<Test>,
    pub events: EventLog,
    pub current_state: Option<CurrentState>,
}

impl Epic {
    pub fn new(id: EpicId, name: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            id,
            name: name.into(),
            status: EpicStatus::Pending,
            created_at,
            started_at: None,
            completed_at: None,
            assignee: None,
            priority: None,
            description: None,
            phases: Vec::new(),
            tasks: Vec::new(),
            tests: Vec::new(),
            events: EventLog::default(),
            current_state: None,
        }
    }

    pub fn phase(&self, id: &PhaseId) -> Option<&Phase> {
        self.phases.iter().find(|p| &p.id == id)
    }

    pub fn phase_mut(&mut self, id: &PhaseId) -> Option<&mut Phase> {
        self.phases.iter_mut().find(|p| &p.id == id)
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| &t.id == id)
    }

    pub fn test(&self, id: &TestId) -> Option<&Test> {
        self.tests.iter().find(|t| &t.id == id)
    }

    pub fn test_mut(&mut self, id: &TestId) -> Option<&mut Test> {
        self.tests.iter_mut().find(|t| &t.id == id)
    }

    /// Tasks belonging to a phase, in document order.
    pub fn tasks_in_phase<'a>(&'a self, phase_id: &'a PhaseId) -> impl Iterator<Item = &'a Task> {
        self.tasks.iter().filter(move |t| &t.phase_id == phase_id)
    }

    /// Tests attached to a task, in document order.
    pub fn tests_for_task<'a>(&'a self, task_id: &'a TaskId) -> impl Iterator<Item = &'a Test> {
        self.tests.iter().filter(move |t| &t.task_id == task_id)
    }

    /// Tests belonging to a phase, in document order.
    pub fn tests_in_phase<'a>(&'a self, phase_id: &'a PhaseId) -> impl Iterator<Item = &'a Test> {
        self.tests.iter().filter(move |t| &t.phase_id == phase_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Phase {
    pub id: PhaseId,
    pub name: String,
    pub status: PhaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deliverables: Vec<String>,
    /// Tests that must be done before this phase may start.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub prerequisite_tests: Vec<TestId>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
}

impl Phase {
    pub fn new(id: PhaseId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: PhaseStatus::Pending,
            description: None,
            deliverables: Vec::new(),
            prerequisite_tests: Vec::new(),
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub phase_id: PhaseId,
    pub name: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
}

impl Task {
    pub fn new(id: TaskId, phase_id: PhaseId, name: impl Into<String>) -> Self {
        Self {
            id,
            phase_id,
            name: name.into(),
            status: TaskStatus::Pending,
            assignee: None,
            description: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
        }
    }
}

/// Combined lifecycle position and outcome of a test.
///
/// On the wire this is split into `test_status` + `test_result`; the codec
/// translates at the boundary so an impossible pairing cannot be built here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestState {
    Pending,
    Active { result: Option<TestOutcome> },
    Done { result: TestOutcome },
    Cancelled {
        reason: String,
        result: Option<TestOutcome>,
    },
}

impl TestState {
    pub fn status(&self) -> TestStatus {
        match self {
            Self::Pending => TestStatus::Pending,
            Self::Active { .. } => TestStatus::Active,
            Self::Done { .. } => TestStatus::Done,
            Self::Cancelled { .. } => TestStatus::Cancelled,
        }
    }

    pub fn result(&self) -> Option<TestOutcome> {
        match self {
            Self::Pending => None,
            Self::Active { result } | Self::Cancelled { result, .. } => *result,
            Self::Done { result } => Some(*result),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Test {
    pub id: TestId,
    pub task_id: TaskId,
    pub phase_id: PhaseId,
    pub name: String,
    pub description: Option<String>,
    pub state: TestState,
    pub started_at: Option<Timestamp>,
    pub passed_at: Option<Timestamp>,
    pub failed_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
    pub failure_note: Option<String>,
}

impl Test {
    pub fn new(id: TestId, task_id: TaskId, phase_id: PhaseId, name: impl Into<String>) -> Self {
        Self {
            id,
            task_id,
            phase_id,
            name: name.into(),
            description: None,
            state: TestState::Pending,
            started_at: None,
            passed_at: None,
            failed_at: None,
            cancelled_at: None,
            failure_note: None,
        }
    }

    pub fn status(&self) -> TestStatus {
        self.state.status()
    }

    pub fn result(&self) -> Option<TestOutcome> {
        self.state.result()
    }

    pub fn is_failing(&self) -> bool {
        self.result() == Some(TestOutcome::Failing)
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        match &self.state {
            TestState::Cancelled { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Flat projection of a [`Test`] for structured output.
#[derive(Debug, Clone, Serialize)]
pub struct TestView {
    pub id: TestId,
    pub task_id: TaskId,
    pub phase_id: PhaseId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub test_status: TestStatus,
    pub test_result: Option<TestOutcome>,
    pub started_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
}

impl From<&Test> for TestView {
    fn from(test: &Test) -> Self {
        Self {
            id: test.id.clone(),
            task_id: test.task_id.clone(),
            phase_id: test.phase_id.clone(),
            name: test.name.clone(),
            description: test.description.clone(),
            test_status: test.status(),
            test_result: test.result(),
            started_at: test.started_at,
            passed_at: test.passed_at,
            failed_at: test.failed_at,
            cancelled_at: test.cancelled_at,
            failure_note: test.failure_note.clone(),
            cancellation_reason: test.cancellation_reason().map(str::to_string),
        }
    }
}

/// Event type tag. Unknown tags found in older documents are preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    EpicStarted,
    EpicCompleted,
    PhaseStarted,
    PhaseCompleted,
    PhaseCancelled,
    TaskStarted,
    TaskCompleted,
    TaskCancelled,
    TestStarted,
    TestPassed,
    TestFailed,
    TestCancelled,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::EpicStarted => "epic_started",
            Self::EpicCompleted => "epic_completed",
            Self::PhaseStarted => "phase_started",
            Self::PhaseCompleted => "phase_completed",
            Self::PhaseCancelled => "phase_cancelled",
            Self::TaskStarted => "task_started",
            Self::TaskCompleted => "task_completed",
            Self::TaskCancelled => "task_cancelled",
            Self::TestStarted => "test_started",
            Self::TestPassed => "test_passed",
            Self::TestFailed => "test_failed",
            Self::TestCancelled => "test_cancelled",
            Self::Other(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "epic_started" => Self::EpicStarted,
            "epic_completed" => Self::EpicCompleted,
            "phase_started" => Self::PhaseStarted,
            "phase_completed" => Self::PhaseCompleted,
            "phase_cancelled" => Self::PhaseCancelled,
            "task_started" => Self::TaskStarted,
            "task_completed" => Self::TaskCompleted,
            "task_cancelled" => Self::TaskCancelled,
            "test_started" => Self::TestStarted,
            "test_passed" => Self::TestPassed,
            "test_failed" => Self::TestFailed,
            "test_cancelled" => Self::TestCancelled,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_id: Option<PhaseId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_id: Option<TestId>,
    pub data: String,
}

/// Append-only, insertion-ordered event history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Rebuild a log from events read out of a document.
    pub(crate) fn from_events(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub(crate) fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Next unused `evt_NNNN` id.
    pub(crate) fn next_id(&self) -> EventId {
        let mut seq = self.events.len() + 1;
        loop {
            let candidate = EventId::sequenced(seq);
            if !self.events.iter().any(|e| e.id == candidate) {
                return candidate;
            }
            seq += 1;
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&Event> {
        self.events.last()
    }

    pub fn as_slice(&self) -> &[Event] {
        &self.events
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Cached pointer to where work stands, refreshed after each mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CurrentState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_phase: Option<PhaseId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_task: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,
}
