//! Global consistency rules that must hold after every successful command.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::id::PhaseId;
use crate::status::{EpicStatus, PhaseStatus, TaskStatus, TestStatus};
use crate::types::{Epic, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Invariant {
    SingleActivePhase,
    SingleActiveTaskPerPhase,
    CompletedEpicIsClosed,
    CompletedPhaseIsClosed,
    CompletedTaskIsTested,
    TestPhaseMatchesTask,
    TimestampOrder,
}

impl Invariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleActivePhase => "single_active_phase",
            Self::SingleActiveTaskPerPhase => "single_active_task_per_phase",
            Self::CompletedEpicIsClosed => "completed_epic_is_closed",
            Self::CompletedPhaseIsClosed => "completed_phase_is_closed",
            Self::CompletedTaskIsTested => "completed_task_is_tested",
            Self::TestPhaseMatchesTask => "test_phase_matches_task",
            Self::TimestampOrder => "timestamp_order",
        }
    }
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub invariant: Invariant,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

struct Collector(Vec<Violation>);

impl Collector {
    fn push(&mut self, invariant: Invariant, message: String) {
        self.0.push(Violation { invariant, message });
    }

    fn ordered(&mut self, what: &str, start: Option<Timestamp>, end: Option<Timestamp>) {
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                self.push(
                    Invariant::TimestampOrder,
                    format!("{what} ends at {} before it starts at {}", end.to_rfc3339(), start.to_rfc3339()),
                );
            }
        }
    }
}

/// Every violated invariant, in a stable order. Empty means consistent.
pub fn check(epic: &Epic) -> Vec<Violation> {
    let mut out = Collector(Vec::new());

    let active_phases: Vec<&PhaseId> = epic
        .phases
        .iter()
        .filter(|p| p.status == PhaseStatus::Active)
        .map(|p| &p.id)
        .collect();
    if active_phases.len() > 1 {
        out.push(
            Invariant::SingleActivePhase,
            format!(
                "{} phases are active: {}",
                active_phases.len(),
                crate::error::join_ids(&active_phases)
            ),
        );
    }

    let mut active_per_phase: HashMap<&PhaseId, usize> = HashMap::new();
    for task in epic.tasks.iter().filter(|t| t.status == TaskStatus::Active) {
        *active_per_phase.entry(&task.phase_id).or_default() += 1;
    }
    for phase in &epic.phases {
        if let Some(&count) = active_per_phase.get(&phase.id) {
            if count > 1 {
                out.push(
                    Invariant::SingleActiveTaskPerPhase,
                    format!("phase {} has {count} active tasks", phase.id),
                );
            }
        }
    }

    if epic.status == EpicStatus::Completed {
        for phase in epic.phases.iter().filter(|p| !p.status.is_finished()) {
            out.push(
                Invariant::CompletedEpicIsClosed,
                format!("epic is completed but phase {} is {}", phase.id, phase.status),
            );
        }
        for test in epic.tests.iter().filter(|t| t.is_failing()) {
            out.push(
                Invariant::CompletedEpicIsClosed,
                format!("epic is completed but test {} is failing", test.id),
            );
        }
    }

    for phase in epic.phases.iter().filter(|p| p.status == PhaseStatus::Completed) {
        for task in epic
            .tasks_in_phase(&phase.id)
            .filter(|t| !t.status.is_finished())
        {
            out.push(
                Invariant::CompletedPhaseIsClosed,
                format!("phase {} is completed but task {} is {}", phase.id, task.id, task.status),
            );
        }
        for test in epic.tests_in_phase(&phase.id).filter(|t| {
            matches!(t.status(), TestStatus::Pending | TestStatus::Active) && t.is_failing()
        }) {
            out.push(
                Invariant::CompletedPhaseIsClosed,
                format!("phase {} is completed but test {} is failing", phase.id, test.id),
            );
        }
    }

    for task in epic.tasks.iter().filter(|t| t.status == TaskStatus::Completed) {
        for test in epic
            .tests_for_task(&task.id)
            .filter(|t| !t.status().is_settled())
        {
            out.push(
                Invariant::CompletedTaskIsTested,
                format!("task {} is completed but test {} is {}", task.id, test.id, test.status()),
            );
        }
    }

    for test in &epic.tests {
        if let Some(task) = epic.task(&test.task_id) {
            if task.phase_id != test.phase_id {
                out.push(
                    Invariant::TestPhaseMatchesTask,
                    format!(
                        "test {} is in phase {} but task {} is in phase {}",
                        test.id, test.phase_id, task.id, task.phase_id
                    ),
                );
            }
        }
    }

    out.ordered("epic", epic.started_at, epic.completed_at);
    for phase in &epic.phases {
        let what = format!("phase {}", phase.id);
        out.ordered(&what, phase.started_at, phase.completed_at);
        out.ordered(&what, phase.started_at, phase.cancelled_at);
    }
    for task in &epic.tasks {
        let what = format!("task {}", task.id);
        out.ordered(&what, task.started_at, task.completed_at);
        out.ordered(&what, task.started_at, task.cancelled_at);
    }
    for test in &epic.tests {
        let what = format!("test {}", test.id);
        out.ordered(&what, test.started_at, test.passed_at);
        out.ordered(&what, test.started_at, test.failed_at);
        out.ordered(&what, test.started_at, test.cancelled_at);
    }

    out.0
}
