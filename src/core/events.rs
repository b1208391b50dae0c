use tracing::debug;

use crate::id::{EventId, PhaseId, TaskId, TestId};
use crate::types::{Epic, Event, EventKind, Timestamp};

/// Entity ids an event refers to.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub phase_id: Option<PhaseId>,
    pub task_id: Option<TaskId>,
    pub test_id: Option<TestId>,
}

impl EventContext {
    pub fn epic() -> Self {
        Self::default()
    }

    pub fn phase(phase_id: &PhaseId) -> Self {
        Self {
            phase_id: Some(phase_id.clone()),
            ..Self::default()
        }
    }

    pub fn task(phase_id: &PhaseId, task_id: &TaskId) -> Self {
        Self {
            phase_id: Some(phase_id.clone()),
            task_id: Some(task_id.clone()),
            test_id: None,
        }
    }

    pub fn test(phase_id: &PhaseId, task_id: &TaskId, test_id: &TestId) -> Self {
        Self {
            phase_id: Some(phase_id.clone()),
            task_id: Some(task_id.clone()),
            test_id: Some(test_id.clone()),
        }
    }
}

/// Append one event to the epic's log. Data is stored trimmed, the way the
/// codec reads it back.
///
/// The timestamp comes from the caller; the recorder never reads a clock.
pub fn record(
    epic: &mut Epic,
    kind: EventKind,
    data: impl Into<String>,
    at: Timestamp,
    context: EventContext,
) -> EventId {
    let id = epic.events.next_id();
    let event = Event {
        id: id.clone(),
        kind,
        timestamp: at,
        phase_id: context.phase_id,
        task_id: context.task_id,
        test_id: context.test_id,
        data: data.into().trim().to_string(),
    };
    debug!(event_id = %id, kind = %event.kind, data = %event.data, "recorded event");
    epic.events.push(event);
    id
}
