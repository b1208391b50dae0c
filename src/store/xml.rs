//! XML codec for epic documents.
//!
//! The wire structs below mirror the document layout and hold plain strings;
//! all parsing into domain types (timestamps, statuses, ids, test state)
//! happens in [`decode`], and [`encode`] always writes the canonical form.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::validation::validate_document;
use crate::error::{EpicError, Result};
use crate::id::{EpicId, EventId, IdParseError, PhaseId, TaskId, TestId};
use crate::status::{project_legacy_test_status, EpicStatus, TestOutcome, TestStatus, WorkStatus};
use crate::types::{
    CurrentState, Epic, Event, EventKind, EventLog, Phase, Task, Test, TestState, Timestamp,
};

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

// ============ Wire format ============

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "epic")]
struct EpicXml {
    #[serde(rename = "@id", default)]
    id: String,
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@status", default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(rename = "@created_at", default, skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
    #[serde(rename = "@started_at", default, skip_serializing_if = "Option::is_none")]
    started_at: Option<String>,
    #[serde(rename = "@completed_at", default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<MetadataXml>,
    #[serde(default)]
    phases: PhasesXml,
    #[serde(default)]
    tasks: TasksXml,
    #[serde(default)]
    tests: TestsXml,
    #[serde(default)]
    events: EventsXml,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_state: Option<CurrentStateXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetadataXml {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PhasesXml {
    #[serde(rename = "phase", default)]
    items: Vec<PhaseXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PhaseXml {
    #[serde(rename = "@id", default)]
    id: String,
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@status", default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(rename = "@started_at", default, skip_serializing_if = "Option::is_none")]
    started_at: Option<String>,
    #[serde(rename = "@completed_at", default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<String>,
    #[serde(rename = "@cancelled_at", default, skip_serializing_if = "Option::is_none")]
    cancelled_at: Option<String>,
    #[serde(
        rename = "@cancellation_reason",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    cancellation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deliverables: Option<DeliverablesXml>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prerequisites: Option<PrerequisitesXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DeliverablesXml {
    #[serde(rename = "deliverable", default)]
    items: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PrerequisitesXml {
    #[serde(rename = "test_ref", default)]
    items: Vec<TestRefXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TestRefXml {
    #[serde(rename = "@id", default)]
    id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TasksXml {
    #[serde(rename = "task", default)]
    items: Vec<TaskXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskXml {
    #[serde(rename = "@id", default)]
    id: String,
    #[serde(rename = "@phase_id", default)]
    phase_id: String,
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@status", default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(rename = "@assignee", default, skip_serializing_if = "Option::is_none")]
    assignee: Option<String>,
    #[serde(rename = "@started_at", default, skip_serializing_if = "Option::is_none")]
    started_at: Option<String>,
    #[serde(rename = "@completed_at", default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<String>,
    #[serde(rename = "@cancelled_at", default, skip_serializing_if = "Option::is_none")]
    cancelled_at: Option<String>,
    #[serde(
        rename = "@cancellation_reason",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    cancellation_reason: Option<String>,
    #[serde(rename = "$text", default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TestsXml {
    #[serde(rename = "test", default)]
    items: Vec<TestXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TestXml {
    #[serde(rename = "@id", default)]
    id: String,
    #[serde(rename = "@task_id", default)]
    task_id: String,
    #[serde(rename = "@phase_id", default, skip_serializing_if = "Option::is_none")]
    phase_id: Option<String>,
    #[serde(rename = "@name", default)]
    name: String,
    /// Legacy single status; written as a mirror of `test_status`.
    #[serde(rename = "@status", default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(rename = "@test_status", default, skip_serializing_if = "Option::is_none")]
    test_status: Option<String>,
    #[serde(rename = "@test_result", default, skip_serializing_if = "Option::is_none")]
    test_result: Option<String>,
    #[serde(rename = "@started_at", default, skip_serializing_if = "Option::is_none")]
    started_at: Option<String>,
    #[serde(rename = "@passed_at", default, skip_serializing_if = "Option::is_none")]
    passed_at: Option<String>,
    #[serde(rename = "@failed_at", default, skip_serializing_if = "Option::is_none")]
    failed_at: Option<String>,
    #[serde(rename = "@cancelled_at", default, skip_serializing_if = "Option::is_none")]
    cancelled_at: Option<String>,
    #[serde(rename = "@failure_note", default, skip_serializing_if = "Option::is_none")]
    failure_note: Option<String>,
    #[serde(
        rename = "@cancellation_reason",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    cancellation_reason: Option<String>,
    #[serde(rename = "$text", default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EventsXml {
    #[serde(rename = "event", default)]
    items: Vec<EventXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EventXml {
    #[serde(rename = "@id", default)]
    id: String,
    #[serde(rename = "@type", default)]
    kind: String,
    #[serde(rename = "@timestamp", default)]
    timestamp: String,
    #[serde(rename = "@phase_id", default, skip_serializing_if = "Option::is_none")]
    phase_id: Option<String>,
    #[serde(rename = "@task_id", default, skip_serializing_if = "Option::is_none")]
    task_id: Option<String>,
    #[serde(rename = "@test_id", default, skip_serializing_if = "Option::is_none")]
    test_id: Option<String>,
    #[serde(rename = "$text", default)]
    data: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CurrentStateXml {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    active_phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    active_task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_action: Option<String>,
}

// ============ Field helpers ============

fn xml_err(err: impl std::fmt::Display) -> EpicError {
    EpicError::Xml(err.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_id<T: FromStr<Err = IdParseError>>(what: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|e: IdParseError| EpicError::validation(format!("{what}: {e}")))
}

fn parse_opt_id<T: FromStr<Err = IdParseError>>(what: &str, raw: Option<String>) -> Result<Option<T>> {
    non_empty(raw).map(|r| parse_id(what, &r)).transpose()
}

fn parse_ts(what: &str, raw: &str) -> Result<Timestamp> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| EpicError::validation(format!("{what}: malformed timestamp '{raw}': {e}")))
}

fn parse_opt_ts(what: &str, raw: Option<String>) -> Result<Option<Timestamp>> {
    non_empty(raw).map(|r| parse_ts(what, &r)).transpose()
}

pub(crate) fn format_ts(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn fmt_opt_ts(ts: Option<Timestamp>) -> Option<String> {
    ts.map(format_ts)
}

fn parse_work_status(what: &str, raw: Option<String>) -> Result<WorkStatus> {
    let Some(raw) = non_empty(raw) else {
        return Ok(WorkStatus::Pending);
    };
    let status = WorkStatus::parse_wire(&raw)
        .ok_or_else(|| EpicError::validation(format!("{what}: unknown status '{raw}'")))?;
    if status.as_str() != raw {
        warn!(entity = what, legacy = %raw, canonical = %status, "projected legacy status");
    }
    Ok(status)
}

fn parse_outcome(what: &str, raw: Option<String>) -> Result<Option<TestOutcome>> {
    non_empty(raw)
        .map(|r| {
            TestOutcome::parse_wire(&r).ok_or_else(|| {
                EpicError::validation(format!("{what}: unknown test_result '{r}'"))
            })
        })
        .transpose()
}

/// Combine the wire status fields into one [`TestState`].
///
/// `test_status` wins over the legacy `status`; an explicit `test_result`
/// wins over the result implied by a legacy status.
fn assemble_test_state(what: &str, wire: &TestXml) -> Result<TestState> {
    let explicit_result = parse_outcome(what, wire.test_result.clone())?;

    let (status, implied_result) = match non_empty(wire.test_status.clone()) {
        Some(raw) => {
            let status = TestStatus::parse_wire(&raw).ok_or_else(|| {
                EpicError::validation(format!("{what}: unknown test_status '{raw}'"))
            })?;
            (status, None)
        }
        None => match non_empty(wire.status.clone()) {
            Some(raw) => {
                let projected = project_legacy_test_status(&raw).ok_or_else(|| {
                    EpicError::validation(format!("{what}: unknown status '{raw}'"))
                })?;
                if projected.0.as_str() != raw {
                    warn!(entity = what, legacy = %raw, canonical = %projected.0, "projected legacy test status");
                }
                projected
            }
            None => (TestStatus::Pending, None),
        },
    };
    let result = explicit_result.or(implied_result);

    Ok(match status {
        TestStatus::Pending => {
            if let Some(result) = result {
                warn!(entity = what, %result, "dropping result recorded on a pending test");
            }
            TestState::Pending
        }
        TestStatus::Active => TestState::Active { result },
        TestStatus::Done => TestState::Done {
            result: result.unwrap_or(TestOutcome::Passing),
        },
        TestStatus::Cancelled => TestState::Cancelled {
            reason: non_empty(wire.cancellation_reason.clone()).unwrap_or_default(),
            result,
        },
    })
}

// ============ Decode ============

/// Parse and structurally validate an epic document.
pub fn decode(text: &str) -> Result<Epic> {
    let wire: EpicXml = quick_xml::de::from_str(text).map_err(xml_err)?;
    let epic = from_wire(wire)?;
    validate_document(&epic)?;
    Ok(epic)
}

fn from_wire(wire: EpicXml) -> Result<Epic> {
    let id: EpicId = parse_id("epic id", &wire.id)?;
    let metadata = wire.metadata.unwrap_or_default();

    let created_raw = non_empty(wire.created_at)
        .or_else(|| non_empty(metadata.created_at.clone()))
        .ok_or_else(|| EpicError::validation(format!("epic {id}: missing created_at")))?;

    let status = match non_empty(wire.status) {
        Some(raw) => EpicStatus::parse_wire(&raw).ok_or_else(|| {
            EpicError::validation(format!("epic {id}: unknown status '{raw}'"))
        })?,
        None => EpicStatus::Pending,
    };

    let mut epic = Epic::new(id, wire.name, parse_ts("epic created_at", &created_raw)?);
    epic.status = status;
    epic.started_at = parse_opt_ts("epic started_at", wire.started_at)?;
    epic.completed_at = parse_opt_ts("epic completed_at", wire.completed_at)?;
    epic.assignee = non_empty(metadata.assignee);
    epic.priority = non_empty(metadata.priority);
    epic.description = non_empty(metadata.description);

    epic.phases = wire
        .phases
        .items
        .into_iter()
        .map(phase_from_wire)
        .collect::<Result<_>>()?;
    epic.tasks = wire
        .tasks
        .items
        .into_iter()
        .map(task_from_wire)
        .collect::<Result<_>>()?;

    let mut tests = Vec::with_capacity(wire.tests.items.len());
    for item in wire.tests.items {
        tests.push(test_from_wire(item, &epic.tasks)?);
    }
    epic.tests = tests;

    let events = wire
        .events
        .items
        .into_iter()
        .map(event_from_wire)
        .collect::<Result<Vec<_>>>()?;
    epic.events = EventLog::from_events(events);

    epic.current_state = wire
        .current_state
        .map(|cs| -> Result<CurrentState> {
            Ok(CurrentState {
                active_phase: parse_opt_id("current_state active_phase", cs.active_phase)?,
                active_task: parse_opt_id("current_state active_task", cs.active_task)?,
                next_action: non_empty(cs.next_action),
            })
        })
        .transpose()?;

    Ok(epic)
}

fn phase_from_wire(wire: PhaseXml) -> Result<Phase> {
    let id: PhaseId = parse_id("phase id", &wire.id)?;
    let what = format!("phase {id}");

    let mut phase = Phase::new(id, wire.name);
    phase.status = parse_work_status(&what, wire.status)?;
    phase.started_at = parse_opt_ts(&what, wire.started_at)?;
    phase.completed_at = parse_opt_ts(&what, wire.completed_at)?;
    phase.cancelled_at = parse_opt_ts(&what, wire.cancelled_at)?;
    phase.cancellation_reason = non_empty(wire.cancellation_reason);
    phase.description = non_empty(wire.description);
    phase.deliverables = wire
        .deliverables
        .map(|d| d.items.into_iter().filter_map(|i| non_empty(Some(i))).collect())
        .unwrap_or_default();
    phase.prerequisite_tests = wire
        .prerequisites
        .map(|p| {
            p.items
                .into_iter()
                .map(|r| parse_id::<TestId>(&what, &r.id))
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();
    Ok(phase)
}

fn task_from_wire(wire: TaskXml) -> Result<Task> {
    let id: TaskId = parse_id("task id", &wire.id)?;
    let what = format!("task {id}");

    let phase_id: PhaseId = parse_id(&what, &wire.phase_id)?;
    let mut task = Task::new(id, phase_id, wire.name);
    task.status = parse_work_status(&what, wire.status)?;
    task.assignee = non_empty(wire.assignee);
    task.description = non_empty(wire.description);
    task.started_at = parse_opt_ts(&what, wire.started_at)?;
    task.completed_at = parse_opt_ts(&what, wire.completed_at)?;
    task.cancelled_at = parse_opt_ts(&what, wire.cancelled_at)?;
    task.cancellation_reason = non_empty(wire.cancellation_reason);
    Ok(task)
}

fn test_from_wire(wire: TestXml, tasks: &[Task]) -> Result<Test> {
    let id: TestId = parse_id("test id", &wire.id)?;
    let what = format!("test {id}");
    let task_id: TaskId = parse_id(&what, &wire.task_id)?;

    // Older documents omit phase_id on tests; it follows from the task.
    let phase_id: PhaseId = match parse_opt_id(&what, wire.phase_id.clone())? {
        Some(phase_id) => phase_id,
        None => tasks
            .iter()
            .find(|t| t.id == task_id)
            .map(|t| t.phase_id.clone())
            .ok_or_else(|| {
                EpicError::validation(format!("{what} references unknown task {task_id}"))
            })?,
    };

    let state = assemble_test_state(&what, &wire)?;
    let mut test = Test::new(id, task_id, phase_id, wire.name);
    test.state = state;
    test.description = non_empty(wire.description);
    test.started_at = parse_opt_ts(&what, wire.started_at)?;
    test.passed_at = parse_opt_ts(&what, wire.passed_at)?;
    test.failed_at = parse_opt_ts(&what, wire.failed_at)?;
    test.cancelled_at = parse_opt_ts(&what, wire.cancelled_at)?;
    test.failure_note = non_empty(wire.failure_note);
    Ok(test)
}

fn event_from_wire(wire: EventXml) -> Result<Event> {
    let id: EventId = parse_id("event id", &wire.id)?;
    let what = format!("event {id}");
    if wire.kind.trim().is_empty() {
        return Err(EpicError::validation(format!("{what}: missing type")));
    }
    Ok(Event {
        kind: EventKind::parse(wire.kind.trim()),
        timestamp: parse_ts(&what, &wire.timestamp)?,
        phase_id: parse_opt_id(&what, wire.phase_id)?,
        task_id: parse_opt_id(&what, wire.task_id)?,
        test_id: parse_opt_id(&what, wire.test_id)?,
        data: wire.data.trim().to_string(),
        id,
    })
}

// ============ Encode ============

/// Render an epic as a canonical XML document.
pub fn encode(epic: &Epic) -> Result<String> {
    let wire = to_wire(epic);
    let mut body = String::new();
    let mut ser = quick_xml::se::Serializer::with_root(&mut body, Some("epic")).map_err(xml_err)?;
    ser.indent(' ', 2);
    wire.serialize(ser).map_err(xml_err)?;
    Ok(format!("{XML_DECLARATION}\n{body}\n"))
}

fn to_wire(epic: &Epic) -> EpicXml {
    let metadata = MetadataXml {
        assignee: epic.assignee.clone(),
        created_at: Some(format_ts(epic.created_at)),
        priority: epic.priority.clone(),
        description: epic.description.clone(),
    };

    EpicXml {
        id: epic.id.to_string(),
        name: epic.name.clone(),
        status: Some(epic.status.as_str().to_string()),
        created_at: Some(format_ts(epic.created_at)),
        started_at: fmt_opt_ts(epic.started_at),
        completed_at: fmt_opt_ts(epic.completed_at),
        metadata: Some(metadata),
        phases: PhasesXml {
            items: epic.phases.iter().map(phase_to_wire).collect(),
        },
        tasks: TasksXml {
            items: epic.tasks.iter().map(task_to_wire).collect(),
        },
        tests: TestsXml {
            items: epic.tests.iter().map(test_to_wire).collect(),
        },
        events: EventsXml {
            items: epic.events.iter().map(event_to_wire).collect(),
        },
        current_state: epic.current_state.as_ref().map(|cs| CurrentStateXml {
            active_phase: cs.active_phase.as_ref().map(|p| p.to_string()),
            active_task: cs.active_task.as_ref().map(|t| t.to_string()),
            next_action: cs.next_action.clone(),
        }),
    }
}

fn phase_to_wire(phase: &Phase) -> PhaseXml {
    PhaseXml {
        id: phase.id.to_string(),
        name: phase.name.clone(),
        status: Some(phase.status.as_str().to_string()),
        started_at: fmt_opt_ts(phase.started_at),
        completed_at: fmt_opt_ts(phase.completed_at),
        cancelled_at: fmt_opt_ts(phase.cancelled_at),
        cancellation_reason: phase.cancellation_reason.clone(),
        description: phase.description.clone(),
        deliverables: (!phase.deliverables.is_empty()).then(|| DeliverablesXml {
            items: phase.deliverables.clone(),
        }),
        prerequisites: (!phase.prerequisite_tests.is_empty()).then(|| PrerequisitesXml {
            items: phase
                .prerequisite_tests
                .iter()
                .map(|id| TestRefXml { id: id.to_string() })
                .collect(),
        }),
    }
}

fn task_to_wire(task: &Task) -> TaskXml {
    TaskXml {
        id: task.id.to_string(),
        phase_id: task.phase_id.to_string(),
        name: task.name.clone(),
        status: Some(task.status.as_str().to_string()),
        assignee: task.assignee.clone(),
        started_at: fmt_opt_ts(task.started_at),
        completed_at: fmt_opt_ts(task.completed_at),
        cancelled_at: fmt_opt_ts(task.cancelled_at),
        cancellation_reason: task.cancellation_reason.clone(),
        description: task.description.clone(),
    }
}

fn test_to_wire(test: &Test) -> TestXml {
    let status = test.status().as_str().to_string();
    TestXml {
        id: test.id.to_string(),
        task_id: test.task_id.to_string(),
        phase_id: Some(test.phase_id.to_string()),
        name: test.name.clone(),
        status: Some(status.clone()),
        test_status: Some(status),
        test_result: test.result().map(|r| r.as_str().to_string()),
        started_at: fmt_opt_ts(test.started_at),
        passed_at: fmt_opt_ts(test.passed_at),
        failed_at: fmt_opt_ts(test.failed_at),
        cancelled_at: fmt_opt_ts(test.cancelled_at),
        failure_note: test.failure_note.clone(),
        cancellation_reason: test.cancellation_reason().map(str::to_string),
        description: test.description.clone(),
    }
}

fn event_to_wire(event: &Event) -> EventXml {
    EventXml {
        id: event.id.to_string(),
        kind: event.kind.as_str().to_string(),
        timestamp: format_ts(event.timestamp),
        phase_id: event.phase_id.as_ref().map(|p| p.to_string()),
        task_id: event.task_id.as_ref().map(|t| t.to_string()),
        test_id: event.test_id.as_ref().map(|t| t.to_string()),
        data: event.data.clone(),
    }
}
