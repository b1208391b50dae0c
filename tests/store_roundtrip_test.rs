//! File-backed persistence tests.
//!
//! Tests cover:
//! - Creating, loading and re-saving documents on disk
//! - Canonical encoding as a fixed point
//! - Legacy status projection on read
//! - Structural validation of hand-edited documents
//! - Advisory locking around mutations

use std::fs;
use std::time::Duration;

use chrono::{DateTime, Utc};
use epicflow::core::EpicWorkflow;
use epicflow::error::{EpicError, ErrorKind};
use epicflow::id::EpicId;
use epicflow::status::{EpicStatus, PhaseStatus, TaskStatus, TestOutcome, TestStatus};
use epicflow::store::xml::{decode, encode};
use epicflow::store::{DocumentLock, EpicStore, FileStore};
use epicflow::types::{Epic, Phase, Task, Test, Timestamp};
use tempfile::TempDir;

fn t0() -> Timestamp {
    "2024-05-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap()
}

fn sample_epic() -> Epic {
    let mut epic = Epic::new(EpicId::generate(), "Payments", t0());
    epic.assignee = Some("dana".into());
    epic.phases.push(Phase::new("P1".parse().unwrap(), "Design"));
    epic.phases.push(Phase::new("P2".parse().unwrap(), "Build"));
    epic.tasks.push(Task::new(
        "T1".parse().unwrap(),
        "P1".parse().unwrap(),
        "Write RFC",
    ));
    epic.tests.push(Test::new(
        "X1".parse().unwrap(),
        "T1".parse().unwrap(),
        "P1".parse().unwrap(),
        "RFC approved",
    ));
    epic
}

const LEGACY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<epic id="E7" name="Old format" status="wip" created_at="2023-11-02T10:00:00Z">
  <phases>
    <phase id="P1" name="Only" status="wip" started_at="2023-11-02T10:00:00Z"/>
  </phases>
  <tasks>
    <task id="T1" phase_id="P1" name="Legacy task" status="wip" started_at="2023-11-02T10:05:00Z"/>
  </tasks>
  <tests>
    <test id="X1" task_id="T1" name="passes" status="passed"/>
    <test id="X2" task_id="T1" name="fails" status="failed"/>
    <test id="X3" task_id="T1" name="todo" status="pending"/>
  </tests>
</epic>
"#;

#[test]
fn create_load_save_round_trip() {
    let tmp = TempDir::new().unwrap();
    let store = FileStore::new(tmp.path().join("epics").join("pay.xml"));
    let epic = sample_epic();

    store.create(&epic).unwrap();
    let loaded = store.load().unwrap();
    assert_eq!(loaded, epic);

    let on_disk = fs::read_to_string(store.path()).unwrap();
    assert_eq!(encode(&loaded).unwrap(), on_disk);

    store.save(&loaded).unwrap();
    assert_eq!(fs::read_to_string(store.path()).unwrap(), on_disk);
}

#[test]
fn create_refuses_existing_file() {
    let tmp = TempDir::new().unwrap();
    let store = FileStore::new(tmp.path().join("pay.xml"));
    store.create(&sample_epic()).unwrap();

    let err = store.create(&sample_epic()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn legacy_document_projects_and_normalizes() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("old.xml");
    fs::write(&path, LEGACY).unwrap();
    let store = FileStore::new(&path);

    let epic = store.load().unwrap();
    assert_eq!(epic.status, EpicStatus::Active);
    assert_eq!(epic.phases[0].status, PhaseStatus::Active);
    assert_eq!(epic.tasks[0].status, TaskStatus::Active);

    let states: Vec<(TestStatus, Option<TestOutcome>)> =
        epic.tests.iter().map(|t| (t.status(), t.result())).collect();
    assert_eq!(
        states,
        vec![
            (TestStatus::Done, Some(TestOutcome::Passing)),
            (TestStatus::Active, Some(TestOutcome::Failing)),
            (TestStatus::Pending, None),
        ]
    );
    // phase is derived from the owning task
    assert!(epic.tests.iter().all(|t| t.phase_id == "P1"));

    store.save(&epic).unwrap();
    let rewritten = fs::read_to_string(&path).unwrap();
    assert!(!rewritten.contains("\"wip\""));
    assert!(rewritten.contains(r#"test_status="active""#));

    let again = decode(&rewritten).unwrap();
    assert_eq!(encode(&again).unwrap(), rewritten);
}

#[test]
fn mutations_persist_without_leftover_files() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("pay.xml");
    let store = FileStore::new(&path);
    store.create(&sample_epic()).unwrap();

    let wf = EpicWorkflow::new(&store);
    wf.start_epic(t0()).unwrap();
    wf.auto_next(t0()).unwrap();

    let reloaded = FileStore::new(&path).load().unwrap();
    assert_eq!(reloaded.phases[0].status, PhaseStatus::Active);
    assert_eq!(reloaded.tasks[0].status, TaskStatus::Active);
    assert_eq!(reloaded.events.len(), 3);
    assert_eq!(
        reloaded.current_state.unwrap().active_task.unwrap(),
        "T1"
    );

    let mut names: Vec<String> = fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["pay.xml", "pay.xml.lock"]);
}

#[test]
fn locked_document_times_out_and_is_untouched() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("pay.xml");
    let store = FileStore::new(&path).with_lock_timeout(Duration::from_millis(20));
    store.create(&sample_epic()).unwrap();
    let before = fs::read_to_string(&path).unwrap();

    let held = DocumentLock::acquire(&path, Duration::from_millis(100)).unwrap();
    let err = EpicWorkflow::new(&store).start_epic(t0()).unwrap_err();
    assert!(matches!(err, EpicError::Locked(_)));
    assert_eq!(fs::read_to_string(&path).unwrap(), before);

    drop(held);
    EpicWorkflow::new(&store).start_epic(t0()).unwrap();
}

#[test]
fn structural_problems_fail_to_load() {
    let cases = [
        (
            "duplicate task",
            r#"<epic id="E1" name="x" status="pending" created_at="2024-01-01T00:00:00Z">
  <phases><phase id="P1" name="a" status="pending"/></phases>
  <tasks>
    <task id="T1" phase_id="P1" name="a" status="pending"/>
    <task id="T1" phase_id="P1" name="b" status="pending"/>
  </tasks>
</epic>"#,
        ),
        (
            "dangling phase",
            r#"<epic id="E1" name="x" status="pending" created_at="2024-01-01T00:00:00Z">
  <tasks><task id="T1" phase_id="P9" name="a" status="pending"/></tasks>
</epic>"#,
        ),
        (
            "unknown status",
            r#"<epic id="E1" name="x" status="sleeping" created_at="2024-01-01T00:00:00Z"/>"#,
        ),
        (
            "bad timestamp",
            r#"<epic id="E1" name="x" status="pending" created_at="yesterday"/>"#,
        ),
    ];

    let tmp = TempDir::new().unwrap();
    for (name, xml) in cases {
        let path = tmp.path().join(format!("{}.xml", name.replace(' ', "_")));
        fs::write(&path, xml).unwrap();
        let err = FileStore::new(&path).load().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{name}: {err}");
    }
}

#[test]
fn missing_document_is_io_error() {
    let tmp = TempDir::new().unwrap();
    let err = FileStore::new(tmp.path().join("absent.xml")).load().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}
