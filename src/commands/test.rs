use clap::{Args, Subcommand};

use crate::commands::{parse_id, Output};
use crate::core::test_service::tests_for_task;
use crate::core::EpicWorkflow;
use crate::error::{EpicError, Result};
use crate::id::{TaskId, TestId};
use crate::status::EntityKind;
use crate::types::{TestView, Timestamp};

#[derive(Subcommand, Debug, Clone)]
pub enum TestCommand {
    /// Start a test once its task is running
    Start {
        #[arg(value_parser = parse_id::<TestId>)]
        id: TestId,
    },
    /// Mark a test as done and passing
    Pass {
        #[arg(value_parser = parse_id::<TestId>)]
        id: TestId,
    },
    /// Record a failing run; the test stays active
    Fail {
        #[arg(value_parser = parse_id::<TestId>)]
        id: TestId,

        #[arg(short, long)]
        reason: String,
    },
    /// Cancel a test
    Cancel {
        #[arg(value_parser = parse_id::<TestId>)]
        id: TestId,

        #[arg(short, long)]
        reason: String,
    },
    /// List tests, optionally for one task
    List(ListArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[arg(long, value_parser = parse_id::<TaskId>)]
    pub task: Option<TaskId>,
}

pub fn handle(workflow: &EpicWorkflow, cmd: TestCommand, at: Timestamp) -> Result<Output> {
    let view = |test: crate::types::Test| Output::Test(TestView::from(&test));
    match cmd {
        TestCommand::Start { id } => Ok(view(workflow.start_test(&id, at)?)),
        TestCommand::Pass { id } => Ok(view(workflow.pass_test(&id, at)?)),
        TestCommand::Fail { id, reason } => Ok(view(workflow.fail_test(&id, &reason, at)?)),
        TestCommand::Cancel { id, reason } => Ok(view(workflow.cancel_test(&id, &reason, at)?)),
        TestCommand::List(args) => {
            let epic = workflow.load()?;
            let tests: Vec<TestView> = match &args.task {
                Some(task_id) => {
                    if epic.task(task_id).is_none() {
                        return Err(EpicError::not_found(EntityKind::Task, task_id));
                    }
                    tests_for_task(&epic, task_id)
                        .into_iter()
                        .map(TestView::from)
                        .collect()
                }
                None => epic.tests.iter().map(TestView::from).collect(),
            };
            Ok(Output::Tests(tests))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{PhaseStatus, TaskStatus, TestOutcome, TestStatus};
    use crate::store::MemoryStore;
    use crate::testutil::{ts, EpicBuilder};

    fn running() -> EpicBuilder {
        EpicBuilder::new("E1")
            .phase_with("P1", PhaseStatus::Active)
            .task_with("T1", "P1", TaskStatus::Active)
            .task("T2", "P1")
            .test("X1", "T1")
            .test("X2", "T2")
    }

    #[test]
    fn fail_then_pass_reports_flat_view() {
        let store = MemoryStore::new(&running().build()).unwrap();
        let workflow = EpicWorkflow::new(&store);
        let id: TestId = "X1".parse().unwrap();

        let Output::Test(failed) = handle(
            &workflow,
            TestCommand::Fail {
                id: id.clone(),
                reason: "boom".into(),
            },
            ts(1),
        )
        .unwrap() else {
            panic!("expected test view");
        };
        assert_eq!(failed.test_status, TestStatus::Active);
        assert_eq!(failed.test_result, Some(TestOutcome::Failing));
        assert_eq!(failed.failure_note.as_deref(), Some("boom"));

        let Output::Test(passed) = handle(&workflow, TestCommand::Pass { id }, ts(2)).unwrap()
        else {
            panic!("expected test view");
        };
        assert_eq!(passed.test_status, TestStatus::Done);
        assert_eq!(passed.test_result, Some(TestOutcome::Passing));
    }

    #[test]
    fn list_by_task() {
        let store = MemoryStore::new(&running().build()).unwrap();
        let workflow = EpicWorkflow::new(&store);

        let cmd = TestCommand::List(ListArgs {
            task: Some("T2".parse().unwrap()),
        });
        let Output::Tests(tests) = handle(&workflow, cmd, ts(0)).unwrap() else {
            panic!("expected test list");
        };
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].id, "X2");
    }
}
