use tracing::debug;

use crate::core::events::{record, EventContext};
use crate::core::validation::{self, require_test};
use crate::error::{EpicError, Result};
use crate::id::{TaskId, TestId};
use crate::status::{EntityKind, TestOutcome, TestStatus};
use crate::types::{Epic, EventKind, Test, TestState, Timestamp};

/// Knobs for test transitions.
#[derive(Debug, Clone, Copy)]
pub struct TestServiceOptions {
    /// Emit a `test_passed` event when passing a test that is already done.
    pub record_repass: bool,
}

impl Default for TestServiceOptions {
    fn default() -> Self {
        Self {
            record_repass: true,
        }
    }
}

/// Drives tests through `test_status` while keeping `test_result` in step.
pub struct TestService<'a> {
    epic: &'a mut Epic,
    options: TestServiceOptions,
}

impl<'a> TestService<'a> {
    pub fn new(epic: &'a mut Epic) -> Self {
        Self::with_options(epic, TestServiceOptions::default())
    }

    pub fn with_options(epic: &'a mut Epic, options: TestServiceOptions) -> Self {
        Self { epic, options }
    }

    pub fn get(&self, id: &TestId) -> Result<Test> {
        require_test(self.epic, id).cloned()
    }

    pub fn start(&mut self, id: &TestId, at: Timestamp) -> Result<Test> {
        validation::start_test(self.epic, id)?;

        let test = self.test_mut(id)?;
        test.state = TestState::Active {
            result: test.result(),
        };
        test.started_at = Some(at);
        let data = format!("Test {} started: {}", test.id, test.name);
        let context = context_of(test);

        debug!(test_id = %id, "test started");
        record(self.epic, EventKind::TestStarted, data, at, context);
        self.get(id)
    }

    /// Mark a test passing and done.
    ///
    /// A pending test is started implicitly. Passing a test that is already
    /// done changes nothing but may still log a `test_passed` event.
    pub fn pass(&mut self, id: &TestId, at: Timestamp) -> Result<Test> {
        validation::pass_test(self.epic, id)?;
        let existing = require_test(self.epic, id)?;
        let was = existing.status();

        if was == TestStatus::Done {
            if self.options.record_repass {
                let data = format!("Test {} passed again: {}", existing.id, existing.name);
                let context = context_of(existing);
                debug!(test_id = %id, "test re-passed");
                record(self.epic, EventKind::TestPassed, data, at, context);
            }
            return self.get(id);
        }
        validation::ensure_not_before(EntityKind::Test, id, existing.started_at, at)?;

        let test = self.test_mut(id)?;
        if was == TestStatus::Pending {
            test.started_at = Some(at);
        }
        test.state = TestState::Done {
            result: TestOutcome::Passing,
        };
        test.passed_at = Some(at);
        let data = format!("Test {} passed: {}", test.id, test.name);
        let context = context_of(test);

        debug!(test_id = %id, from = %was, "test passed");
        record(self.epic, EventKind::TestPassed, data, at, context);
        self.get(id)
    }

    /// Record a failure. A done test is reopened so the completion gates
    /// of its task and phase apply again.
    pub fn fail(&mut self, id: &TestId, reason: &str, at: Timestamp) -> Result<Test> {
        let reason = reason.trim();
        validation::fail_test(self.epic, id, reason)?;
        let existing = require_test(self.epic, id)?;
        let was = existing.status();
        validation::ensure_not_before(EntityKind::Test, id, existing.started_at, at)?;

        let test = self.test_mut(id)?;
        if was == TestStatus::Pending {
            test.started_at = Some(at);
        }
        test.state = TestState::Active {
            result: Some(TestOutcome::Failing),
        };
        test.failed_at = Some(at);
        test.failure_note = Some(reason.to_string());
        let context = context_of(test);

        debug!(test_id = %id, from = %was, reason, "test failed");
        record(
            self.epic,
            EventKind::TestFailed,
            format!("Test {id} failed: {reason}"),
            at,
            context,
        );
        self.get(id)
    }

    pub fn cancel(&mut self, id: &TestId, reason: &str, at: Timestamp) -> Result<Test> {
        let reason = reason.trim();
        validation::cancel_test(self.epic, id, reason)?;
        let started_at = require_test(self.epic, id)?.started_at;
        validation::ensure_not_before(EntityKind::Test, id, started_at, at)?;

        let test = self.test_mut(id)?;
        test.state = TestState::Cancelled {
            reason: reason.to_string(),
            result: test.result(),
        };
        test.cancelled_at = Some(at);
        let context = context_of(test);

        debug!(test_id = %id, reason, "test cancelled");
        record(
            self.epic,
            EventKind::TestCancelled,
            format!("Test {id} cancelled: {reason}"),
            at,
            context,
        );
        self.get(id)
    }

    fn test_mut(&mut self, id: &TestId) -> Result<&mut Test> {
        self.epic
            .test_mut(id)
            .ok_or_else(|| EpicError::not_found(EntityKind::Test, id))
    }
}

fn context_of(test: &Test) -> EventContext {
    EventContext::test(&test.phase_id, &test.task_id, &test.id)
}

/// Tests attached to a task, in document order.
pub fn tests_for_task<'a>(epic: &'a Epic, task_id: &'a TaskId) -> Vec<&'a Test> {
    epic.tests_for_task(task_id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::status::{PhaseStatus, TaskStatus};
    use crate::testutil::{active_failing, done_passing, ts, EpicBuilder};

    fn xid(s: &str) -> TestId {
        s.parse().unwrap()
    }

    fn running(state: TestState) -> Epic {
        EpicBuilder::new("E1")
            .phase_with("P1", PhaseStatus::Active)
            .task_with("T1", "P1", TaskStatus::Active)
            .test_with("X1", "T1", state)
            .build()
    }

    #[test]
    fn start_keeps_result_unset() {
        let mut epic = running(TestState::Pending);

        let test = TestService::new(&mut epic).start(&xid("X1"), ts(1)).unwrap();

        assert_eq!(test.status(), TestStatus::Active);
        assert_eq!(test.result(), None);
        assert_eq!(test.started_at, Some(ts(1)));
        assert_eq!(epic.events.last().unwrap().kind, EventKind::TestStarted);
    }

    #[test]
    fn pass_from_active_sets_done_passing() {
        let mut epic = running(TestState::Active { result: None });

        let test = TestService::new(&mut epic).pass(&xid("X1"), ts(3)).unwrap();

        assert_eq!(test.status(), TestStatus::Done);
        assert_eq!(test.result(), Some(TestOutcome::Passing));
        assert_eq!(test.passed_at, Some(ts(3)));
    }

    #[test]
    fn pass_from_pending_starts_implicitly_with_one_event() {
        let mut epic = running(TestState::Pending);

        let test = TestService::new(&mut epic).pass(&xid("X1"), ts(2)).unwrap();

        assert_eq!(test.status(), TestStatus::Done);
        assert_eq!(test.started_at, Some(ts(2)));
        let kinds: Vec<&str> = epic.events.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["test_passed"]);
    }

    #[test]
    fn repass_only_appends_event() {
        let mut epic = running(done_passing());
        epic.tests[0].passed_at = Some(ts(1));
        let before = epic.tests.clone();

        TestService::new(&mut epic).pass(&xid("X1"), ts(8)).unwrap();

        assert_eq!(epic.tests, before);
        assert_eq!(epic.events.len(), 1);
        assert_eq!(epic.events.last().unwrap().kind, EventKind::TestPassed);
    }

    #[test]
    fn repass_can_be_silent() {
        let mut epic = running(done_passing());
        let options = TestServiceOptions {
            record_repass: false,
        };

        TestService::with_options(&mut epic, options)
            .pass(&xid("X1"), ts(8))
            .unwrap();

        assert!(epic.events.is_empty());
    }

    #[test]
    fn fail_on_done_reopens_as_regression() {
        let mut epic = running(done_passing());

        let test = TestService::new(&mut epic)
            .fail(&xid("X1"), "boom", ts(4))
            .unwrap();

        assert_eq!(test.status(), TestStatus::Active);
        assert_eq!(test.result(), Some(TestOutcome::Failing));
        assert_eq!(test.failure_note.as_deref(), Some("boom"));
        assert_eq!(epic.events.last().unwrap().data, "Test X1 failed: boom");
    }

    #[test]
    fn fail_then_pass_recovers() {
        let mut epic = running(TestState::Pending);
        let mut service = TestService::new(&mut epic);

        service.fail(&xid("X1"), "boom", ts(1)).unwrap();
        let test = service.pass(&xid("X1"), ts(2)).unwrap();

        assert_eq!(test.result(), Some(TestOutcome::Passing));
        assert_eq!(test.failed_at, Some(ts(1)));
        assert_eq!(test.passed_at, Some(ts(2)));
    }

    #[test]
    fn cancel_keeps_last_result() {
        let mut epic = running(active_failing());

        let test = TestService::new(&mut epic)
            .cancel(&xid("X1"), "flaky upstream", ts(5))
            .unwrap();

        assert_eq!(test.status(), TestStatus::Cancelled);
        assert_eq!(test.result(), Some(TestOutcome::Failing));
        assert_eq!(test.cancellation_reason(), Some("flaky upstream"));
    }

    #[test]
    fn cancel_with_empty_reason_is_validation_error() {
        let mut epic = running(TestState::Pending);
        let err = TestService::new(&mut epic)
            .cancel(&xid("X1"), "", ts(5))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn start_under_pending_task_is_rejected() {
        let mut epic = EpicBuilder::new("E1")
            .phase_with("P1", PhaseStatus::Active)
            .task("T1", "P1")
            .test("X1", "T1")
            .build();
        let err = TestService::new(&mut epic)
            .start(&xid("X1"), ts(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TestPrerequisite);
    }
}
