use tracing::{debug, warn};

use crate::core::auto_next::{recommend, AutoNext, AutoNextResult};
use crate::core::invariants;
use crate::core::lifecycle_service::{EpicSummary, LifecycleService};
use crate::core::phase_service::{active_phase, PhaseService};
use crate::core::task_service::{active_task, TaskService};
use crate::core::test_service::{TestService, TestServiceOptions};
use crate::error::Result;
use crate::id::{PhaseId, TaskId, TestId};
use crate::store::EpicStore;
use crate::types::{CurrentState, Epic, Phase, Task, Test, Timestamp};

/// Runs one command against a stored epic.
///
/// **Persistence**: lock, load, mutate in memory, then save once.
/// - Any error returns before the save, so the document is untouched
/// - A command that records no event is a no-op and does not rewrite the
///   document
/// - `current_state` is refreshed just before each save
pub struct EpicWorkflow<'a> {
    store: &'a dyn EpicStore,
    test_options: TestServiceOptions,
}

impl<'a> EpicWorkflow<'a> {
    pub fn new(store: &'a dyn EpicStore) -> Self {
        Self {
            store,
            test_options: TestServiceOptions::default(),
        }
    }

    pub fn with_test_options(mut self, options: TestServiceOptions) -> Self {
        self.test_options = options;
        self
    }

    /// Read-only snapshot of the stored epic.
    pub fn load(&self) -> Result<Epic> {
        self.store.load()
    }

    pub fn location(&self) -> String {
        self.store.location()
    }

    fn mutate<T>(&self, op: impl FnOnce(&mut Epic) -> Result<T>) -> Result<T> {
        let _guard = self.store.lock()?;
        let mut epic = self.store.load()?;
        let before = epic.events.len();

        let out = op(&mut epic)?;

        if epic.events.len() == before {
            debug!(location = %self.store.location(), "no change; skipping save");
            return Ok(out);
        }

        refresh_current_state(&mut epic);
        for violation in invariants::check(&epic) {
            warn!(%violation, "invariant violated after mutation");
        }
        self.store.save(&epic)?;
        Ok(out)
    }

    pub fn start_epic(&self, at: Timestamp) -> Result<EpicSummary> {
        self.mutate(|epic| LifecycleService::new(epic).start(at))
    }

    pub fn complete_epic(&self, at: Timestamp) -> Result<EpicSummary> {
        self.mutate(|epic| LifecycleService::new(epic).complete(at))
    }

    pub fn start_phase(&self, id: &PhaseId, at: Timestamp) -> Result<Phase> {
        self.mutate(|epic| PhaseService::new(epic).start(id, at))
    }

    pub fn complete_phase(&self, id: &PhaseId, at: Timestamp) -> Result<Phase> {
        self.mutate(|epic| PhaseService::new(epic).complete(id, at))
    }

    pub fn cancel_phase(&self, id: &PhaseId, reason: &str, at: Timestamp) -> Result<Phase> {
        self.mutate(|epic| PhaseService::new(epic).cancel(id, reason, at))
    }

    pub fn start_task(&self, id: &TaskId, at: Timestamp) -> Result<Task> {
        self.mutate(|epic| TaskService::new(epic).start(id, at))
    }

    pub fn complete_task(&self, id: &TaskId, at: Timestamp) -> Result<Task> {
        self.mutate(|epic| TaskService::new(epic).complete(id, at))
    }

    pub fn cancel_task(&self, id: &TaskId, reason: &str, at: Timestamp) -> Result<Task> {
        self.mutate(|epic| TaskService::new(epic).cancel(id, reason, at))
    }

    pub fn start_test(&self, id: &TestId, at: Timestamp) -> Result<Test> {
        self.mutate(|epic| TestService::with_options(epic, self.test_options).start(id, at))
    }

    pub fn pass_test(&self, id: &TestId, at: Timestamp) -> Result<Test> {
        self.mutate(|epic| TestService::with_options(epic, self.test_options).pass(id, at))
    }

    pub fn fail_test(&self, id: &TestId, reason: &str, at: Timestamp) -> Result<Test> {
        self.mutate(|epic| TestService::with_options(epic, self.test_options).fail(id, reason, at))
    }

    pub fn cancel_test(&self, id: &TestId, reason: &str, at: Timestamp) -> Result<Test> {
        self.mutate(|epic| {
            TestService::with_options(epic, self.test_options).cancel(id, reason, at)
        })
    }

    pub fn auto_next(&self, at: Timestamp) -> Result<AutoNextResult> {
        self.mutate(|epic| AutoNext::new(epic).run(at))
    }
}

/// Recompute the cached pointer to the active phase, task and next action.
pub fn refresh_current_state(epic: &mut Epic) {
    let active_phase_id = active_phase(epic).map(|p| p.id.clone());
    let active_task_id = active_phase_id
        .as_ref()
        .and_then(|p| active_task(epic, p))
        .map(|t| t.id.clone());
    let next_action = recommend(epic).to_string();

    epic.current_state = Some(CurrentState {
        active_phase: active_phase_id,
        active_task: active_task_id,
        next_action: Some(next_action),
    });
}
