pub mod auto_next;
pub mod events;
pub mod hints;
pub mod invariants;
pub mod lifecycle_service;
pub mod phase_service;
pub mod task_service;
pub mod test_service;
pub mod validation;
pub mod workflow_service;

pub use auto_next::{recommend, AutoNext, AutoNextResult, NextAction, Recommendation};
pub use hints::{Hint, HintConfig, HintPriority, HintRegistry};
pub use lifecycle_service::{summarize, EpicSummary, LifecycleService};
pub use phase_service::PhaseService;
pub use task_service::TaskService;
pub use test_service::{TestService, TestServiceOptions};
pub use workflow_service::EpicWorkflow;
