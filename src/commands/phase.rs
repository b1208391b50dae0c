use clap::Subcommand;

use crate::commands::{parse_id, Output};
use crate::core::EpicWorkflow;
use crate::error::Result;
use crate::id::PhaseId;
use crate::types::Timestamp;

#[derive(Subcommand, Debug, Clone)]
pub enum PhaseCommand {
    /// Start a pending phase (only one phase may be active)
    Start {
        #[arg(value_parser = parse_id::<PhaseId>)]
        id: PhaseId,
    },
    /// Complete the active phase once its tasks and tests are settled
    Complete {
        #[arg(value_parser = parse_id::<PhaseId>)]
        id: PhaseId,
    },
    /// Cancel a phase together with its unfinished tasks and tests
    Cancel {
        #[arg(value_parser = parse_id::<PhaseId>)]
        id: PhaseId,

        #[arg(short, long)]
        reason: String,
    },
    /// List phases in document order
    List,
}

pub fn handle(workflow: &EpicWorkflow, cmd: PhaseCommand, at: Timestamp) -> Result<Output> {
    match cmd {
        PhaseCommand::Start { id } => Ok(Output::Phase(workflow.start_phase(&id, at)?)),
        PhaseCommand::Complete { id } => Ok(Output::Phase(workflow.complete_phase(&id, at)?)),
        PhaseCommand::Cancel { id, reason } => {
            Ok(Output::Phase(workflow.cancel_phase(&id, &reason, at)?))
        }
        PhaseCommand::List => Ok(Output::Phases(workflow.load()?.phases)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::PhaseStatus;
    use crate::store::MemoryStore;
    use crate::testutil::{ts, EpicBuilder};

    #[test]
    fn start_then_list() {
        let epic = EpicBuilder::new("E1").phase("P1").phase("P2").build();
        let store = MemoryStore::new(&epic).unwrap();
        let workflow = EpicWorkflow::new(&store);

        let started = handle(
            &workflow,
            PhaseCommand::Start {
                id: "P1".parse().unwrap(),
            },
            ts(1),
        )
        .unwrap();
        assert!(matches!(started, Output::Phase(p) if p.status == PhaseStatus::Active));

        let Output::Phases(phases) = handle(&workflow, PhaseCommand::List, ts(2)).unwrap() else {
            panic!("expected phase list");
        };
        let statuses: Vec<_> = phases.iter().map(|p| p.status).collect();
        assert_eq!(statuses, vec![PhaseStatus::Active, PhaseStatus::Pending]);
    }

    #[test]
    fn cancel_requires_reason() {
        let epic = EpicBuilder::new("E1").phase("P1").build();
        let store = MemoryStore::new(&epic).unwrap();
        let workflow = EpicWorkflow::new(&store);

        let cmd = PhaseCommand::Cancel {
            id: "P1".parse().unwrap(),
            reason: "  ".into(),
        };
        assert!(handle(&workflow, cmd, ts(1)).is_err());
        assert_eq!(store.save_count(), 0);
    }
}
