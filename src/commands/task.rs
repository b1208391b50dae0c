use clap::{Args, Subcommand};

use crate::commands::{parse_id, Output};
use crate::core::task_service::tasks_in_phase;
use crate::core::EpicWorkflow;
use crate::error::{EpicError, Result};
use crate::id::{PhaseId, TaskId};
use crate::status::EntityKind;
use crate::types::Timestamp;

#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommand {
    /// Start a task in the active phase
    Start {
        #[arg(value_parser = parse_id::<TaskId>)]
        id: TaskId,
    },
    /// Complete a task once none of its tests are pending or running
    Complete {
        #[arg(value_parser = parse_id::<TaskId>)]
        id: TaskId,
    },
    /// Cancel a task
    Cancel {
        #[arg(value_parser = parse_id::<TaskId>)]
        id: TaskId,

        #[arg(short, long)]
        reason: String,
    },
    /// List tasks, optionally for one phase
    List(ListArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[arg(long, value_parser = parse_id::<PhaseId>)]
    pub phase: Option<PhaseId>,
}

pub fn handle(workflow: &EpicWorkflow, cmd: TaskCommand, at: Timestamp) -> Result<Output> {
    match cmd {
        TaskCommand::Start { id } => Ok(Output::Task(workflow.start_task(&id, at)?)),
        TaskCommand::Complete { id } => Ok(Output::Task(workflow.complete_task(&id, at)?)),
        TaskCommand::Cancel { id, reason } => {
            Ok(Output::Task(workflow.cancel_task(&id, &reason, at)?))
        }
        TaskCommand::List(args) => {
            let epic = workflow.load()?;
            let tasks = match &args.phase {
                Some(phase_id) => {
                    if epic.phase(phase_id).is_none() {
                        return Err(EpicError::not_found(EntityKind::Phase, phase_id));
                    }
                    tasks_in_phase(&epic, phase_id).into_iter().cloned().collect()
                }
                None => epic.tasks,
            };
            Ok(Output::Tasks(tasks))
        }
    }
}
