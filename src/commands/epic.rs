//! Epic-level commands: workspace setup, lifecycle, and read-only views.

use std::path::{Path, PathBuf};

use clap::Args;
use tracing::info;

use crate::commands::{
    CreatedReport, CurrentReport, InitReport, Output, StatusReport, SwitchReport,
    ValidationReport,
};
use crate::config::Workspace;
use crate::core::phase_service::active_phase;
use crate::core::task_service::active_task;
use crate::core::workflow_service::refresh_current_state;
use crate::core::{invariants, recommend, summarize, EpicWorkflow};
use crate::error::{EpicError, Result};
use crate::id::EpicId;
use crate::store::{EpicStore, FileStore};
use crate::types::{Epic, EventKind, Timestamp};

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Where to write the new epic document
    pub path: PathBuf,

    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub assignee: Option<String>,

    #[arg(long)]
    pub priority: Option<String>,

    #[arg(short = 'd', long)]
    pub description: Option<String>,

    /// Do not make the new epic the workspace's current epic
    #[arg(long)]
    pub no_switch: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EventsArgs {
    /// Show only the most recent N events
    #[arg(long)]
    pub limit: Option<usize>,

    /// Only events of this type, e.g. `test_failed`
    #[arg(long = "type")]
    pub kind: Option<String>,
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

fn require_workspace(workspace: Option<&mut Workspace>) -> Result<&mut Workspace> {
    workspace.ok_or_else(|| {
        EpicError::validation("not inside an epicflow workspace; run `epic init` first")
    })
}

pub fn init(cwd: &Path) -> Result<Output> {
    let workspace = Workspace::init(cwd)?;
    info!(root = %workspace.root.display(), "initialized workspace");
    Ok(Output::Initialized(InitReport {
        root: workspace.root,
        config_path: workspace.config_path,
    }))
}

/// Write a fresh pending epic and, inside a workspace, make it current.
pub fn create(
    args: NewArgs,
    workspace: Option<&mut Workspace>,
    cwd: &Path,
    at: Timestamp,
) -> Result<Output> {
    let path = absolute(cwd, &args.path);

    let mut epic = Epic::new(EpicId::generate(), args.name, at);
    epic.assignee = args
        .assignee
        .or_else(|| workspace.as_ref().and_then(|w| w.config.default_assignee.clone()));
    epic.priority = args.priority;
    epic.description = args.description;
    refresh_current_state(&mut epic);

    FileStore::new(&path).create(&epic)?;

    let mut current = false;
    if let Some(ws) = workspace {
        if !args.no_switch {
            ws.switch_to(&path);
            ws.save()?;
            current = true;
        }
    }

    Ok(Output::Created(CreatedReport {
        path,
        epic_id: epic.id,
        name: epic.name,
        current,
    }))
}

/// Make an existing document the current epic.
pub fn use_epic(path: &Path, workspace: Option<&mut Workspace>, cwd: &Path) -> Result<Output> {
    let workspace = require_workspace(workspace)?;
    let path = absolute(cwd, path);
    let epic = FileStore::new(&path).load()?;

    workspace.switch_to(&path);
    workspace.save()?;

    Ok(Output::Switched(SwitchReport {
        current_epic: path,
        previous_epic: workspace
            .config
            .previous_epic
            .as_deref()
            .map(|p| workspace.resolve(p)),
        epic_id: epic.id,
        name: epic.name,
    }))
}

pub fn start(workflow: &EpicWorkflow, at: Timestamp) -> Result<Output> {
    Ok(Output::Summary(workflow.start_epic(at)?))
}

pub fn complete(workflow: &EpicWorkflow, at: Timestamp) -> Result<Output> {
    Ok(Output::Summary(workflow.complete_epic(at)?))
}

pub fn next(workflow: &EpicWorkflow, at: Timestamp) -> Result<Output> {
    Ok(Output::AutoNext(workflow.auto_next(at)?))
}

pub fn status(workflow: &EpicWorkflow) -> Result<Output> {
    let epic = workflow.load()?;
    let phase = active_phase(&epic).cloned();
    let task = phase
        .as_ref()
        .and_then(|p| active_task(&epic, &p.id))
        .cloned();

    Ok(Output::Status(StatusReport {
        path: workflow.location(),
        summary: summarize(&epic),
        active_phase: phase,
        active_task: task,
        next: recommend(&epic),
    }))
}

pub fn current(workflow: &EpicWorkflow) -> Result<Output> {
    let epic = workflow.load()?;
    let phase_id = active_phase(&epic).map(|p| p.id.clone());
    let task_id = phase_id
        .as_ref()
        .and_then(|p| active_task(&epic, p))
        .map(|t| t.id.clone());

    Ok(Output::Current(CurrentReport {
        path: workflow.location(),
        epic_id: epic.id,
        name: epic.name,
        status: epic.status,
        active_phase: phase_id,
        active_task: task_id,
    }))
}

pub fn events(workflow: &EpicWorkflow, args: &EventsArgs) -> Result<Output> {
    let epic = workflow.load()?;
    let kind = args.kind.as_deref().map(EventKind::parse);

    let mut events: Vec<_> = epic
        .events
        .iter()
        .filter(|e| kind.as_ref().map_or(true, |k| &e.kind == k))
        .cloned()
        .collect();
    if let Some(limit) = args.limit {
        let skip = events.len().saturating_sub(limit);
        events.drain(..skip);
    }
    Ok(Output::Events(events))
}

/// Structural problems fail the load; global invariant breaks are reported.
pub fn validate(workflow: &EpicWorkflow) -> Result<Output> {
    let epic = workflow.load()?;
    let violations = invariants::check(&epic);
    Ok(Output::Validation(ValidationReport {
        path: workflow.location(),
        valid: violations.is_empty(),
        violations,
    }))
}
