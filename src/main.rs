use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod output;

use epicflow::commands::{epic, phase, task, test, EventsArgs, NewArgs, Output};
use epicflow::commands::{PhaseCommand, TaskCommand, TestCommand};
use epicflow::config::{resolve_epic_path, Config, Workspace};
use epicflow::core::{EpicWorkflow, HintRegistry};
use epicflow::error::{EpicError, Result};
use epicflow::store::FileStore;
use epicflow::types::Timestamp;
use output::{Format, Printer};

#[derive(Parser)]
#[command(name = "epic")]
#[command(version)]
#[command(
    about = "epicflow - phase/task/test workflow engine for epic documents",
    long_about = r#"
epicflow (epic) - Drive an epic through its phases, tasks and tests.

Features:
  • Epic → phase → task → test lifecycle with enforced gates
  • Append-only event log inside the XML document
  • `epic next` picks and starts the next piece of work

Environment:
  EPICFLOW_EPIC        Epic document to operate on
  EPICFLOW_CONFIG      Config file (default: nearest .epicflow/config.json)
  EPICFLOW_LOG         Log filter (default: epicflow=warn)
  EPICFLOW_LOG_FORMAT  Set to `json` for JSON log lines
  NO_COLOR             Disable colored output
"#
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Epic document to operate on (overrides config)
    #[arg(long, global = true)]
    epic: Option<PathBuf>,

    /// Timestamp to record instead of the current time (RFC3339)
    #[arg(long, global = true, value_parser = parse_timestamp)]
    at: Option<Timestamp>,

    /// Config file (default: nearest .epicflow/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize an epicflow workspace in the current directory
    Init,

    /// Create a new epic document
    New(NewArgs),

    /// Switch the workspace's current epic
    Use {
        path: PathBuf,
    },

    /// Start the epic
    Start,

    /// Complete the epic once all phases are finished and no test fails
    Complete,

    /// Summary of the epic and the recommended next action
    Status,

    /// Show which epic, phase and task are current
    Current,

    /// Start the next piece of work
    #[command(
        long_about = r#"
Start the next piece of work.

Picks the first pending task of the active phase, or completes a finished
phase and starts the next pending one (with its first task). Reports
`no_work` when a task is already running and `complete_epic` once every
phase is finished.
"#
    )]
    Next,

    /// Show the event log
    Events(EventsArgs),

    /// Check the document against the workflow invariants
    Validate,

    /// Phase lifecycle
    #[command(subcommand)]
    Phase(PhaseCommand),

    /// Task lifecycle
    #[command(subcommand)]
    Task(TaskCommand),

    /// Test lifecycle
    #[command(subcommand)]
    Test(TestCommand),

    /// Generate shell completions
    #[command(
        about = "Generate shell completions",
        long_about = r#"
Generate shell completions for the epic CLI.

Examples:
  epic completions bash > ~/.local/share/bash-completion/completions/epic
  epic completions zsh > ~/.zfunc/_epic
  epic completions fish > ~/.config/fish/completions/epic.fish
"#
    )]
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },
}

fn parse_timestamp(s: &str) -> std::result::Result<Timestamp, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC3339 timestamp: {e}"))
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("epicflow=debug")
    } else {
        EnvFilter::try_from_env("EPICFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("epicflow=warn"))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false);

    if std::env::var("EPICFLOW_LOG_FORMAT").ok().as_deref() == Some("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name).map(PathBuf::from)
}

fn main() {
    let cli = Cli::parse();

    // PRECONDITION: Completions bypass normal output flow - raw shell script to stdout
    if let Command::Completions { shell } = &cli.command {
        generate(*shell, &mut Cli::command(), "epic", &mut io::stdout());
        return;
    }

    init_tracing(cli.verbose);

    let at = cli.at.unwrap_or_else(Utc::now);
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let explicit_config = cli.config.clone().or_else(|| env_path("EPICFLOW_CONFIG"));

    let mut workspace = match Workspace::discover(&cwd, explicit_config.as_deref()) {
        Ok(ws) => ws,
        Err(e) => fail(cli.format, cli.no_color, &HintRegistry::default(), &e),
    };
    let config = workspace
        .as_ref()
        .map(|w| w.config.clone())
        .unwrap_or_default();
    let hints = HintRegistry::new(config.hints.clone());
    let (format, no_color) = (cli.format, cli.no_color);

    match run(cli.command, cli.epic.as_deref(), &mut workspace, &config, &cwd, at) {
        Ok(output) => {
            let rendered = match format {
                Format::Json => output::to_json(&output).map(Some),
                Format::Xml => output::to_xml(&output).map(Some),
                Format::Text => {
                    Printer::new(no_color).print(&output);
                    Ok(None)
                }
            };
            match rendered {
                Ok(Some(text)) => println!("{text}"),
                Ok(None) => {}
                Err(e) => fail(format, no_color, &hints, &e),
            }
            if output.is_failure() {
                std::process::exit(1);
            }
        }
        Err(e) => fail(format, no_color, &hints, &e),
    }
}

fn fail(format: Format, no_color: bool, hints: &HintRegistry, err: &EpicError) -> ! {
    let hint = hints.hint_for(err);
    match format {
        Format::Json => eprintln!("{}", output::error_json(err, hint.as_ref())),
        Format::Xml => eprintln!("{}", output::error_xml(err, hint.as_ref())),
        Format::Text => Printer::new_for_stderr(no_color).print_error(err, hint.as_ref()),
    }
    std::process::exit(1);
}

fn run(
    command: Command,
    epic_flag: Option<&Path>,
    workspace: &mut Option<Workspace>,
    config: &Config,
    cwd: &Path,
    at: Timestamp,
) -> Result<Output> {
    match command {
        Command::Init => return epic::init(cwd),
        Command::New(args) => return epic::create(args, workspace.as_mut(), cwd, at),
        Command::Use { path } => return epic::use_epic(&path, workspace.as_mut(), cwd),
        // PRECONDITION: Completions handled in main() before run() is called
        Command::Completions { .. } => unreachable!("completions handled before run()"),
        _ => {}
    }

    let path = resolve_epic_path(epic_flag, env_path("EPICFLOW_EPIC"), workspace.as_ref())?;
    let path = if path.is_absolute() { path } else { cwd.join(path) };
    debug!(epic = %path.display(), "resolved epic document");

    let store = FileStore::new(path);
    let workflow = EpicWorkflow::new(&store).with_test_options(config.tests.service_options());

    match command {
        Command::Start => epic::start(&workflow, at),
        Command::Complete => epic::complete(&workflow, at),
        Command::Status => epic::status(&workflow),
        Command::Current => epic::current(&workflow),
        Command::Next => epic::next(&workflow, at),
        Command::Events(args) => epic::events(&workflow, &args),
        Command::Validate => epic::validate(&workflow),
        Command::Phase(cmd) => phase::handle(&workflow, cmd, at),
        Command::Task(cmd) => task::handle(&workflow, cmd, at),
        Command::Test(cmd) => test::handle(&workflow, cmd, at),
        Command::Init | Command::New(_) | Command::Use { .. } | Command::Completions { .. } => {
            unreachable!("handled above")
        }
    }
}
