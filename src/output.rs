use std::fmt::Display;
use std::io::IsTerminal;

use chrono::SecondsFormat;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Style};
use serde::Serialize;

use epicflow::commands::{
    CreatedReport, CurrentReport, Output, StatusReport, SwitchReport, ValidationReport,
};
use epicflow::core::{AutoNextResult, EpicSummary, Hint, NextAction};
use epicflow::error::{EpicError, Result};
use epicflow::status::{TestOutcome, TestStatus, WorkStatus};
use epicflow::types::{Event, Phase, Task, TestView, Timestamp};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    #[default]
    Text,
    Json,
    Xml,
}

/// Color policy: --no-color > NO_COLOR env > TERM=dumb > !isatty > default (color)
fn should_use_color_for(no_color_flag: bool, is_tty: bool) -> bool {
    if no_color_flag {
        return false;
    }
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    if std::env::var("TERM").ok().as_deref() == Some("dumb") {
        return false;
    }
    is_tty
}

fn should_use_color(no_color_flag: bool) -> bool {
    should_use_color_for(no_color_flag, std::io::stdout().is_terminal())
}

fn should_use_color_stderr(no_color_flag: bool) -> bool {
    should_use_color_for(no_color_flag, std::io::stderr().is_terminal())
}

fn fmt_ts(ts: Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn xml_err(err: impl Display) -> EpicError {
    EpicError::Xml(err.to_string())
}

// ============ JSON ============

pub fn to_json(output: &Output) -> Result<String> {
    let text = match output {
        Output::Initialized(r) => serde_json::to_string_pretty(r)?,
        Output::Created(r) => serde_json::to_string_pretty(r)?,
        Output::Switched(r) => serde_json::to_string_pretty(r)?,
        Output::Summary(s) => serde_json::to_string_pretty(s)?,
        Output::Status(r) => serde_json::to_string_pretty(r)?,
        Output::Current(r) => serde_json::to_string_pretty(r)?,
        Output::AutoNext(r) => serde_json::to_string_pretty(r)?,
        Output::Events(es) => serde_json::to_string_pretty(es)?,
        Output::Validation(r) => serde_json::to_string_pretty(r)?,
        Output::Phase(p) => serde_json::to_string_pretty(p)?,
        Output::Phases(ps) => serde_json::to_string_pretty(ps)?,
        Output::Task(t) => serde_json::to_string_pretty(t)?,
        Output::Tasks(ts) => serde_json::to_string_pretty(ts)?,
        Output::Test(t) => serde_json::to_string_pretty(t)?,
        Output::Tests(ts) => serde_json::to_string_pretty(ts)?,
    };
    Ok(text)
}

pub fn error_json(err: &EpicError, hint: Option<&Hint>) -> String {
    serde_json::json!({
        "error": err.to_string(),
        "kind": err.kind(),
        "hint": hint,
    })
    .to_string()
}

// ============ XML ============

fn xml_element<T: Serialize + ?Sized>(root: &str, value: &T) -> Result<String> {
    let mut out = String::new();
    let mut ser = quick_xml::se::Serializer::with_root(&mut out, Some(root)).map_err(xml_err)?;
    ser.indent(' ', 2);
    value.serialize(ser).map_err(xml_err)?;
    Ok(out)
}

fn xml_list<T: Serialize>(root: &str, item: &str, values: &[T]) -> Result<String> {
    let mut out = format!("<{root}>\n");
    for value in values {
        for line in xml_element(item, value)?.lines() {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out.push_str(&format!("</{root}>"));
    Ok(out)
}

#[derive(Serialize)]
struct TaskStartedXml<'a> {
    #[serde(rename = "@id")]
    id: &'a str,
    #[serde(rename = "@phase_id", skip_serializing_if = "Option::is_none")]
    phase_id: Option<&'a str>,
    #[serde(rename = "@name", skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(rename = "@status", skip_serializing_if = "Option::is_none")]
    status: Option<WorkStatus>,
    #[serde(rename = "@started_at", skip_serializing_if = "Option::is_none")]
    started_at: Option<String>,
    #[serde(rename = "@auto_selected", skip_serializing_if = "Option::is_none")]
    auto_selected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

#[derive(Serialize)]
struct PhaseStartedXml<'a> {
    #[serde(rename = "@id")]
    id: &'a str,
    #[serde(rename = "@name", skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(rename = "@status", skip_serializing_if = "Option::is_none")]
    status: Option<WorkStatus>,
    #[serde(rename = "@started_at", skip_serializing_if = "Option::is_none")]
    started_at: Option<String>,
    #[serde(rename = "@auto_selected")]
    auto_selected: bool,
    #[serde(rename = "@completed_phase_id", skip_serializing_if = "Option::is_none")]
    completed_phase_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_started: Option<TaskStartedXml<'a>>,
    message: &'a str,
}

#[derive(Serialize)]
struct IdleXml<'a> {
    #[serde(rename = "@phase_id", skip_serializing_if = "Option::is_none")]
    phase_id: Option<&'a str>,
    #[serde(rename = "@task_id", skip_serializing_if = "Option::is_none")]
    task_id: Option<&'a str>,
    #[serde(rename = "@completed_phase_id", skip_serializing_if = "Option::is_none")]
    completed_phase_id: Option<&'a str>,
    message: &'a str,
}

fn auto_next_xml(result: &AutoNextResult) -> Result<String> {
    let phase_id = result.phase_id.as_ref().map(|p| p.as_str());
    let task_id = result.task_id.as_ref().map(|t| t.as_str());
    let completed_phase_id = result.completed_phase_id.as_ref().map(|p| p.as_str());

    match (result.action, phase_id, task_id) {
        (NextAction::StartPhase, Some(phase_id), task_id) => {
            let task_started = task_id.map(|id| TaskStartedXml {
                id,
                phase_id: None,
                name: result.task_name.as_deref(),
                status: result.task_status,
                started_at: result.started_at.map(fmt_ts),
                auto_selected: None,
                message: None,
            });
            xml_element(
                "phase_started",
                &PhaseStartedXml {
                    id: phase_id,
                    name: result.phase_name.as_deref(),
                    status: result.phase_status,
                    started_at: result.started_at.map(fmt_ts),
                    auto_selected: result.auto_selected,
                    completed_phase_id,
                    task_started,
                    message: &result.message,
                },
            )
        }
        (NextAction::StartTask, phase_id, Some(task_id)) => xml_element(
            "task_started",
            &TaskStartedXml {
                id: task_id,
                phase_id,
                name: result.task_name.as_deref(),
                status: result.task_status,
                started_at: result.started_at.map(fmt_ts),
                auto_selected: Some(result.auto_selected),
                message: Some(&result.message),
            },
        ),
        (action, phase_id, task_id) => {
            let root = if action == NextAction::CompleteEpic {
                "all_complete"
            } else {
                "no_work"
            };
            xml_element(
                root,
                &IdleXml {
                    phase_id,
                    task_id,
                    completed_phase_id,
                    message: &result.message,
                },
            )
        }
    }
}

pub fn to_xml(output: &Output) -> Result<String> {
    match output {
        Output::Initialized(r) => xml_element("initialized", r),
        Output::Created(r) => xml_element("created", r),
        Output::Switched(r) => xml_element("switched", r),
        Output::Summary(s) => xml_element("summary", s),
        Output::Status(r) => xml_element("status", r),
        Output::Current(r) => xml_element("current", r),
        Output::AutoNext(r) => auto_next_xml(r),
        Output::Events(es) => xml_list("events", "event", es),
        Output::Validation(r) => xml_element("validation", r),
        Output::Phase(p) => xml_element("phase", p),
        Output::Phases(ps) => xml_list("phases", "phase", ps),
        Output::Task(t) => xml_element("task", t),
        Output::Tasks(ts) => xml_list("tasks", "task", ts),
        Output::Test(t) => xml_element("test", t),
        Output::Tests(ts) => xml_list("tests", "test", ts),
    }
}

#[derive(Serialize)]
struct HintXml<'a> {
    #[serde(rename = "@command", skip_serializing_if = "Option::is_none")]
    command: Option<&'a str>,
    #[serde(rename = "$text")]
    message: &'a str,
}

#[derive(Serialize)]
struct ErrorXml<'a> {
    #[serde(rename = "@kind")]
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<HintXml<'a>>,
}

pub fn error_xml(err: &EpicError, hint: Option<&Hint>) -> String {
    let doc = ErrorXml {
        kind: err.kind().as_str(),
        message: err.to_string(),
        hint: hint.map(|h| HintXml {
            command: h.suggested_command.as_deref(),
            message: &h.message,
        }),
    };
    // Fall back to a hand-built element if serialization itself fails.
    xml_element("error", &doc).unwrap_or_else(|_| {
        format!(
            "<error kind=\"{}\">{}</error>",
            err.kind(),
            quick_xml::escape::escape(err.to_string().as_str())
        )
    })
}

// ============ Text ============

/// Color scheme for output
struct Colors {
    id: Style,
    completed: Style,
    active: Style,
    pending: Style,
    cancelled: Style,
    failing: Style,
    heading: Style,
    dim: Style,
    error: Style,
    hint: Style,
}

impl Colors {
    fn new(use_color: bool) -> Self {
        if use_color {
            Self {
                id: Style::new().cyan().dimmed(),
                completed: Style::new().green(),
                active: Style::new().blue().bold(),
                pending: Style::new().yellow(),
                cancelled: Style::new().dimmed().strikethrough(),
                failing: Style::new().red(),
                heading: Style::new().bold(),
                dim: Style::new().dimmed(),
                error: Style::new().red().bold(),
                hint: Style::new().yellow(),
            }
        } else {
            Self {
                id: Style::new(),
                completed: Style::new(),
                active: Style::new(),
                pending: Style::new(),
                cancelled: Style::new(),
                failing: Style::new(),
                heading: Style::new(),
                dim: Style::new(),
                error: Style::new(),
                hint: Style::new(),
            }
        }
    }
}

/// Handles human-readable CLI output.
pub struct Printer {
    colors: Colors,
}

impl Printer {
    /// Create printer for stdout (standard output)
    pub fn new(no_color_flag: bool) -> Self {
        Self {
            colors: Colors::new(should_use_color(no_color_flag)),
        }
    }

    /// Create printer for stderr (error output)
    pub fn new_for_stderr(no_color_flag: bool) -> Self {
        Self {
            colors: Colors::new(should_use_color_stderr(no_color_flag)),
        }
    }

    pub fn print_error(&self, err: &EpicError, hint: Option<&Hint>) {
        eprintln!("{}", format!("Error: {err}").style(self.colors.error));
        if let Some(hint) = hint {
            eprintln!("{} {}", "hint:".style(self.colors.hint), hint.message);
            if let Some(cmd) = &hint.suggested_command {
                eprintln!("  {} {}", "try:".style(self.colors.dim), cmd);
            }
        }
    }

    fn fmt_id(&self, id: &impl Display) -> String {
        format!("{}", id.to_string().style(self.colors.id))
    }

    fn work_symbol_style(&self, status: WorkStatus) -> (&'static str, Style) {
        match status {
            WorkStatus::Completed => ("✓", self.colors.completed),
            WorkStatus::Active => ("●", self.colors.active),
            WorkStatus::Pending => ("○", self.colors.pending),
            WorkStatus::Cancelled => ("✗", self.colors.cancelled),
        }
    }

    fn test_symbol_style(&self, status: TestStatus, result: Option<TestOutcome>) -> (&'static str, Style) {
        match (status, result) {
            (_, Some(TestOutcome::Failing)) if status != TestStatus::Cancelled => {
                ("✗", self.colors.failing)
            }
            (TestStatus::Done, _) => ("✓", self.colors.completed),
            (TestStatus::Active, _) => ("●", self.colors.active),
            (TestStatus::Pending, _) => ("○", self.colors.pending),
            (TestStatus::Cancelled, _) => ("-", self.colors.cancelled),
        }
    }

    pub fn print(&self, output: &Output) {
        match output {
            Output::Initialized(r) => {
                println!("Initialized epicflow workspace: {}", r.config_path.display());
            }
            Output::Created(r) => self.print_created(r),
            Output::Switched(r) => self.print_switched(r),
            Output::Summary(s) => self.print_summary(s),
            Output::Status(r) => self.print_status(r),
            Output::Current(r) => self.print_current(r),
            Output::AutoNext(r) => self.print_auto_next(r),
            Output::Events(es) => self.print_events(es),
            Output::Validation(r) => self.print_validation(r),
            Output::Phase(p) => self.print_phase(p),
            Output::Phases(ps) => {
                if ps.is_empty() {
                    println!("No phases");
                }
                ps.iter().for_each(|p| self.print_phase(p));
            }
            Output::Task(t) => self.print_task(t),
            Output::Tasks(ts) => {
                if ts.is_empty() {
                    println!("No tasks");
                }
                ts.iter().for_each(|t| self.print_task(t));
            }
            Output::Test(t) => self.print_test(t),
            Output::Tests(ts) => {
                if ts.is_empty() {
                    println!("No tests");
                }
                ts.iter().for_each(|t| self.print_test(t));
            }
        }
    }

    fn print_created(&self, r: &CreatedReport) {
        println!(
            "Created epic {} {} at {}",
            self.fmt_id(&r.epic_id),
            r.name.style(self.colors.heading),
            r.path.display()
        );
        if r.current {
            println!("{}", "Now the current epic".style(self.colors.dim));
        }
    }

    fn print_switched(&self, r: &SwitchReport) {
        println!(
            "Using epic {} {} ({})",
            self.fmt_id(&r.epic_id),
            r.name.style(self.colors.heading),
            r.current_epic.display()
        );
        if let Some(previous) = &r.previous_epic {
            println!("{}", format!("Previous: {}", previous.display()).style(self.colors.dim));
        }
    }

    fn print_summary(&self, s: &EpicSummary) {
        println!(
            "{} {} [{}]",
            s.name.style(self.colors.heading),
            self.fmt_id(&s.epic_id),
            s.status
        );
        println!(
            "  phases: {}/{} done, {} cancelled",
            s.phases.completed, s.phases.total, s.phases.cancelled
        );
        println!(
            "  tasks:  {}/{} done, {} active, {} cancelled",
            s.tasks.completed, s.tasks.total, s.tasks.active, s.tasks.cancelled
        );
        let failing = if s.tests.failing > 0 {
            format!("{} failing", s.tests.failing)
                .style(self.colors.failing)
                .to_string()
        } else {
            "0 failing".to_string()
        };
        println!(
            "  tests:  {}/{} done, {} passing, {}",
            s.tests.done, s.tests.total, s.tests.passing, failing
        );
        if let Some(secs) = s.duration_seconds {
            println!("  took:   {}", format_duration(secs));
        }
    }

    fn print_status(&self, r: &StatusReport) {
        self.print_summary(&r.summary);
        match &r.active_phase {
            Some(phase) => println!(
                "  phase:  {} {}",
                self.fmt_id(&phase.id),
                phase.name
            ),
            None => println!("  phase:  {}", "none active".style(self.colors.dim)),
        }
        if let Some(task) = &r.active_task {
            println!("  task:   {} {}", self.fmt_id(&task.id), task.name);
        }
        println!("  next:   {}", r.next.to_string().style(self.colors.active));
        println!("{}", r.path.style(self.colors.dim));
    }

    fn print_current(&self, r: &CurrentReport) {
        println!(
            "{} {} [{}]",
            r.name.style(self.colors.heading),
            self.fmt_id(&r.epic_id),
            r.status
        );
        println!("  {}", r.path.style(self.colors.dim));
        if let Some(phase) = &r.active_phase {
            println!("  phase: {}", self.fmt_id(phase));
        }
        if let Some(task) = &r.active_task {
            println!("  task:  {}", self.fmt_id(task));
        }
    }

    fn print_auto_next(&self, r: &AutoNextResult) {
        let style = match r.action {
            NextAction::NoWork => self.colors.pending,
            NextAction::CompleteEpic => self.colors.completed,
            NextAction::StartPhase | NextAction::StartTask => self.colors.active,
        };
        println!("{} {}", r.action.as_str().style(style), r.message);
        if let Some(completed) = &r.completed_phase_id {
            println!("  completed phase {}", self.fmt_id(completed));
        }
    }

    fn print_events(&self, events: &[Event]) {
        if events.is_empty() {
            println!("No events");
        }
        for e in events {
            println!(
                "{} {} {:<16} {}",
                fmt_ts(e.timestamp).style(self.colors.dim),
                self.fmt_id(&e.id),
                e.kind.as_str(),
                e.data
            );
        }
    }

    fn print_validation(&self, r: &ValidationReport) {
        if r.valid {
            println!("{} {}", "✓".style(self.colors.completed), r.path);
            return;
        }
        println!(
            "{} {}: {} problem(s)",
            "✗".style(self.colors.failing),
            r.path,
            r.violations.len()
        );
        for v in &r.violations {
            println!("  {}: {}", v.invariant.as_str().style(self.colors.failing), v.message);
        }
    }

    fn print_phase(&self, p: &Phase) {
        let (symbol, style) = self.work_symbol_style(p.status);
        println!(
            "{} {} {}",
            symbol.style(style),
            self.fmt_id(&p.id),
            p.name.style(self.colors.heading)
        );
        if let Some(reason) = &p.cancellation_reason {
            println!("    {}", format!("cancelled: {reason}").style(self.colors.dim));
        }
    }

    fn print_task(&self, t: &Task) {
        let (symbol, style) = self.work_symbol_style(t.status);
        println!(
            "{} {} {} {}",
            symbol.style(style),
            self.fmt_id(&t.id),
            t.name,
            format!("({})", t.phase_id).style(self.colors.dim)
        );
        if let Some(reason) = &t.cancellation_reason {
            println!("    {}", format!("cancelled: {reason}").style(self.colors.dim));
        }
    }

    fn print_test(&self, t: &TestView) {
        let (symbol, style) = self.test_symbol_style(t.test_status, t.test_result);
        let result = t
            .test_result
            .map(|r| format!(" {r}"))
            .unwrap_or_default();
        println!(
            "{} {} {} {}",
            symbol.style(style),
            self.fmt_id(&t.id),
            t.name,
            format!("({}{result})", t.test_status).style(self.colors.dim)
        );
        if let Some(note) = &t.failure_note {
            if t.test_result == Some(TestOutcome::Failing) {
                println!("    {}", note.style(self.colors.failing));
            }
        }
        if let Some(reason) = &t.cancellation_reason {
            println!("    {}", format!("cancelled: {reason}").style(self.colors.dim));
        }
    }
}

impl Default for Printer {
    fn default() -> Self {
        Self::new(false)
    }
}

fn format_duration(secs: i64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epicflow::id::{PhaseId, TaskId};

    fn started_phase() -> AutoNextResult {
        let at = "2024-01-01T10:00:00Z".parse().unwrap();
        AutoNextResult {
            action: NextAction::StartPhase,
            phase_id: Some("P1".parse::<PhaseId>().unwrap()),
            task_id: Some("T1".parse::<TaskId>().unwrap()),
            phase_name: Some("Design".into()),
            task_name: Some("Sketch".into()),
            phase_status: Some(WorkStatus::Active),
            task_status: Some(WorkStatus::Active),
            started_at: Some(at),
            auto_selected: true,
            message: "Started phase P1 and task T1: Sketch".into(),
            completed_phase_id: None,
        }
    }

    #[test]
    fn no_color_flag_wins() {
        assert!(!should_use_color_for(true, true));
    }

    #[test]
    fn phase_started_nests_task_started() {
        let xml = auto_next_xml(&started_phase()).unwrap();
        assert!(xml.starts_with("<phase_started id=\"P1\""), "{xml}");
        assert!(xml.contains("<task_started id=\"T1\""), "{xml}");
        assert!(xml.contains("started_at=\"2024-01-01T10:00:00Z\""), "{xml}");
        assert!(xml.trim_end().ends_with("</phase_started>"), "{xml}");
    }

    #[test]
    fn no_work_and_all_complete_roots() {
        let mut result = started_phase();
        result.action = NextAction::NoWork;
        result.task_id = None;
        assert!(auto_next_xml(&result).unwrap().starts_with("<no_work"));

        result.action = NextAction::CompleteEpic;
        result.phase_id = None;
        assert!(auto_next_xml(&result).unwrap().starts_with("<all_complete"));
    }

    #[test]
    fn error_json_carries_kind_and_hint() {
        let err = EpicError::NoCurrentEpic;
        let hint = Hint {
            message: "pick one".into(),
            suggested_command: Some("epic use <path>".into()),
            priority: epicflow::core::HintPriority::Medium,
        };
        let value: serde_json::Value =
            serde_json::from_str(&error_json(&err, Some(&hint))).unwrap();
        assert_eq!(value["kind"], "config");
        assert_eq!(value["hint"]["message"], "pick one");
    }

    #[test]
    fn error_xml_has_kind_attribute() {
        let err = EpicError::validation("bad <input>");
        let xml = error_xml(&err, None);
        assert!(xml.starts_with("<error kind=\"validation\">"), "{xml}");
        assert!(xml.contains("&lt;input"), "{xml}");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(7260), "2h 1m");
    }
}
