//! Maps workflow errors to an actionable next step.
//!
//! Rules are kept sorted by priority (highest first) and the first rule whose
//! predicate matches produces the hint. The fallback rule always matches.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EpicError, TaskConstraintReason};
use crate::status::EntityKind;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HintPriority {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hint {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_command: Option<String>,
    pub priority: HintPriority,
}

/// Replacement text for one error kind. Unset fields keep the built-in text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_command: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub min_priority: HintPriority,
    /// Keyed by error kind name, e.g. `phase_constraint`.
    #[serde(default)]
    pub overrides: BTreeMap<String, HintOverride>,
}

fn default_enabled() -> bool {
    true
}

impl Default for HintConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_priority: HintPriority::Low,
            overrides: BTreeMap::new(),
        }
    }
}

/// One entry of the rule table.
#[derive(Clone, Copy)]
pub struct HintRule {
    pub name: &'static str,
    pub priority: HintPriority,
    pub matches: fn(&EpicError) -> bool,
    pub build: fn(&EpicError) -> (String, Option<String>),
}

pub struct HintRegistry {
    rules: Vec<HintRule>,
    config: HintConfig,
}

impl HintRegistry {
    pub fn new(config: HintConfig) -> Self {
        let mut registry = Self {
            rules: Vec::new(),
            config,
        };
        for rule in builtin_rules() {
            registry.register(rule);
        }
        registry
    }

    /// Add a rule. Among equal priorities, earlier registrations win.
    pub fn register(&mut self, rule: HintRule) {
        let at = self
            .rules
            .iter()
            .position(|r| r.priority < rule.priority)
            .unwrap_or(self.rules.len());
        self.rules.insert(at, rule);
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }

    pub fn hint_for(&self, err: &EpicError) -> Option<Hint> {
        if !self.config.enabled {
            return None;
        }
        let overrides = self.config.overrides.get(err.kind().as_str());
        if overrides.is_some_and(|o| o.disabled) {
            return None;
        }

        let rule = self
            .rules
            .iter()
            .filter(|r| r.priority >= self.config.min_priority)
            .find(|r| (r.matches)(err))?;
        let (message, suggested_command) = (rule.build)(err);

        let mut hint = Hint {
            message,
            suggested_command,
            priority: rule.priority,
        };
        if let Some(o) = overrides {
            if let Some(message) = &o.message {
                hint.message = message.clone();
            }
            if let Some(command) = &o.suggested_command {
                hint.suggested_command = Some(command.clone());
            }
        }
        Some(hint)
    }
}

impl Default for HintRegistry {
    fn default() -> Self {
        Self::new(HintConfig::default())
    }
}

fn cmd(text: String) -> Option<String> {
    Some(text)
}

fn builtin_rules() -> Vec<HintRule> {
    vec![
        HintRule {
            name: "single_active_phase",
            priority: HintPriority::High,
            matches: |e| matches!(e, EpicError::PhaseConstraint { .. }),
            build: |e| match e {
                EpicError::PhaseConstraint {
                    active_phase_id, ..
                } => (
                    format!("Phase {active_phase_id} is still active; complete or cancel it first"),
                    cmd(format!("epic phase complete {active_phase_id}")),
                ),
                _ => unreachable_hint(),
            },
        },
        HintRule {
            name: "task_needs_active_phase",
            priority: HintPriority::High,
            matches: |e| {
                matches!(
                    e,
                    EpicError::TaskConstraint {
                        reason: TaskConstraintReason::PhaseNotActive { .. },
                        ..
                    }
                )
            },
            build: |e| match e {
                EpicError::TaskConstraint {
                    reason: TaskConstraintReason::PhaseNotActive { phase_id, .. },
                    ..
                } => (
                    format!("Start phase {phase_id} before working on its tasks"),
                    cmd(format!("epic phase start {phase_id}")),
                ),
                _ => unreachable_hint(),
            },
        },
        HintRule {
            name: "single_active_task",
            priority: HintPriority::High,
            matches: |e| {
                matches!(
                    e,
                    EpicError::TaskConstraint {
                        reason: TaskConstraintReason::ActiveTaskExists { .. },
                        ..
                    }
                )
            },
            build: |e| match e {
                EpicError::TaskConstraint {
                    reason: TaskConstraintReason::ActiveTaskExists { active_task_id },
                    ..
                } => (
                    format!("Finish task {active_task_id} before starting another in this phase"),
                    cmd(format!("epic task complete {active_task_id}")),
                ),
                _ => unreachable_hint(),
            },
        },
        HintRule {
            name: "phase_has_open_tasks",
            priority: HintPriority::High,
            matches: |e| matches!(e, EpicError::PhaseIncomplete { .. }),
            build: |e| match e {
                EpicError::PhaseIncomplete {
                    phase_id,
                    pending_tasks,
                } => (
                    format!(
                        "Complete or cancel the {} open task(s) in phase {phase_id}",
                        pending_tasks.len()
                    ),
                    cmd(format!("epic task list --phase {phase_id}")),
                ),
                _ => unreachable_hint(),
            },
        },
        HintRule {
            name: "task_has_open_tests",
            priority: HintPriority::High,
            matches: |e| matches!(e, EpicError::TaskIncomplete { .. }),
            build: |e| match e {
                EpicError::TaskIncomplete {
                    task_id,
                    pending_tests,
                } => (
                    format!("Pass or cancel the remaining tests of task {task_id}"),
                    pending_tests
                        .first()
                        .map(|test| format!("epic test pass {test}")),
                ),
                _ => unreachable_hint(),
            },
        },
        HintRule {
            name: "phase_has_open_tests",
            priority: HintPriority::High,
            matches: |e| matches!(e, EpicError::PhaseTestDependency { .. }),
            build: |e| match e {
                EpicError::PhaseTestDependency {
                    phase_id,
                    incomplete_tests,
                } => (
                    format!("Settle every test in phase {phase_id} before completing it"),
                    incomplete_tests
                        .first()
                        .map(|test| format!("epic test pass {test}")),
                ),
                _ => unreachable_hint(),
            },
        },
        HintRule {
            name: "phase_prerequisites",
            priority: HintPriority::High,
            matches: |e| matches!(e, EpicError::PhaseTestPrerequisite { .. }),
            build: |e| match e {
                EpicError::PhaseTestPrerequisite { phase_id, tests } => (
                    format!("Phase {phase_id} waits on prerequisite tests passing"),
                    tests.first().map(|test| format!("epic test pass {test}")),
                ),
                _ => unreachable_hint(),
            },
        },
        HintRule {
            name: "test_needs_running_task",
            priority: HintPriority::High,
            matches: |e| matches!(e, EpicError::TestPrerequisite { .. }),
            build: |e| match e {
                EpicError::TestPrerequisite { task_id, .. } => (
                    format!("Start task {task_id} before running its tests"),
                    cmd(format!("epic task start {task_id}")),
                ),
                _ => unreachable_hint(),
            },
        },
        HintRule {
            name: "epic_has_open_work",
            priority: HintPriority::High,
            matches: |e| matches!(e, EpicError::EpicIncomplete { .. }),
            build: |e| match e {
                EpicError::EpicIncomplete {
                    failing_tests,
                    unfinished_phases,
                } => match (failing_tests.first(), unfinished_phases.first()) {
                    (Some(test), _) => (
                        format!("Test {test} is failing; fix it before completing the epic"),
                        cmd(format!("epic test pass {test}")),
                    ),
                    (None, Some(phase)) => (
                        format!("Phase {phase} is not finished yet"),
                        cmd("epic next".to_string()),
                    ),
                    (None, None) => (
                        "Finish the remaining work first".to_string(),
                        cmd("epic status".to_string()),
                    ),
                },
                _ => unreachable_hint(),
            },
        },
        HintRule {
            name: "illegal_transition",
            priority: HintPriority::Medium,
            matches: |e| matches!(e, EpicError::InvalidTransition { .. }),
            build: |e| match e {
                EpicError::InvalidTransition { kind, id, from, .. } => (
                    format!("{kind} {id} is {from}; check its state before retrying"),
                    cmd(list_command(*kind)),
                ),
                _ => unreachable_hint(),
            },
        },
        HintRule {
            name: "unknown_id",
            priority: HintPriority::Medium,
            matches: |e| matches!(e, EpicError::NotFound { .. }),
            build: |e| match e {
                EpicError::NotFound { kind, .. } => (
                    format!("List the {kind}s in this epic to find the right id"),
                    cmd(list_command(*kind)),
                ),
                _ => unreachable_hint(),
            },
        },
        HintRule {
            name: "no_current_epic",
            priority: HintPriority::Medium,
            matches: |e| matches!(e, EpicError::NoCurrentEpic),
            build: |_| {
                (
                    "Select an epic document for this workspace".to_string(),
                    cmd("epic use <path>".to_string()),
                )
            },
        },
        HintRule {
            name: "document_locked",
            priority: HintPriority::Medium,
            matches: |e| matches!(e, EpicError::Locked(_)),
            build: |_| {
                (
                    "Another epic command is writing this document; retry shortly".to_string(),
                    None,
                )
            },
        },
        HintRule {
            name: "fallback",
            priority: HintPriority::Low,
            matches: |_| true,
            build: |_| {
                (
                    "Use `epic current` or `epic status` to see where work stands".to_string(),
                    cmd("epic status".to_string()),
                )
            },
        },
    ]
}

fn list_command(kind: EntityKind) -> String {
    match kind {
        EntityKind::Epic => "epic status".to_string(),
        other => format!("epic {other} list"),
    }
}

// Only reached if a rule's `build` disagrees with its `matches`.
fn unreachable_hint() -> (String, Option<String>) {
    (
        "Use `epic status` to see where work stands".to_string(),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase_constraint() -> EpicError {
        EpicError::PhaseConstraint {
            requested: "P2".parse().unwrap(),
            active_phase_id: "P1".parse().unwrap(),
        }
    }

    #[test]
    fn constraint_hint_names_active_phase() {
        let hint = HintRegistry::default()
            .hint_for(&phase_constraint())
            .unwrap();
        assert_eq!(hint.priority, HintPriority::High);
        assert_eq!(
            hint.suggested_command.as_deref(),
            Some("epic phase complete P1")
        );
    }

    #[test]
    fn transition_hint_is_medium() {
        let err = EpicError::InvalidTransition {
            kind: EntityKind::Task,
            id: "T1".to_string(),
            from: "cancelled".to_string(),
            to: "active".to_string(),
        };
        let hint = HintRegistry::default().hint_for(&err).unwrap();
        assert_eq!(hint.priority, HintPriority::Medium);
        assert_eq!(hint.suggested_command.as_deref(), Some("epic task list"));
    }

    #[test]
    fn fallback_matches_anything() {
        let hint = HintRegistry::default()
            .hint_for(&EpicError::validation("duplicate task id T1"))
            .unwrap();
        assert_eq!(hint.priority, HintPriority::Low);
        assert!(hint.message.contains("epic current"));
    }

    #[test]
    fn disabled_registry_gives_nothing() {
        let config = HintConfig {
            enabled: false,
            ..HintConfig::default()
        };
        assert!(HintRegistry::new(config)
            .hint_for(&phase_constraint())
            .is_none());
    }

    #[test]
    fn min_priority_filters_fallback() {
        let config = HintConfig {
            min_priority: HintPriority::Medium,
            ..HintConfig::default()
        };
        let registry = HintRegistry::new(config);
        assert!(registry
            .hint_for(&EpicError::validation("bad"))
            .is_none());
        assert!(registry.hint_for(&phase_constraint()).is_some());
    }

    #[test]
    fn override_replaces_text_per_kind() {
        let mut config = HintConfig::default();
        config.overrides.insert(
            "phase_constraint".to_string(),
            HintOverride {
                message: Some("Ask the lead before switching phases".to_string()),
                suggested_command: None,
                disabled: false,
            },
        );
        config.overrides.insert(
            "not_found".to_string(),
            HintOverride {
                disabled: true,
                ..HintOverride::default()
            },
        );
        let registry = HintRegistry::new(config);

        let hint = registry.hint_for(&phase_constraint()).unwrap();
        assert_eq!(hint.message, "Ask the lead before switching phases");
        assert_eq!(
            hint.suggested_command.as_deref(),
            Some("epic phase complete P1")
        );
        assert!(registry
            .hint_for(&EpicError::not_found(EntityKind::Task, &"T9"))
            .is_none());
    }

    #[test]
    fn rules_stay_sorted_by_priority() {
        let mut registry = HintRegistry::default();
        registry.register(HintRule {
            name: "custom_high",
            priority: HintPriority::High,
            matches: |_| false,
            build: |_| (String::new(), None),
        });
        let names = registry.rule_names();
        assert_eq!(names.last(), Some(&"fallback"));
        let custom = names.iter().position(|n| *n == "custom_high").unwrap();
        let medium = names.iter().position(|n| *n == "illegal_transition").unwrap();
        assert!(custom < medium);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: HintConfig =
            serde_json::from_str(r#"{"min_priority":"high"}"#).unwrap();
        assert!(config.enabled);
        assert_eq!(config.min_priority, HintPriority::High);
        assert!(config.overrides.is_empty());
    }
}
