//! Agent and task rosters loaded from YAML.
//!
//! Both documents are a mapping from a unique name to a flat attribute
//! mapping. Entry order is preserved because task execution order follows it.
//!
//! ```yaml
//! fact_checker:
//!   role: Fact Checker
//!   goal: Verify claims against reliable sources
//!   backstory: A meticulous researcher.
//!   tools: [serper_tool]
//! ```

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::VerifactError;
use crate::tasks::{InputField, TaskKind};

/// One entry of the agent roster.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgentSpec {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub backstory: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
}

/// One entry of the task roster.
///
/// `kind`, `requires`, `requires_any` and `agent` are optional; when absent
/// they are inferred from the task name.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaskSpec {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub kind: Option<TaskKind>,
    #[serde(default)]
    pub requires: Option<Vec<InputField>>,
    #[serde(default)]
    pub requires_any: Option<Vec<InputField>>,
    #[serde(default)]
    pub agent: Option<String>,
}

pub type AgentRoster = IndexMap<String, AgentSpec>;
pub type TaskRoster = IndexMap<String, TaskSpec>;

trait Named {
    fn set_name(&mut self, name: &str);
}

impl Named for AgentSpec {
    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }
}

impl Named for TaskSpec {
    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }
}

pub fn load_agents(path: &Path) -> Result<AgentRoster, VerifactError> {
    load(path)
}

pub fn load_tasks(path: &Path) -> Result<TaskRoster, VerifactError> {
    load(path)
}

pub fn parse_agents(raw: &str) -> Result<AgentRoster, VerifactError> {
    parse(raw)
}

pub fn parse_tasks(raw: &str) -> Result<TaskRoster, VerifactError> {
    parse(raw)
}

fn load<T>(path: &Path) -> Result<IndexMap<String, T>, VerifactError>
where
    T: DeserializeOwned + Named,
{
    let raw = fs::read_to_string(path)
        .map_err(|err| VerifactError::config_io(path.to_path_buf(), err))?;
    let roster = parse(&raw).map_err(|err| match err {
        VerifactError::InvalidConfiguration(reason) => {
            VerifactError::InvalidConfiguration(format!("{}: {reason}", path.display()))
        }
        other => other,
    })?;
    debug!(path = %path.display(), entries = roster.len(), "roster loaded");
    Ok(roster)
}

fn parse<T>(raw: &str) -> Result<IndexMap<String, T>, VerifactError>
where
    T: DeserializeOwned + Named,
{
    let mut roster: IndexMap<String, T> = serde_yaml::from_str(raw).map_err(|err| {
        VerifactError::InvalidConfiguration(format!("expected a mapping of mappings: {err}"))
    })?;
    for (name, entry) in roster.iter_mut() {
        entry.set_name(name);
    }
    Ok(roster)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order() {
        let roster = parse_tasks(
            r#"
zeta_summary:
  description: z
  expected_output: z
alpha_fact_check_claim:
  description: a
  expected_output: a
middle:
  description: m
  expected_output: m
"#,
        )
        .unwrap();

        let names: Vec<_> = roster.keys().cloned().collect();
        assert_eq!(names, ["zeta_summary", "alpha_fact_check_claim", "middle"]);
        assert_eq!(roster["middle"].name, "middle");
    }

    #[test]
    fn parses_explicit_routing_fields() {
        let roster = parse_tasks(
            r#"
check:
  description: Check {claim}
  expected_output: Verdict
  kind: fact_check
  requires: [claim]
  agent: auditor
"#,
        )
        .unwrap();

        let spec = &roster["check"];
        assert_eq!(spec.kind, Some(TaskKind::FactCheck));
        assert_eq!(spec.requires.as_deref(), Some(&[InputField::Claim][..]));
        assert_eq!(spec.agent.as_deref(), Some("auditor"));
    }

    #[test]
    fn rejects_non_mapping_entries() {
        let err = parse_agents("fact_checker: just a string").unwrap_err();
        assert!(matches!(err, VerifactError::InvalidConfiguration(_)));

        let err = parse_agents("- a\n- b\n").unwrap_err();
        assert!(matches!(err, VerifactError::InvalidConfiguration(_)));
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let err = load_agents(Path::new("/nonexistent/agents.yaml")).unwrap_err();
        assert!(matches!(err, VerifactError::ConfigIo { .. }));
    }

    #[test]
    fn agent_fields_are_optional_at_parse_time() {
        let roster = parse_agents(
            r#"
researcher:
  role: Researcher
"#,
        )
        .unwrap();
        let spec = &roster["researcher"];
        assert_eq!(spec.role.as_deref(), Some("Researcher"));
        assert!(spec.goal.is_none());
        assert!(spec.tools.is_empty());
    }
}
