//! Task selection, placeholder substitution and agent routing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agents::{Agent, AgentSet};
use crate::error::BuildError;
use crate::roster::{TaskRoster, TaskSpec};

/// Top-level inputs a task may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputField {
    Claim,
    Url,
    Topic,
}

impl InputField {
    pub const ALL: [InputField; 3] = [InputField::Claim, InputField::Url, InputField::Topic];

    pub fn as_str(&self) -> &'static str {
        match self {
            InputField::Claim => "claim",
            InputField::Url => "url",
            InputField::Topic => "topic",
        }
    }

    fn placeholder(&self) -> &'static str {
        match self {
            InputField::Claim => "{claim}",
            InputField::Url => "{url}",
            InputField::Topic => "{topic}",
        }
    }
}

/// Inputs of one fact-check request. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl InputBundle {
    pub fn claim_or_url(claim: Option<String>, url: Option<String>) -> Self {
        Self {
            claim: non_empty(claim),
            url: non_empty(url),
            topic: None,
        }
    }

    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            claim: None,
            url: None,
            topic: non_empty(Some(topic.into())),
        }
    }

    pub fn get(&self, field: InputField) -> Option<&str> {
        let value = match field {
            InputField::Claim => self.claim.as_deref(),
            InputField::Url => self.url.as_deref(),
            InputField::Topic => self.topic.as_deref(),
        };
        value.filter(|value| !value.is_empty())
    }

    pub fn has(&self, field: InputField) -> bool {
        self.get(field).is_some()
    }

    pub fn is_empty(&self) -> bool {
        InputField::ALL.iter().all(|field| !self.has(*field))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

/// What a task does, which decides the agent it is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    FactCheck,
    UrlSummary,
    Summary,
    General,
}

impl TaskKind {
    /// Infer the kind from a task name.
    pub fn infer(name: &str) -> Self {
        if name.contains("fact_check") {
            TaskKind::FactCheck
        } else if name.contains("url_summary") {
            TaskKind::UrlSummary
        } else if name.contains("summary") {
            TaskKind::Summary
        } else {
            TaskKind::General
        }
    }

    /// Agent that must handle tasks of this kind, if any.
    pub fn specialist(&self) -> Option<&'static str> {
        match self {
            TaskKind::FactCheck => Some("fact_checker"),
            TaskKind::UrlSummary => Some("url_summarizer"),
            TaskKind::Summary | TaskKind::General => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::FactCheck => "fact_check",
            TaskKind::UrlSummary => "url_summary",
            TaskKind::Summary => "summary",
            TaskKind::General => "general",
        }
    }
}

/// Inputs a task needs before it may be scheduled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements {
    /// Every one of these must be present.
    pub all_of: Vec<InputField>,
    /// At least one of these must be present (ignored when empty).
    pub any_of: Vec<InputField>,
}

impl Requirements {
    pub fn for_spec(spec: &TaskSpec) -> Self {
        if spec.requires.is_some() || spec.requires_any.is_some() {
            return Self {
                all_of: spec.requires.clone().unwrap_or_default(),
                any_of: spec.requires_any.clone().unwrap_or_default(),
            };
        }
        Self::infer(&spec.name)
    }

    /// Infer requirements from keywords in the task name.
    pub fn infer(name: &str) -> Self {
        let mut all_of = Vec::new();
        if name.contains("claim") {
            all_of.push(InputField::Claim);
        }
        if name.contains("url") {
            all_of.push(InputField::Url);
        }
        let any_of = if name.contains("summary") {
            vec![InputField::Url, InputField::Topic]
        } else {
            Vec::new()
        };
        Self { all_of, any_of }
    }

    pub fn satisfied_by(&self, input: &InputBundle) -> bool {
        self.all_of.iter().all(|field| input.has(*field))
            && (self.any_of.is_empty() || self.any_of.iter().any(|field| input.has(*field)))
    }
}

/// A task ready for execution: templates substituted, agent assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTask {
    pub name: String,
    pub kind: TaskKind,
    pub description: String,
    pub expected_output: String,
    pub agent: Arc<Agent>,
}

/// Replace `{claim}`, `{url}` and `{topic}` with the matching input value.
///
/// Single pass: inserted values are never scanned for placeholders again.
pub fn substitute(template: &str, input: &InputBundle) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        output.push_str(&rest[..start]);
        let tail = &rest[start..];
        match InputField::ALL
            .iter()
            .find(|field| tail.starts_with(field.placeholder()))
        {
            Some(field) => {
                output.push_str(input.get(*field).unwrap_or(""));
                rest = &tail[field.placeholder().len()..];
            }
            None => {
                output.push('{');
                rest = &tail[1..];
            }
        }
    }

    output.push_str(rest);
    output
}

/// Select, render and route tasks for one request, in roster order.
pub fn build_tasks(
    specs: &TaskRoster,
    agents: &AgentSet,
    input: &InputBundle,
    default_agent: Option<&str>,
) -> Result<Vec<ResolvedTask>, BuildError> {
    if let Some(name) = default_agent
        && !agents.contains_key(name)
    {
        return Err(BuildError::UnknownDefaultAgent(name.to_string()));
    }

    let mut resolved = Vec::new();
    for spec in specs.values() {
        let requirements = Requirements::for_spec(spec);
        if !requirements.satisfied_by(input) {
            debug!(task = %spec.name, ?requirements, "skipping task; required input missing");
            continue;
        }

        let description = spec
            .description
            .as_deref()
            .ok_or_else(|| missing_field(spec, "description"))?;
        let expected_output = spec
            .expected_output
            .as_deref()
            .ok_or_else(|| missing_field(spec, "expected_output"))?;

        let kind = spec.kind.unwrap_or_else(|| TaskKind::infer(&spec.name));
        let agent = assign_agent(spec, kind, agents, default_agent)?;

        resolved.push(ResolvedTask {
            name: spec.name.clone(),
            kind,
            description: substitute(description, input),
            expected_output: substitute(expected_output, input),
            agent,
        });
    }

    Ok(resolved)
}

fn missing_field(spec: &TaskSpec, field: &'static str) -> BuildError {
    BuildError::MissingTaskField {
        task: spec.name.clone(),
        field,
    }
}

fn assign_agent(
    spec: &TaskSpec,
    kind: TaskKind,
    agents: &AgentSet,
    default_agent: Option<&str>,
) -> Result<Arc<Agent>, BuildError> {
    if let Some(required) = spec.agent.as_deref().or(kind.specialist()) {
        return agents
            .get(required)
            .cloned()
            .ok_or_else(|| BuildError::MissingAgent {
                task: spec.name.clone(),
                agent: required.to_string(),
            });
    }

    let fallback = match default_agent {
        Some(name) => agents.get(name),
        None => agents.first().map(|(_, agent)| agent),
    }
    .cloned()
    .ok_or(BuildError::NoAgents)?;

    info!(task = %spec.name, agent = %fallback.name, "assigning fallback agent");
    Ok(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(claim: Option<&str>, url: Option<&str>, topic: Option<&str>) -> InputBundle {
        InputBundle {
            claim: claim.map(str::to_string),
            url: url.map(str::to_string),
            topic: topic.map(str::to_string),
        }
    }

    #[test]
    fn infers_requirements_from_name() {
        let reqs = Requirements::infer("fact_check_claim");
        assert_eq!(reqs.all_of, vec![InputField::Claim]);
        assert!(reqs.any_of.is_empty());

        let reqs = Requirements::infer("url_summary");
        assert_eq!(reqs.all_of, vec![InputField::Url]);
        assert_eq!(reqs.any_of, vec![InputField::Url, InputField::Topic]);

        assert_eq!(Requirements::infer("generic_report"), Requirements::default());
    }

    #[test]
    fn summary_accepts_url_or_topic() {
        let reqs = Requirements::infer("generic_summary");
        assert!(!reqs.satisfied_by(&bundle(Some("c"), None, None)));
        assert!(reqs.satisfied_by(&bundle(None, Some("https://a.b"), None)));
        assert!(reqs.satisfied_by(&bundle(None, None, Some("text"))));
    }

    #[test]
    fn empty_strings_count_as_absent() {
        let input = InputBundle::claim_or_url(Some(String::new()), Some("https://x".into()));
        assert!(!input.has(InputField::Claim));
        assert!(input.has(InputField::Url));
        assert!(InputBundle::topic("").is_empty());
    }

    #[test]
    fn substitutes_all_placeholders() {
        let input = bundle(Some("Water boils at 100C"), None, Some("chemistry"));
        let rendered = substitute("Check {claim} about {topic} at {url}.", &input);
        assert_eq!(rendered, "Check Water boils at 100C about chemistry at .");
    }

    #[test]
    fn substitution_is_not_recursive() {
        let input = bundle(Some("{url} and {topic}"), Some("https://example.com"), None);
        let rendered = substitute("{claim} | {url}", &input);
        assert_eq!(rendered, "{url} and {topic} | https://example.com");
    }

    #[test]
    fn unknown_braces_are_kept() {
        let input = bundle(Some("x"), None, None);
        assert_eq!(substitute("{other} {claim} {", &input), "{other} x {");
    }

    #[test]
    fn kinds_map_to_specialists() {
        assert_eq!(TaskKind::infer("fact_check_claim"), TaskKind::FactCheck);
        assert_eq!(TaskKind::infer("url_summary"), TaskKind::UrlSummary);
        assert_eq!(TaskKind::infer("generic_summary"), TaskKind::Summary);
        assert_eq!(TaskKind::infer("report"), TaskKind::General);
        assert_eq!(TaskKind::FactCheck.specialist(), Some("fact_checker"));
        assert_eq!(TaskKind::Summary.specialist(), None);
    }

    const AGENTS: &str = r#"
fact_checker:
  role: Fact Checker
  goal: Verify claims
  backstory: Reads primary sources.
  tools: [serper_tool]
writer:
  role: Writer
  goal: Summarise text
  backstory: Keeps it short.
reviewer:
  role: Reviewer
  goal: Review drafts
  backstory: Hard to please.
"#;

    fn agents() -> AgentSet {
        let roster = crate::roster::parse_agents(AGENTS).unwrap();
        crate::agents::build_agents(&roster).unwrap()
    }

    fn tasks(raw: &str) -> TaskRoster {
        crate::roster::parse_tasks(raw).unwrap()
    }

    fn names(resolved: &[ResolvedTask]) -> Vec<&str> {
        resolved.iter().map(|task| task.name.as_str()).collect()
    }

    #[test]
    fn explicit_requires_replace_name_inference() {
        let specs = tasks(
            r#"
claim_digest:
  description: Digest {topic}
  expected_output: A digest
  requires: [topic]
"#,
        );
        let agents = agents();

        let topic = build_tasks(&specs, &agents, &bundle(None, None, Some("tides")), None).unwrap();
        assert_eq!(names(&topic), vec!["claim_digest"]);
        assert_eq!(topic[0].description, "Digest tides");

        let claim = build_tasks(&specs, &agents, &bundle(Some("c"), None, None), None).unwrap();
        assert!(claim.is_empty());
    }

    #[test]
    fn requires_any_needs_one_listed_input() {
        let specs = tasks(
            r#"
brief:
  description: Brief on {claim}{url}
  expected_output: A brief
  requires_any: [claim, url]
"#,
        );
        let agents = agents();

        let spec = &specs["brief"];
        assert_eq!(
            Requirements::for_spec(spec),
            Requirements {
                all_of: Vec::new(),
                any_of: vec![InputField::Claim, InputField::Url],
            }
        );
        let selected = build_tasks(&specs, &agents, &bundle(None, Some("https://a.b"), None), None).unwrap();
        assert_eq!(names(&selected), vec!["brief"]);
        let skipped = build_tasks(&specs, &agents, &bundle(None, None, Some("t")), None).unwrap();
        assert!(skipped.is_empty());
    }

    #[test]
    fn explicit_agent_overrides_specialist() {
        let specs = tasks(
            r#"
fact_check_claim:
  description: Check {claim}
  expected_output: A verdict
  agent: reviewer
"#,
        );
        let resolved = build_tasks(&specs, &agents(), &bundle(Some("c"), None, None), None).unwrap();
        assert_eq!(resolved[0].kind, TaskKind::FactCheck);
        assert_eq!(resolved[0].agent.name, "reviewer");
    }

    #[test]
    fn explicit_agent_must_be_configured() {
        let specs = tasks(
            r#"
edit_topic:
  description: Edit {topic}
  expected_output: Edited text
  requires: [topic]
  agent: editor
"#,
        );
        let err = build_tasks(&specs, &agents(), &bundle(None, None, Some("t")), None).unwrap_err();
        assert_eq!(
            err,
            BuildError::MissingAgent {
                task: "edit_topic".into(),
                agent: "editor".into(),
            }
        );
    }

    #[test]
    fn explicit_kind_decides_routing() {
        let specs = tasks(
            r#"
verify_statement:
  description: Verify {claim}
  expected_output: A verdict
  kind: fact_check
  requires: [claim]
fact_check_notes:
  description: Notes on {claim}
  expected_output: Notes
  kind: general
"#,
        );
        let resolved = build_tasks(&specs, &agents(), &bundle(Some("c"), None, None), None).unwrap();

        assert_eq!(names(&resolved), vec!["verify_statement", "fact_check_notes"]);
        assert_eq!(resolved[0].kind, TaskKind::FactCheck);
        assert_eq!(resolved[0].agent.name, "fact_checker");
        // general work falls back to the first roster agent despite the name
        assert_eq!(resolved[1].kind, TaskKind::General);
        assert_eq!(resolved[1].agent.name, "fact_checker");

        let routed = build_tasks(&specs, &agents(), &bundle(Some("c"), None, None), Some("writer")).unwrap();
        assert_eq!(routed[1].agent.name, "writer");
    }

    #[test]
    fn unknown_default_agent_fails_before_routing() {
        let specs = tasks(
            r#"
generic_summary:
  description: Summarise {topic}
  expected_output: A summary
"#,
        );
        let err = build_tasks(&specs, &agents(), &bundle(None, None, Some("t")), Some("ghost")).unwrap_err();
        assert_eq!(err, BuildError::UnknownDefaultAgent("ghost".into()));

        // no matching task does not hide the misconfiguration
        let err = build_tasks(&specs, &agents(), &bundle(Some("c"), None, None), Some("ghost")).unwrap_err();
        assert_eq!(err, BuildError::UnknownDefaultAgent("ghost".into()));
    }
}
