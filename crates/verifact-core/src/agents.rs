use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::error::BuildError;
use crate::roster::{AgentRoster, AgentSpec};

/// Tool names in the agent roster that map to the web search capability.
const WEB_SEARCH_TOOL_NAMES: &[&str] = &["serper_tool", "web_search"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    WebSearch,
}

impl Capability {
    fn from_tool_name(name: &str) -> Option<Self> {
        WEB_SEARCH_TOOL_NAMES
            .contains(&name.trim())
            .then_some(Capability::WebSearch)
    }
}

/// Runtime persona built from an [`AgentSpec`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Agent {
    pub name: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub capabilities: Vec<Capability>,
    pub memory: bool,
    pub verbose: bool,
}

impl Agent {
    pub fn can_search(&self) -> bool {
        self.capabilities.contains(&Capability::WebSearch)
    }
}

pub type AgentSet = IndexMap<String, Arc<Agent>>;

/// Build one agent per roster entry, keeping roster order.
pub fn build_agents(specs: &AgentRoster) -> Result<AgentSet, BuildError> {
    specs
        .values()
        .map(|spec| build_agent(spec).map(|agent| (spec.name.clone(), Arc::new(agent))))
        .collect()
}

fn build_agent(spec: &AgentSpec) -> Result<Agent, BuildError> {
    let role = required(spec, "role", spec.role.as_deref())?;
    let goal = required(spec, "goal", spec.goal.as_deref())?;
    let backstory = required(spec, "backstory", spec.backstory.as_deref())?;

    let mut capabilities = Vec::new();
    for tool in &spec.tools {
        match Capability::from_tool_name(tool) {
            Some(capability) if !capabilities.contains(&capability) => {
                capabilities.push(capability)
            }
            Some(_) => {}
            None => debug!(agent = %spec.name, tool = %tool, "ignoring unrecognised tool"),
        }
    }

    Ok(Agent {
        name: spec.name.clone(),
        role,
        goal,
        backstory,
        capabilities,
        memory: true,
        verbose: true,
    })
}

fn required(
    spec: &AgentSpec,
    field: &'static str,
    value: Option<&str>,
) -> Result<String, BuildError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BuildError::MissingAgentField {
            agent: spec.name.clone(),
            field,
        })
}
