use std::sync::Arc;

use serde::Serialize;

use crate::VerifactError;
use crate::agents::Agent;
use crate::tasks::ResolvedTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Process {
    Sequential,
}

/// Agents and ordered tasks for one request.
#[derive(Debug, Clone)]
pub struct Crew {
    agents: Vec<Arc<Agent>>,
    tasks: Vec<ResolvedTask>,
    process: Process,
}

impl Crew {
    /// Package tasks into a sequential crew; the agent set is derived from the tasks.
    pub fn assemble(tasks: Vec<ResolvedTask>) -> Result<Self, VerifactError> {
        if tasks.is_empty() {
            return Err(VerifactError::Assemble(
                "no tasks selected for the provided inputs".into(),
            ));
        }

        let mut agents: Vec<Arc<Agent>> = Vec::new();
        for task in &tasks {
            if !agents.iter().any(|agent| agent.name == task.agent.name) {
                agents.push(task.agent.clone());
            }
        }

        Ok(Self {
            agents,
            tasks,
            process: Process::Sequential,
        })
    }

    pub fn agents(&self) -> &[Arc<Agent>] {
        &self.agents
    }

    pub fn tasks(&self) -> &[ResolvedTask] {
        &self.tasks
    }

    pub fn process(&self) -> Process {
        self.process
    }
}
