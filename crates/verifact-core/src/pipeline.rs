use tracing::{info, instrument};

use crate::agents::build_agents;
use crate::config::Settings;
use crate::crew::Crew;
use crate::roster::{load_agents, load_tasks};
use crate::runtime::AgentRuntime;
use crate::tasks::{InputBundle, build_tasks};
use crate::workflow::{CrewOutcome, run_crew};
use crate::VerifactError;

/// Builds crews from the configured rosters and runs them.
///
/// Rosters are re-read and agents rebuilt on every call; nothing is cached
/// between requests.
#[derive(Clone)]
pub struct Pipeline {
    settings: Settings,
    runtime: AgentRuntime,
}

impl Pipeline {
    /// Construct the pipeline and its backends from explicit settings.
    pub fn new(settings: Settings) -> Result<Self, VerifactError> {
        let runtime = AgentRuntime::from_settings(&settings)?;
        Ok(Self { settings, runtime })
    }

    pub fn with_runtime(settings: Settings, runtime: AgentRuntime) -> Self {
        Self { settings, runtime }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Crew for a claim and/or URL.
    pub fn build_crew_for_claim_or_url(
        &self,
        claim: Option<&str>,
        url: Option<&str>,
    ) -> Result<ExecutableCrew, VerifactError> {
        self.build_crew(InputBundle::claim_or_url(
            claim.map(str::to_string),
            url.map(str::to_string),
        ))
    }

    /// Crew for free text extracted from a document.
    pub fn build_crew_for_topic(&self, topic: &str) -> Result<ExecutableCrew, VerifactError> {
        self.build_crew(InputBundle::topic(topic))
    }

    #[instrument(name = "pipeline.build", skip_all)]
    pub fn build_crew(&self, input: InputBundle) -> Result<ExecutableCrew, VerifactError> {
        let crew_config = &self.settings.crew;
        let agent_specs = load_agents(&crew_config.agents_path)?;
        let task_specs = load_tasks(&crew_config.tasks_path)?;

        let agents = build_agents(&agent_specs)?;
        let tasks = build_tasks(
            &task_specs,
            &agents,
            &input,
            crew_config.default_agent.as_deref(),
        )?;
        let crew = Crew::assemble(tasks)?;

        info!(
            tasks = ?crew.tasks().iter().map(|task| task.name.as_str()).collect::<Vec<_>>(),
            agents = crew.agents().len(),
            "crew assembled"
        );

        Ok(ExecutableCrew {
            crew,
            runtime: self.runtime.clone(),
        })
    }
}

/// A crew bound to the backends that will execute it.
pub struct ExecutableCrew {
    crew: Crew,
    runtime: AgentRuntime,
}

impl ExecutableCrew {
    pub fn crew(&self) -> &Crew {
        &self.crew
    }

    /// Run every task in order and return the final task's output.
    pub async fn run(&self, inputs: &InputBundle) -> Result<String, VerifactError> {
        self.run_with_report(inputs)
            .await
            .map(|outcome| outcome.result)
    }

    /// Run every task in order, keeping all intermediate outputs and the trace.
    pub async fn run_with_report(&self, inputs: &InputBundle) -> Result<CrewOutcome, VerifactError> {
        run_crew(&self.crew, &self.runtime, inputs).await
    }
}
