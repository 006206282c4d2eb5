use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::{
    Context, ExecutionStatus, FlowRunner, GraphBuilder, InMemorySessionStorage, NextAction,
    Session, SessionStorage, Task, TaskResult,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::VerifactError;
use crate::crew::Crew;
use crate::runtime::{AgentRuntime, CompletionRequest, SearchHit};
use crate::tasks::{InputBundle, InputField, ResolvedTask};
use crate::trace::{TraceEvent, TracePhase, TraceSummary};

const INPUTS_KEY: &str = "crew.inputs";
const OUTPUTS_KEY: &str = "crew.outputs";
const TRACE_KEY: &str = "crew.trace";
const ERROR_KEY: &str = "crew.error";
const MAX_QUERY_CHARS: usize = 256;

/// Output of one executed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub task: String,
    pub agent: String,
    pub output: String,
}

/// Everything a crew run produced.
#[derive(Debug, Clone, Serialize)]
pub struct CrewOutcome {
    pub run_id: String,
    /// Output of the final task.
    pub result: String,
    pub task_outputs: Vec<TaskOutput>,
    pub trace_events: Vec<TraceEvent>,
}

impl CrewOutcome {
    pub fn trace_summary(&self) -> TraceSummary {
        TraceSummary::from_events(&self.trace_events)
    }
}

/// One crew task wrapped as a graph node.
struct CrewTask {
    task: ResolvedTask,
    runtime: AgentRuntime,
    last: bool,
}

impl CrewTask {
    fn next_action(&self) -> NextAction {
        if self.last {
            NextAction::End
        } else {
            NextAction::ContinueAndExecute
        }
    }

    fn system_prompt(&self) -> String {
        let agent = &self.task.agent;
        format!(
            "You are {}. {}\nYour personal goal is: {}",
            agent.role, agent.backstory, agent.goal
        )
    }

    fn user_prompt(&self, previous: &[TaskOutput], research: Option<&[SearchHit]>) -> String {
        let agent = &self.task.agent;
        let mut prompt = format!(
            "Current Task: {}\n\nThis is the expected criteria for your final answer: {}\nYou MUST return the actual complete content as the final answer, not a summary.\n",
            self.task.description, self.task.expected_output
        );

        let (own, others): (Vec<_>, Vec<_>) = previous
            .iter()
            .partition(|output| output.agent == agent.name);

        if !others.is_empty() {
            prompt.push_str("\nContext from earlier tasks:\n");
            for output in others {
                let _ = writeln!(prompt, "## {} ({})\n{}", output.task, output.agent, output.output);
            }
        }

        if agent.memory && !own.is_empty() {
            prompt.push_str("\nYour notes from earlier in this run:\n");
            for output in own {
                let _ = writeln!(prompt, "## {}\n{}", output.task, output.output);
            }
        }

        if let Some(hits) = research {
            prompt.push_str("\nWeb search results:\n");
            if hits.is_empty() {
                prompt.push_str("(no results)\n");
            }
            for (idx, hit) in hits.iter().enumerate() {
                let _ = writeln!(prompt, "{}. {} <{}>\n   {}", idx + 1, hit.title, hit.link, hit.snippet);
            }
        }

        prompt
    }

    async fn research(&self, inputs: &InputBundle) -> anyhow::Result<Option<Vec<SearchHit>>> {
        let Some(tool) = self.runtime.search.as_ref() else {
            return Ok(None);
        };
        if !self.task.agent.can_search() {
            return Ok(None);
        }

        let query = search_query(inputs, &self.task.description);
        let hits = tool.search(&query).await?;
        Ok(Some(hits))
    }

    async fn fail(
        &self,
        context: &Context,
        mut trace: Vec<TraceEvent>,
        reason: String,
    ) -> graph_flow::Result<TaskResult> {
        warn!(task = %self.task.name, error = %reason, "crew task failed");
        trace.push(TraceEvent::new(
            &self.task.name,
            &self.task.agent.name,
            TracePhase::Failed,
            reason.clone(),
        ));
        context.set(TRACE_KEY, &trace).await;
        context.set(ERROR_KEY, &reason).await;
        Ok(TaskResult::new(Some(reason), NextAction::End))
    }
}

#[async_trait]
impl Task for CrewTask {
    fn id(&self) -> &str {
        &self.task.name
    }

    #[instrument(name = "crew.task", skip(self, context), fields(task = %self.task.name, agent = %self.task.agent.name))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let inputs: InputBundle = context.get(INPUTS_KEY).await.unwrap_or_default();
        let mut outputs: Vec<TaskOutput> = context.get(OUTPUTS_KEY).await.unwrap_or_default();
        let mut trace: Vec<TraceEvent> = context.get(TRACE_KEY).await.unwrap_or_default();
        let agent = self.task.agent.clone();

        if agent.verbose {
            info!(role = %agent.role, "agent starting task");
        }
        trace.push(TraceEvent::new(
            &self.task.name,
            &agent.name,
            TracePhase::Started,
            format!("{} started", agent.role),
        ));

        let research = match self.research(&inputs).await {
            Ok(research) => research,
            Err(err) => {
                return self
                    .fail(&context, trace, format!("web search failed: {err}"))
                    .await;
            }
        };
        if let Some(hits) = research.as_ref() {
            trace.push(TraceEvent::new(
                &self.task.name,
                &agent.name,
                TracePhase::Searched,
                format!("{} search result(s)", hits.len()),
            ));
        }

        let request = CompletionRequest {
            agent: agent.name.clone(),
            task: self.task.name.clone(),
            system: self.system_prompt(),
            prompt: self.user_prompt(&outputs, research.as_deref()),
        };

        let output = match self.runtime.llm.complete(&request).await {
            Ok(output) => output,
            Err(err) => {
                return self
                    .fail(
                        &context,
                        trace,
                        format!("{} backend failed: {err}", self.runtime.llm.name()),
                    )
                    .await;
            }
        };

        if agent.verbose {
            info!(chars = output.len(), "agent finished task");
        } else {
            debug!(chars = output.len(), "agent finished task");
        }
        trace.push(TraceEvent::new(
            &self.task.name,
            &agent.name,
            TracePhase::Completed,
            format!("{} chars", output.len()),
        ));

        outputs.push(TaskOutput {
            task: self.task.name.clone(),
            agent: agent.name.clone(),
            output: output.clone(),
        });
        context.set(OUTPUTS_KEY, &outputs).await;
        context.set(TRACE_KEY, &trace).await;

        Ok(TaskResult::new(Some(output), self.next_action()))
    }
}

fn search_query(inputs: &InputBundle, fallback: &str) -> String {
    let source = [InputField::Claim, InputField::Url, InputField::Topic]
        .into_iter()
        .find_map(|field| inputs.get(field))
        .unwrap_or(fallback);
    source.trim().chars().take(MAX_QUERY_CHARS).collect()
}

fn build_graph(crew: &Crew, runtime: &AgentRuntime) -> Result<Arc<graph_flow::Graph>, VerifactError> {
    let tasks = crew.tasks();
    let first = tasks
        .first()
        .ok_or_else(|| VerifactError::Assemble("crew has no tasks".into()))?;

    let mut builder = GraphBuilder::new("verifact_crew");
    for (index, task) in tasks.iter().enumerate() {
        let node: Arc<dyn Task> = Arc::new(CrewTask {
            task: task.clone(),
            runtime: runtime.clone(),
            last: index + 1 == tasks.len(),
        });
        builder = builder.add_task(node);
    }

    for pair in tasks.windows(2) {
        builder = builder.add_edge(pair[0].name.as_str(), pair[1].name.as_str());
    }

    let graph = builder.set_start_task(first.name.as_str()).build();
    Ok(Arc::new(graph))
}

/// Run a crew's tasks one at a time, in order.
#[instrument(name = "crew.run", skip_all, fields(tasks = crew.tasks().len()))]
pub async fn run_crew(
    crew: &Crew,
    runtime: &AgentRuntime,
    inputs: &InputBundle,
) -> Result<CrewOutcome, VerifactError> {
    let graph = build_graph(crew, runtime)?;
    let storage = Arc::new(InMemorySessionStorage::new());
    let runner = FlowRunner::new(graph, storage.clone());

    let run_id = Uuid::new_v4().to_string();
    let session = Session::new_from_task(run_id.clone(), crew.tasks()[0].name.as_str());
    session.context.set(INPUTS_KEY, inputs).await;

    storage
        .save(session)
        .await
        .map_err(|err| VerifactError::execution(format!("failed to persist run: {err}")))?;

    loop {
        let result = runner
            .run(&run_id)
            .await
            .map_err(|err| VerifactError::execution(format!("graph execution failure: {err}")))?;

        match result.status {
            ExecutionStatus::Completed => break,
            ExecutionStatus::WaitingForInput => continue,
            ExecutionStatus::Error(message) => return Err(VerifactError::execution(message)),
        }
    }

    let session = storage
        .get(&run_id)
        .await
        .map_err(|err| VerifactError::execution(format!("failed to reload run: {err}")))?
        .ok_or_else(|| VerifactError::execution("run missing after execution"))?;

    if let Some(reason) = session.context.get::<String>(ERROR_KEY).await {
        return Err(VerifactError::execution(reason));
    }

    let task_outputs: Vec<TaskOutput> = session.context.get(OUTPUTS_KEY).await.unwrap_or_default();
    let trace_events: Vec<TraceEvent> = session.context.get(TRACE_KEY).await.unwrap_or_default();

    let result = task_outputs
        .last()
        .map(|output| output.output.clone())
        .ok_or_else(|| VerifactError::execution("crew produced no output"))?;

    Ok(CrewOutcome {
        run_id,
        result,
        task_outputs,
        trace_events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_query_prefers_claim_then_url_then_topic() {
        let inputs = InputBundle::claim_or_url(Some("Claim".into()), Some("https://u".into()));
        assert_eq!(search_query(&inputs, "desc"), "Claim");

        let inputs = InputBundle::claim_or_url(None, Some("https://u".into()));
        assert_eq!(search_query(&inputs, "desc"), "https://u");

        let long = "x".repeat(1000);
        let inputs = InputBundle::topic(long);
        assert_eq!(search_query(&inputs, "desc").chars().count(), MAX_QUERY_CHARS);

        assert_eq!(search_query(&InputBundle::default(), " desc "), "desc");
    }
}
