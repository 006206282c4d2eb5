use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracePhase {
    Started,
    Searched,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub task: String,
    pub agent: String,
    pub phase: TracePhase,
    pub message: String,
    pub timestamp_ms: u128,
}

impl TraceEvent {
    pub fn new(
        task: impl Into<String>,
        agent: impl Into<String>,
        phase: TracePhase,
        message: impl Into<String>,
    ) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self {
            task: task.into(),
            agent: agent.into(),
            phase,
            message: message.into(),
            timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub index: usize,
    pub task: String,
    pub agent: String,
    pub phase: TracePhase,
    pub message: String,
    /// Milliseconds since the first event of the run.
    pub offset_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceSummary {
    pub steps: Vec<TraceStep>,
}

impl TraceSummary {
    pub fn from_events(events: &[TraceEvent]) -> Self {
        let first = events.first().map(|event| event.timestamp_ms).unwrap_or(0);
        let steps = events
            .iter()
            .enumerate()
            .map(|(idx, event)| TraceStep {
                index: idx + 1,
                task: event.task.clone(),
                agent: event.agent.clone(),
                phase: event.phase,
                message: event.message.clone(),
                offset_ms: event
                    .timestamp_ms
                    .saturating_sub(first)
                    .min(u64::MAX as u128) as u64,
            })
            .collect();
        Self { steps }
    }

    pub fn render_markdown(&self) -> String {
        if self.steps.is_empty() {
            return "No trace events recorded.".to_string();
        }
        let mut output = String::from("### Crew Trace\n");
        for step in &self.steps {
            let _ = writeln!(
                output,
                "{}. [+{}ms] {} ({}) {:?}: {}",
                step.index, step.offset_ms, step.task, step.agent, step.phase, step.message
            );
        }
        output
    }
}
