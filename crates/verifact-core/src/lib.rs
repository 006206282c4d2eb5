//! Verifact core: configuration-driven fact-checking crews on top of `graph_flow`.
//!
//! Agent and task rosters are read from YAML, filtered and rendered for the
//! inputs of a request (claim, URL or document text), assembled into a
//! sequential crew and executed against an LLM backend.

mod agents;
mod check;
mod config;
mod crew;
mod document;
mod error;
mod llm;
mod metrics;
mod pipeline;
mod roster;
mod runtime;
mod search;
mod security;
mod tasks;
mod telemetry;
mod trace;
mod verdict;
mod workflow;

pub use agents::{Agent, AgentSet, Capability, build_agents};
pub use check::{CheckMode, CheckReport, CheckRequest, FactChecker};
pub use config::{
    ConfigLoader, CrewConfig, LlmConfig, LlmProvider, LoggingConfig, SearchConfig,
    SearchProvider, Settings,
};
pub use crew::{Crew, Process};
pub use document::{DocumentFormat, decode_text, extract_text};
pub use error::{BuildError, ErrorKind, Result, VerifactError};
pub use llm::OpenAiBackend;
pub use metrics::{init_metrics_from_env, record_check_metrics};
pub use pipeline::{ExecutableCrew, Pipeline};
pub use roster::{
    AgentRoster, AgentSpec, TaskRoster, TaskSpec, load_agents, load_tasks, parse_agents,
    parse_tasks,
};
pub use runtime::{AgentRuntime, CompletionRequest, LlmBackend, OfflineBackend, SearchHit, SearchTool};
pub use search::SerperSearch;
pub use security::{SecretValue, require_env};
pub use tasks::{
    InputBundle, InputField, Requirements, ResolvedTask, TaskKind, build_tasks, substitute,
};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use trace::{TraceEvent, TracePhase, TraceStep, TraceSummary};
pub use verdict::{Verdict, classify_verdict};
pub use workflow::{CrewOutcome, TaskOutput, run_crew};
