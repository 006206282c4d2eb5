use std::time::Instant;

use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::metrics::record_check_metrics;
use crate::pipeline::Pipeline;
use crate::tasks::InputBundle;
use crate::trace::TraceEvent;
use crate::verdict::{Verdict, classify_verdict};
use crate::workflow::TaskOutput;
use crate::VerifactError;

/// Which entry point a check goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMode {
    ClaimOrUrl,
    Topic,
}

impl CheckMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckMode::ClaimOrUrl => "claim_or_url",
            CheckMode::Topic => "topic",
        }
    }
}

/// User input for one fact check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckRequest {
    ClaimOrUrl {
        claim: Option<String>,
        url: Option<String>,
    },
    Topic {
        text: String,
    },
}

impl CheckRequest {
    pub fn mode(&self) -> CheckMode {
        match self {
            CheckRequest::ClaimOrUrl { .. } => CheckMode::ClaimOrUrl,
            CheckRequest::Topic { .. } => CheckMode::Topic,
        }
    }

    pub fn inputs(&self) -> InputBundle {
        match self {
            CheckRequest::ClaimOrUrl { claim, url } => {
                InputBundle::claim_or_url(claim.clone(), url.clone())
            }
            CheckRequest::Topic { text } => InputBundle::topic(text.clone()),
        }
    }
}

/// Result of a completed check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub check_id: String,
    pub mode: CheckMode,
    pub result: String,
    pub verdict: Verdict,
    pub task_outputs: Vec<TaskOutput>,
    pub trace_events: Vec<TraceEvent>,
    pub duration_ms: u64,
}

impl CheckReport {
    pub const FILE_NAME: &'static str = "verifact_report.txt";

    /// Downloadable report body.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.result.as_bytes().to_vec()
    }
}

/// Build, run and classify checks through a [`Pipeline`].
#[derive(Clone)]
pub struct FactChecker {
    pipeline: Pipeline,
}

impl FactChecker {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn check(&self, request: CheckRequest) -> Result<CheckReport, VerifactError> {
        self.check_with_id(Uuid::new_v4().to_string(), request).await
    }

    pub async fn check_with_id(
        &self,
        check_id: String,
        request: CheckRequest,
    ) -> Result<CheckReport, VerifactError> {
        let started = Instant::now();
        let mode = request.mode();
        let inputs = request.inputs();

        let outcome = self.run(&request, &inputs).await;
        let duration_ms = started.elapsed().as_millis().min(u64::MAX as u128) as u64;

        let report = outcome.map(|outcome| CheckReport {
            check_id: check_id.clone(),
            mode,
            verdict: classify_verdict(&outcome.result),
            result: outcome.result,
            task_outputs: outcome.task_outputs,
            trace_events: outcome.trace_events,
            duration_ms,
        });

        match &report {
            Ok(report) => {
                info!(%check_id, verdict = %report.verdict, duration_ms, "check completed");
                record_check_metrics(
                    mode.as_str(),
                    "completed",
                    report.verdict.label(),
                    report.task_outputs.len(),
                    duration_ms,
                );
            }
            Err(err) => {
                error!(%check_id, kind = %err.kind(), error = %err, "check failed");
                record_check_metrics(mode.as_str(), err.kind().as_str(), "none", 0, duration_ms);
            }
        }

        report
    }

    async fn run(
        &self,
        request: &CheckRequest,
        inputs: &InputBundle,
    ) -> Result<crate::workflow::CrewOutcome, VerifactError> {
        let crew = match request {
            CheckRequest::ClaimOrUrl { claim, url } => self
                .pipeline
                .build_crew_for_claim_or_url(claim.as_deref(), url.as_deref())?,
            CheckRequest::Topic { text } => self.pipeline.build_crew_for_topic(text)?,
        };
        crew.run_with_report(inputs).await
    }
}
