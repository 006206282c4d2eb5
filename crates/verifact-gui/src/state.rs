use std::convert::Infallible;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::response::sse::Event;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Semaphore, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{self as stream, Stream, StreamExt};
use tracing::{error, info, warn};
use uuid::Uuid;
use verifact_core::{
    CheckMode, CheckReport, CheckRequest, ErrorKind, FactChecker, Pipeline,
};

use crate::config::AppConfig;
use crate::metrics;

#[derive(Clone)]
pub struct AppState {
    check_service: Arc<CheckService>,
    assets_dir: Arc<PathBuf>,
    gui_enabled: bool,
    auth_token: Option<Arc<String>>,
    max_upload_bytes: usize,
}

impl AppState {
    pub async fn try_new(config: &AppConfig) -> Result<Self> {
        let pipeline = Pipeline::new(config.settings.clone())?;
        let service = CheckService::new(FactChecker::new(pipeline), config.max_concurrency)
            .with_record_ttl(config.record_ttl);
        Ok(Self::with_service(config, service))
    }

    /// Build state around an existing service (custom backends in tests).
    pub fn with_service(config: &AppConfig, service: CheckService) -> Self {
        Self {
            check_service: Arc::new(service),
            assets_dir: Arc::new(config.assets_dir.clone()),
            gui_enabled: config.gui_enabled,
            auth_token: config
                .auth_token
                .as_ref()
                .map(|token| Arc::new(token.to_string())),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub fn check_service(&self) -> Arc<CheckService> {
        self.check_service.clone()
    }

    pub fn assets_dir(&self) -> Arc<PathBuf> {
        self.assets_dir.clone()
    }

    pub fn gui_enabled(&self) -> bool {
        self.gui_enabled
    }

    pub fn auth_token(&self) -> Option<Arc<String>> {
        self.auth_token.clone()
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn metrics(&self) -> CheckMetrics {
        self.check_service.metrics()
    }
}

/// Runs checks in the background, bounded by a semaphore, and keeps their
/// results in memory until the report is downloaded or the record expires.
#[derive(Clone)]
pub struct CheckService {
    checker: FactChecker,
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    record_ttl: Duration,
    checks: Arc<DashMap<String, CheckRecord>>,
    streams: Arc<DashMap<String, broadcast::Sender<CheckEvent>>>,
}

impl CheckService {
    pub fn new(checker: FactChecker, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            checker,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            record_ttl: Self::DEFAULT_RECORD_TTL,
            checks: Arc::new(DashMap::new()),
            streams: Arc::new(DashMap::new()),
        }
    }

    pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(60 * 60);

    /// How long a finished record is kept when nobody downloads or deletes it.
    pub fn with_record_ttl(mut self, ttl: Duration) -> Self {
        self.record_ttl = ttl;
        self
    }

    /// Drop finished records older than the TTL; returns how many went.
    pub fn purge_expired(&self) -> usize {
        let (now, ttl) = (Instant::now(), self.record_ttl);
        let before = self.checks.len();
        self.checks.retain(|_, record| !record.expired(now, ttl));
        let purged = before.saturating_sub(self.checks.len());
        if purged > 0 {
            info!(purged, "dropped expired check records");
        }
        purged
    }

    pub fn start_check(&self, request: CheckRequest) -> String {
        self.purge_expired();
        let check_id = Uuid::new_v4().to_string();
        let mode = request.mode();

        let sender = self
            .streams
            .entry(check_id.clone())
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel(32);
                tx
            })
            .clone();
        let _ = sender.send(CheckEvent::started());
        self.checks
            .insert(check_id.clone(), CheckRecord::Running { mode });

        let service = self.clone();
        let id = check_id.clone();
        tokio::spawn(async move {
            service.execute(id, request, sender).await;
        });

        check_id
    }

    async fn execute(
        &self,
        check_id: String,
        request: CheckRequest,
        sender: broadcast::Sender<CheckEvent>,
    ) {
        let mode = request.mode();
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(err) => {
                let event = CheckEvent::failed(ErrorKind::Execution, &err);
                let _ = sender.send(event.clone());
                self.checks.insert(
                    check_id.clone(),
                    CheckRecord::Failed {
                        mode,
                        error: err.to_string(),
                        kind: ErrorKind::Execution,
                        event,
                        finished_at: Instant::now(),
                    },
                );
                self.streams.remove(&check_id);
                return;
            }
        };

        let result = self.checker.check_with_id(check_id.clone(), request).await;
        drop(permit);

        match result {
            Ok(report) => {
                info!(%check_id, verdict = %report.verdict, "check completed");
                let event = CheckEvent::completed(&report);
                self.checks.insert(
                    check_id.clone(),
                    CheckRecord::Completed {
                        report: Arc::new(report),
                        event: event.clone(),
                        finished_at: Instant::now(),
                    },
                );
                let _ = sender.send(event);
            }
            Err(err) => {
                error!(%check_id, kind = %err.kind(), error = %err, "check failed");
                let event = CheckEvent::failed(err.kind(), &err);
                self.checks.insert(
                    check_id.clone(),
                    CheckRecord::Failed {
                        mode,
                        error: err.to_string(),
                        kind: err.kind(),
                        event: event.clone(),
                        finished_at: Instant::now(),
                    },
                );
                let _ = sender.send(event);
            }
        }

        self.streams.remove(&check_id);

        let snapshot = self.metrics();
        metrics::check_finished(
            &check_id,
            snapshot.running_checks,
            snapshot.available_permits,
        );
    }

    pub fn status(&self, check_id: &str) -> Option<CheckStatus> {
        self.checks
            .get(check_id)
            .map(|record| record.value().status(check_id))
    }

    pub fn list_checks(&self) -> Vec<CheckStatus> {
        self.purge_expired();
        let mut checks: Vec<CheckStatus> = self
            .checks
            .iter()
            .map(|entry| entry.value().status(entry.key()))
            .collect();
        checks.sort_by(|a, b| a.check_id.cmp(&b.check_id));
        checks
    }

    pub fn report(&self, check_id: &str) -> Option<Arc<CheckReport>> {
        self.checks
            .get(check_id)
            .and_then(|record| match record.value() {
                CheckRecord::Completed { report, .. } => Some(report.clone()),
                _ => None,
            })
    }

    /// Hand out a finished report exactly once; the record is dropped.
    pub fn take_report(&self, check_id: &str) -> ReportLookup {
        let removed = self.checks.remove_if(check_id, |_, record| {
            matches!(record, CheckRecord::Completed { .. })
        });

        if let Some((_, CheckRecord::Completed { report, .. })) = removed {
            return ReportLookup::Ready(report);
        }

        match self.checks.get(check_id).map(|record| record.value().state()) {
            Some(CheckState::Running) => ReportLookup::Pending,
            Some(_) => ReportLookup::Failed,
            None => ReportLookup::Missing,
        }
    }

    /// Forget a check that is no longer running.
    pub fn forget(&self, check_id: &str) -> ForgetOutcome {
        let removed = self.checks.remove_if(check_id, |_, record| {
            !matches!(record, CheckRecord::Running { .. })
        });

        match removed {
            Some(_) => ForgetOutcome::Removed,
            None if self.checks.contains_key(check_id) => ForgetOutcome::Running,
            None => ForgetOutcome::Missing,
        }
    }

    /// Live events for a running check, or the stored terminal event.
    ///
    /// A check can finish between subscribing and the broadcast closing, so a
    /// live stream that ends without a terminal event replays the stored one.
    pub fn event_stream(&self, check_id: &str) -> Option<SseStream> {
        if let Some(event) = self.stored_event(check_id) {
            return Some(single_event(event));
        }

        let Some(rx) = self.streams.get(check_id).map(|sender| sender.subscribe()) else {
            // finished after the first lookup
            return self.stored_event(check_id).map(single_event);
        };

        let seen_terminal = Arc::new(AtomicBool::new(false));
        let seen = seen_terminal.clone();
        let live = BroadcastStream::new(rx).filter_map(move |event| match event {
            Ok(event) => {
                if event.is_terminal() {
                    seen.store(true, Ordering::Relaxed);
                }
                Some(Result::<Event, Infallible>::Ok(event.into_sse_event()))
            }
            Err(err) => {
                warn!(error = %err, "check event stream lagged");
                None
            }
        });

        let checks = self.checks.clone();
        let id = check_id.to_string();
        let tail = stream::once(()).filter_map(move |()| {
            if seen_terminal.load(Ordering::Relaxed) {
                return None;
            }
            checks
                .get(&id)
                .and_then(|record| record.value().terminal_event().cloned())
                .map(|event| Result::<Event, Infallible>::Ok(event.into_sse_event()))
        });

        Some(Box::pin(live.chain(tail)) as SseStream)
    }

    fn stored_event(&self, check_id: &str) -> Option<CheckEvent> {
        self.checks
            .get(check_id)
            .and_then(|record| record.value().terminal_event().cloned())
    }

    pub fn metrics(&self) -> CheckMetrics {
        let running_checks = self
            .checks
            .iter()
            .filter(|entry| matches!(entry.value(), CheckRecord::Running { .. }))
            .count();

        CheckMetrics {
            max_concurrency: self.max_concurrency,
            available_permits: self.semaphore.available_permits(),
            running_checks,
            total_checks: self.checks.len(),
            active_streams: self.streams.len(),
        }
    }
}

pub type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

fn single_event(event: CheckEvent) -> SseStream {
    Box::pin(stream::iter(vec![Result::<Event, Infallible>::Ok(
        event.into_sse_event(),
    )]))
}

#[derive(Debug)]
pub enum CheckRecord {
    Running {
        mode: CheckMode,
    },
    Completed {
        report: Arc<CheckReport>,
        event: CheckEvent,
        finished_at: Instant,
    },
    Failed {
        mode: CheckMode,
        error: String,
        kind: ErrorKind,
        event: CheckEvent,
        finished_at: Instant,
    },
}

impl CheckRecord {
    fn terminal_event(&self) -> Option<&CheckEvent> {
        match self {
            CheckRecord::Running { .. } => None,
            CheckRecord::Completed { event, .. } | CheckRecord::Failed { event, .. } => Some(event),
        }
    }

    fn expired(&self, now: Instant, ttl: Duration) -> bool {
        match self {
            CheckRecord::Running { .. } => false,
            CheckRecord::Completed { finished_at, .. } | CheckRecord::Failed { finished_at, .. } => {
                now.saturating_duration_since(*finished_at) >= ttl
            }
        }
    }

    fn state(&self) -> CheckState {
        match self {
            CheckRecord::Running { .. } => CheckState::Running,
            CheckRecord::Completed { .. } => CheckState::Completed,
            CheckRecord::Failed { .. } => CheckState::Failed,
        }
    }

    fn status(&self, check_id: &str) -> CheckStatus {
        let mut status = CheckStatus {
            check_id: check_id.to_string(),
            state: self.state(),
            mode: CheckMode::ClaimOrUrl,
            result: None,
            verdict: None,
            error: None,
            error_kind: None,
            duration_ms: None,
        };

        match self {
            CheckRecord::Running { mode } => status.mode = *mode,
            CheckRecord::Completed { report, .. } => {
                status.mode = report.mode;
                status.result = Some(report.result.clone());
                status.verdict = Some(report.verdict.label().to_string());
                status.duration_ms = Some(report.duration_ms);
            }
            CheckRecord::Failed {
                mode, error, kind, ..
            } => {
                status.mode = *mode;
                status.error = Some(error.clone());
                status.error_kind = Some(*kind);
            }
        }

        status
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckState {
    Running,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Serialize)]
pub struct CheckStatus {
    pub check_id: String,
    pub state: CheckState,
    pub mode: CheckMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CheckMetrics {
    pub max_concurrency: usize,
    pub available_permits: usize,
    pub running_checks: usize,
    pub total_checks: usize,
    pub active_streams: usize,
}

#[derive(Debug)]
pub enum ReportLookup {
    Ready(Arc<CheckReport>),
    Pending,
    Failed,
    Missing,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ForgetOutcome {
    Removed,
    Running,
    Missing,
}

#[derive(Clone, Debug, Serialize)]
pub struct CheckEvent {
    pub kind: CheckEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl CheckEvent {
    pub fn started() -> Self {
        Self {
            kind: CheckEventKind::Started,
            message: Some("check started".into()),
            verdict: None,
            result: None,
            error_kind: None,
        }
    }

    pub fn completed(report: &CheckReport) -> Self {
        Self {
            kind: CheckEventKind::Completed,
            message: Some("check completed".into()),
            verdict: Some(report.verdict.label().to_string()),
            result: Some(report.result.clone()),
            error_kind: None,
        }
    }

    pub fn failed(kind: ErrorKind, error: &impl std::fmt::Display) -> Self {
        Self {
            kind: CheckEventKind::Error,
            message: Some(format!("check failed: {error}")),
            verdict: None,
            result: None,
            error_kind: Some(kind),
        }
    }

    fn is_terminal(&self) -> bool {
        !matches!(self.kind, CheckEventKind::Started)
    }

    pub fn into_sse_event(self) -> Event {
        let data = serde_json::to_string(&self).unwrap_or_else(|_| {
            serde_json::json!({
                "kind": CheckEventKind::Error,
                "message": "failed to serialize check event",
            })
            .to_string()
        });

        Event::default().event(self.kind.as_str()).data(data)
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckEventKind {
    Started,
    Completed,
    Error,
}

impl CheckEventKind {
    fn as_str(&self) -> &'static str {
        match self {
            CheckEventKind::Started => "started",
            CheckEventKind::Completed => "completed",
            CheckEventKind::Error => "error",
        }
    }
}
