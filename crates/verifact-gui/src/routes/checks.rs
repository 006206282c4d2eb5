use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{FromRequestParts, Path},
    http::{StatusCode, header, request::Parts},
    response::{
        IntoResponse, Response,
        sse::{KeepAlive, Sse},
    },
    routing::get,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use verifact_core::{CheckReport, CheckRequest, extract_text};

use crate::error::AppError;
use crate::metrics;
use crate::state::{AppState, CheckMetrics, CheckState, CheckStatus, ForgetOutcome, ReportLookup, SseStream};

#[derive(Debug, Default, Deserialize)]
pub struct StartCheckRequest {
    #[serde(default)]
    pub claim: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub document: Option<DocumentUpload>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentUpload {
    pub file_name: String,
    pub content_base64: String,
}

#[derive(Debug, Serialize)]
pub struct StartCheckResponse {
    pub check_id: String,
    pub state: CheckState,
    pub capacity: CheckMetrics,
}

#[derive(Debug, Serialize)]
pub struct ListChecksResponse {
    pub checks: Vec<CheckStatus>,
    pub capacity: CheckMetrics,
}

pub fn checks_router() -> Router<AppState> {
    Router::new()
        .route("/checks", get(list_checks).post(start_check))
        .route("/checks/:id", get(get_check).delete(delete_check))
        .route("/checks/:id/stream", get(stream_check))
        .route("/checks/:id/report", get(download_report))
}

#[instrument(skip_all)]
async fn start_check(
    GuardedState(state): GuardedState,
    Json(payload): Json<StartCheckRequest>,
) -> Result<(StatusCode, Json<StartCheckResponse>), AppError> {
    let request = into_check_request(payload)?;
    let mode = request.mode();

    let service = state.check_service();
    let check_id = service.start_check(request);
    let state_snapshot = service
        .status(&check_id)
        .map(|status| status.state)
        .unwrap_or(CheckState::Running);

    let capacity = service.metrics();
    metrics::check_started(
        &check_id,
        mode.as_str(),
        capacity.running_checks,
        capacity.available_permits,
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(StartCheckResponse {
            check_id,
            state: state_snapshot,
            capacity,
        }),
    ))
}

fn into_check_request(payload: StartCheckRequest) -> Result<CheckRequest, AppError> {
    if let Some(document) = payload.document {
        let bytes = STANDARD
            .decode(document.content_base64.trim())
            .map_err(|err| AppError::bad_request(format!("document is not valid base64: {err}")))?;
        let text = extract_text(&document.file_name, &bytes).map_err(|err| AppError::rejected(&err))?;
        if text.trim().is_empty() {
            return Err(AppError::bad_request("document contains no text"));
        }
        return Ok(CheckRequest::Topic { text });
    }

    let claim = non_empty(payload.claim);
    let url = non_empty(payload.url);
    if claim.is_none() && url.is_none() {
        return Err(AppError::bad_request(
            "provide a claim, a URL or a document to check",
        ));
    }
    Ok(CheckRequest::ClaimOrUrl { claim, url })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

async fn get_check(
    GuardedState(state): GuardedState,
    Path(check_id): Path<String>,
) -> Result<Json<CheckStatus>, AppError> {
    state
        .check_service()
        .status(&check_id)
        .map(Json)
        .ok_or_else(|| AppError::not_found("check not found"))
}

async fn delete_check(
    GuardedState(state): GuardedState,
    Path(check_id): Path<String>,
) -> Result<StatusCode, AppError> {
    match state.check_service().forget(&check_id) {
        ForgetOutcome::Removed => Ok(StatusCode::NO_CONTENT),
        ForgetOutcome::Running => Err(AppError::new(
            StatusCode::CONFLICT,
            "check is still running",
        )),
        ForgetOutcome::Missing => Err(AppError::not_found("check not found")),
    }
}

async fn list_checks(
    GuardedState(state): GuardedState,
) -> Result<Json<ListChecksResponse>, AppError> {
    let service = state.check_service();
    Ok(Json(ListChecksResponse {
        checks: service.list_checks(),
        capacity: service.metrics(),
    }))
}

async fn stream_check(
    GuardedState(state): GuardedState,
    Path(check_id): Path<String>,
) -> Result<Sse<SseStream>, AppError> {
    let service = state.check_service();
    match service.event_stream(&check_id) {
        Some(stream) => {
            metrics::stream_opened(&check_id, service.metrics().active_streams);
            Ok(Sse::new(stream).keep_alive(KeepAlive::new()))
        }
        None => Err(AppError::not_found("check not found")),
    }
}

async fn download_report(
    GuardedState(state): GuardedState,
    Path(check_id): Path<String>,
) -> Result<Response, AppError> {
    match state.check_service().take_report(&check_id) {
        ReportLookup::Ready(report) => {
            let body = report.to_bytes();
            metrics::report_downloaded(&check_id, body.len());
            Ok(report_response(body))
        }
        ReportLookup::Pending => Err(AppError::new(
            StatusCode::CONFLICT,
            "check is still running",
        )),
        ReportLookup::Failed => Err(AppError::new(
            StatusCode::CONFLICT,
            "check failed; no report available",
        )),
        ReportLookup::Missing => Err(AppError::not_found("report not found")),
    }
}

fn report_response(body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", CheckReport::FILE_NAME),
            ),
        ],
        body,
    )
        .into_response()
}

pub struct GuardedState(pub AppState);

#[async_trait]
impl FromRequestParts<AppState> for GuardedState {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let app_state = state.clone();

        if !app_state.gui_enabled() {
            return Err(AppError::new(StatusCode::FORBIDDEN, "GUI disabled"));
        }

        if let Some(expected) = app_state.auth_token() {
            let provided = parts
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::trim);

            match provided {
                Some(token) if token == expected.as_str() => {}
                _ => {
                    return Err(AppError::new(
                        StatusCode::UNAUTHORIZED,
                        "invalid auth token",
                    ));
                }
            }
        }

        Ok(GuardedState(app_state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_inputs_are_rejected() {
        let payload = StartCheckRequest {
            claim: Some("   ".into()),
            url: None,
            document: None,
        };
        let err = into_check_request(payload).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn text_documents_become_topic_checks() {
        let payload = StartCheckRequest {
            document: Some(DocumentUpload {
                file_name: "notes.txt".into(),
                content_base64: STANDARD.encode("The moon landing happened in 1969."),
            }),
            ..StartCheckRequest::default()
        };
        let request = into_check_request(payload).unwrap();
        assert_eq!(
            request,
            CheckRequest::Topic {
                text: "The moon landing happened in 1969.".into()
            }
        );
    }

    #[test]
    fn unsupported_documents_are_bad_requests() {
        let payload = StartCheckRequest {
            document: Some(DocumentUpload {
                file_name: "scan.pdf".into(),
                content_base64: STANDARD.encode("%PDF-1.7"),
            }),
            ..StartCheckRequest::default()
        };
        let err = into_check_request(payload).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
