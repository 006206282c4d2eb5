mod checks;
mod health;

use std::path::Path;

use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{Request, StatusCode, header},
    response::{IntoResponse, Response},
};
use checks::checks_router;
use health::health_router;
use tokio::fs::{self, canonicalize};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use checks::{DocumentUpload, StartCheckRequest};

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes();
    Router::new()
        .nest("/health", health_router())
        .nest("/api", checks_router())
        .fallback(spa_fallback)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn spa_fallback(State(state): State<AppState>, req: Request<Body>) -> Response {
    if !state.gui_enabled() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let assets_dir = state.assets_dir();
    let request_path = req.uri().path().trim_start_matches('/');

    let candidate = if request_path.is_empty() {
        assets_dir.join("index.html")
    } else {
        let joined = assets_dir.join(request_path);
        if is_safe_file(assets_dir.as_ref(), &joined).await {
            joined
        } else {
            assets_dir.join("index.html")
        }
    };

    match fs::read(&candidate).await {
        Ok(bytes) => {
            let content_type = mime_guess::from_path(&candidate).first_or_octet_stream();
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type.as_ref())
                .body(Body::from(bytes))
                .unwrap_or_else(|error| {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("Failed to build static response: {error}"),
                    )
                        .into_response()
                })
        }
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Static file error: {error}"),
        )
            .into_response(),
    }
}

async fn is_safe_file(base: &Path, candidate: &Path) -> bool {
    let Ok(base) = canonicalize(base).await else {
        return false;
    };
    if let Ok(metadata) = fs::metadata(candidate).await
        && metadata.is_file()
        && let Ok(resolved) = canonicalize(candidate).await
    {
        return resolved.starts_with(base);
    }
    false
}
