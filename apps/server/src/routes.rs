//! HTTP handlers: job intake, snapshot listing, snapshot download.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use tracing::{error, info};
use url::Url;

use saturator_pipeline::execute_run;
use saturator_shared::{Job, JobDocument, RunId};

use crate::app::AppState;

/// Rejection body naming the required multipart parts.
const REQUIRED_PARTS_MESSAGE: &str =
    "invalid job submission; required form-data parts: file, proxy, change_url";

// ---------------------------------------------------------------------------
// GET / — snapshot listing
// ---------------------------------------------------------------------------

/// List stored snapshot files with download links.
pub async fn index(State(state): State<AppState>) -> Response {
    match state.store.list() {
        Ok(files) => Html(render_index(&files)).into_response(),
        Err(e) => {
            error!(error = %e, "failed to list snapshots");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to list snapshots").into_response()
        }
    }
}

fn render_index(files: &[String]) -> String {
    let mut items = String::new();
    for name in files {
        items.push_str(&format!(
            "    <li><a href=\"/download/{name}\">{name}</a></li>\n"
        ));
    }
    format!(
        "<!doctype html>\n<html>\n<head><title>Saturator snapshots</title></head>\n\
         <body>\n  <h1>Snapshots</h1>\n  <ul>\n{items}  </ul>\n</body>\n</html>\n"
    )
}

// ---------------------------------------------------------------------------
// GET /download/{filename} — snapshot download
// ---------------------------------------------------------------------------

/// Serve a snapshot file as an attachment.
pub async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    let path = match state.store.resolve(&filename) {
        Ok(path) => path,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let headers = [
                (header::CONTENT_TYPE, "application/json".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{filename}\""),
                ),
            ];
            (headers, bytes).into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, format!("no such snapshot: {filename}")).into_response()
        }
        Err(e) => {
            error!(error = %e, path = %path.display(), "snapshot read failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "snapshot read failed").into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// POST /saturation — job intake
// ---------------------------------------------------------------------------

/// Accept a job submission and start its enrichment run in the background.
///
/// Replies immediately with an acceptance message; everything after that is
/// observable only through logs and the eventual snapshot file.
pub async fn submit(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut file: Option<Vec<u8>> = None;
    let mut proxy: Option<String> = None;
    let mut change_url: Option<String> = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let name = field.name().map(str::to_string);
                match name.as_deref() {
                    Some("file") => file = field.bytes().await.ok().map(|b| b.to_vec()),
                    Some("proxy") => proxy = field.text().await.ok(),
                    Some("change_url") => change_url = field.text().await.ok(),
                    _ => {}
                }
            }
            Ok(None) => break,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, format!("malformed form data: {e}"))
                    .into_response();
            }
        }
    }

    let (Some(file), Some(proxy), Some(change_url)) = (file, proxy, change_url) else {
        return (StatusCode::BAD_REQUEST, REQUIRED_PARTS_MESSAGE).into_response();
    };
    if file.is_empty() || proxy.is_empty() || change_url.is_empty() {
        return (StatusCode::BAD_REQUEST, REQUIRED_PARTS_MESSAGE).into_response();
    }

    let document: JobDocument = match serde_json::from_slice(&file) {
        Ok(document) => document,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("invalid job document: {e}"))
                .into_response();
        }
    };

    let rotation_endpoint = match Url::parse(&change_url) {
        Ok(url) => url,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("invalid change_url: {e}")).into_response();
        }
    };

    let run_id = RunId::new();
    info!(
        %run_id,
        accounts = document.accounts.len(),
        proxy = %proxy,
        change_url = %rotation_endpoint,
        "job accepted"
    );

    let job = Job {
        document,
        proxy,
        rotation_endpoint,
    };
    let store = Arc::clone(&state.store);
    let config = Arc::clone(&state.pipeline);

    state.runs.lock().await.spawn(async move {
        match execute_run(&run_id, job, &config, &store).await {
            Ok(report) => {
                info!(%run_id, path = %report.snapshot_path.display(), "run finished");
            }
            Err(e) => {
                error!(%run_id, error = %e, "run failed; no snapshot written");
            }
        }
    });

    (StatusCode::OK, "Job accepted.").into_response()
}
