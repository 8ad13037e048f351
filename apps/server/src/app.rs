//! Application state, router assembly, and request logging.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use saturator_shared::PipelineConfig;
use saturator_store::SnapshotStore;

use crate::routes;

/// Shared application state.
///
/// `runs` holds every spawned enrichment task so shutdown can abort and
/// await them; runs share nothing else with each other.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SnapshotStore>,
    pub pipeline: Arc<PipelineConfig>,
    pub runs: Arc<Mutex<JoinSet<()>>>,
}

impl AppState {
    pub fn new(store: SnapshotStore, pipeline: PipelineConfig) -> Self {
        Self {
            store: Arc::new(store),
            pipeline: Arc::new(pipeline),
            runs: Arc::new(Mutex::new(JoinSet::new())),
        }
    }
}

/// Build the axum application router.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/download/:filename", get(routes::download))
        .route("/saturation", post(routes::submit))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Log method, path, status, and latency for every request.
async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );
    response
}
