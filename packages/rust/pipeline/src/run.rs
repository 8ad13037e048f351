//! End-to-end enrichment run: wires the real rotation client, profile
//! fetcher, and snapshot store around the scheduler loop.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, instrument};

use saturator_fetcher::ProfileFetcher;
use saturator_rotator::RotationClient;
use saturator_shared::{Job, PipelineConfig, Result, RunId};
use saturator_store::SnapshotStore;

use crate::scheduler::{self, ProfileSource, RunSummary};

/// Result of a completed run.
#[derive(Debug)]
pub struct RunReport {
    /// Path of the written snapshot file.
    pub snapshot_path: PathBuf,
    /// Scheduler counters for the run.
    pub summary: RunSummary,
}

/// Drive `job` to completion and persist the snapshot.
///
/// Consumes the job: it is owned by exactly one run. A failure anywhere
/// before the queue drains produces no snapshot; the caller logs it and
/// the run ends (fire-and-forget model).
#[instrument(skip_all, fields(run_id = %run_id))]
pub async fn execute_run(
    run_id: &RunId,
    mut job: Job,
    config: &PipelineConfig,
    store: &SnapshotStore,
) -> Result<RunReport> {
    let rotator = RotationClient::new(
        job.rotation_endpoint.clone(),
        config.rotate_retry_delay,
        config.rotate_settle_delay,
    )?;
    let fetcher = ProfileFetcher::new(
        &config.profile_base_url,
        job.proxy.clone(),
        config.request_timeout,
    )?;
    let source: Arc<dyn ProfileSource> = Arc::new(fetcher);

    let summary = scheduler::run_job(run_id, &mut job.document, config, &rotator, source).await?;
    let snapshot_path = store.persist(&job.document)?;

    info!(
        path = %snapshot_path.display(),
        resolved = summary.resolved,
        empty = summary.empty,
        failed = summary.failed,
        "run completed, snapshot written"
    );

    Ok(RunReport {
        snapshot_path,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn run_against_mock_endpoints_writes_snapshot() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rotate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/alice"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><div class="tgme_page_description">hello world</div></body></html>"#,
            ))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/bob"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
            .mount(&server)
            .await;

        let document = serde_json::from_str(
            r#"{"accounts": {"alice": {}, "bob": {}}}"#,
        )
        .unwrap();
        let job = Job {
            document,
            proxy: String::new(),
            rotation_endpoint: Url::parse(&format!("{}/rotate", server.uri())).unwrap(),
        };

        let config = PipelineConfig {
            batch_size: 300,
            retry_limit: 2,
            profile_base_url: server.uri(),
            request_timeout: Duration::from_secs(5),
            rotate_retry_delay: Duration::ZERO,
            rotate_settle_delay: Duration::ZERO,
        };

        let run_id = RunId::new();
        let dir = std::env::temp_dir().join(format!("saturator-run-test-{run_id}"));
        let store = SnapshotStore::open(&dir).unwrap();

        let report = execute_run(&run_id, job, &config, &store).await.unwrap();
        assert_eq!(report.summary.resolved, 1);
        assert_eq!(report.summary.empty, 1);

        let written = std::fs::read_to_string(&report.snapshot_path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed["accounts"]["alice"]["description"], "hello world");
        assert!(parsed["accounts"]["bob"]["description"].is_null());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
