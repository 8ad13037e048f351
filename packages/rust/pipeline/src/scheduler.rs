//! The batch scheduler: drains the work queue in bounded random batches,
//! dispatching concurrent fetches under a freshly rotated proxy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, error, info, instrument, warn};

use saturator_fetcher::{FetchOutcome, ProfileFetcher};
use saturator_rotator::RotationClient;
use saturator_shared::{JobDocument, PipelineConfig, Result, RunId};

use crate::ledger::ErrorLedger;
use crate::queue::WorkQueue;

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Proxy rotation as the scheduler sees it: a blocking precondition that
/// eventually succeeds.
#[async_trait]
pub trait ProxyRotator: Send + Sync {
    /// Rotate the proxy; returns once a rotation is confirmed.
    async fn rotate(&self);
}

#[async_trait]
impl ProxyRotator for RotationClient {
    async fn rotate(&self) {
        RotationClient::rotate(self).await;
    }
}

/// Source of profile descriptions.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Called once at the top of each batch; lets the source refresh its
    /// network session.
    async fn begin_batch(&self) -> Result<()>;

    /// Fetch and classify one account's profile page.
    async fn fetch(&self, account: &str) -> FetchOutcome;
}

#[async_trait]
impl ProfileSource for ProfileFetcher {
    async fn begin_batch(&self) -> Result<()> {
        self.refresh_session().await
    }

    async fn fetch(&self, account: &str) -> FetchOutcome {
        ProfileFetcher::fetch(self, account).await
    }
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// Summary of a completed enrichment run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Accounts that resolved to a real description.
    pub resolved: usize,
    /// Accounts whose profile has no description element.
    pub empty: usize,
    /// Accounts marked failed after exhausting their attempts.
    pub failed: usize,
    /// Re-enqueue events (one per retried transient failure).
    pub retried: usize,
    /// Batches processed.
    pub batches: usize,
    /// Total duration of the run.
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Scheduler loop
// ---------------------------------------------------------------------------

/// Drain the job's accounts to terminal outcomes, mutating `document` in
/// place.
///
/// Per iteration: rotate the proxy, sample a random batch off the queue,
/// dispatch one concurrent fetch per account, wait for the whole batch,
/// then fold outcomes back — re-enqueueing transient failures that still
/// have an attempt left. Terminates only when every account has exactly
/// one terminal outcome recorded.
#[instrument(skip_all, fields(run_id = %run_id, accounts = document.accounts.len()))]
pub async fn run_job(
    run_id: &RunId,
    document: &mut JobDocument,
    config: &PipelineConfig,
    rotator: &dyn ProxyRotator,
    source: Arc<dyn ProfileSource>,
) -> Result<RunSummary> {
    let start = Instant::now();
    let mut queue = WorkQueue::new(document.accounts.keys().cloned());
    let mut ledger = ErrorLedger::new(config.retry_limit);
    let mut rng = StdRng::from_os_rng();

    let mut summary = RunSummary {
        resolved: 0,
        empty: 0,
        failed: 0,
        retried: 0,
        batches: 0,
        elapsed: Duration::ZERO,
    };

    while !queue.is_empty() {
        info!(remaining = queue.len(), "starting batch");

        // A batch runs under a freshly validated proxy and a fresh session.
        rotator.rotate().await;
        source.begin_batch().await?;

        let batch = queue.sample_batch(config.batch_size, &mut rng);
        summary.batches += 1;

        let handles: Vec<_> = batch
            .into_iter()
            .map(|account| {
                let source = Arc::clone(&source);
                let handle = tokio::spawn({
                    let account = account.clone();
                    async move { source.fetch(&account).await }
                });
                (account, handle)
            })
            .collect();

        // Full batch barrier: nothing proceeds until every fetch lands.
        for (account, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(%account, error = %e, "fetch task failed to complete");
                    FetchOutcome::TransientFailure
                }
            };

            match outcome {
                FetchOutcome::Described(text) => {
                    info!(%account, description = %text, "description resolved");
                    if let Some(record) = document.accounts.get_mut(&account) {
                        record.description = Some(text);
                    }
                    summary.resolved += 1;
                }
                FetchOutcome::NoDescription => {
                    info!(%account, "profile has no description");
                    if let Some(record) = document.accounts.get_mut(&account) {
                        record.description = None;
                    }
                    summary.empty += 1;
                }
                FetchOutcome::TransientFailure => {
                    if ledger.record_failure(&account) {
                        debug!(%account, "transient failure, re-enqueueing");
                        summary.retried += 1;
                        queue.push(account);
                    } else {
                        error!(
                            %account,
                            attempts = ledger.count(&account),
                            "no description obtained, giving up"
                        );
                        if let Some(record) = document.accounts.get_mut(&account) {
                            record.description = None;
                        }
                        summary.failed += 1;
                    }
                }
            }
        }
    }

    summary.elapsed = start.elapsed();

    info!(
        resolved = summary.resolved,
        empty = summary.empty,
        failed = summary.failed,
        retried = summary.retried,
        batches = summary.batches,
        elapsed_ms = summary.elapsed.as_millis(),
        "run drained"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            batch_size: 300,
            retry_limit: 2,
            profile_base_url: "https://t.me".into(),
            request_timeout: Duration::from_secs(5),
            rotate_retry_delay: Duration::ZERO,
            rotate_settle_delay: Duration::ZERO,
        }
    }

    fn document(accounts: &[&str]) -> JobDocument {
        let json = serde_json::json!({
            "accounts": accounts
                .iter()
                .map(|a| (a.to_string(), serde_json::json!({})))
                .collect::<serde_json::Map<_, _>>()
        });
        serde_json::from_value(json).expect("build document")
    }

    struct CountingRotator {
        calls: AtomicUsize,
    }

    impl CountingRotator {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ProxyRotator for CountingRotator {
        async fn rotate(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Plays back a scripted sequence of outcomes per account.
    struct ScriptedSource {
        script: Mutex<HashMap<String, VecDeque<FetchOutcome>>>,
        fetches: AtomicUsize,
        batches: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: &[(&str, &[FetchOutcome])]) -> Self {
            let script = script
                .iter()
                .map(|(account, outcomes)| {
                    (account.to_string(), outcomes.iter().cloned().collect())
                })
                .collect();
            Self {
                script: Mutex::new(script),
                fetches: AtomicUsize::new(0),
                batches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ProfileSource for ScriptedSource {
        async fn begin_batch(&self) -> Result<()> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn fetch(&self, account: &str) -> FetchOutcome {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .get_mut(account)
                .and_then(VecDeque::pop_front)
                .unwrap_or(FetchOutcome::NoDescription)
        }
    }

    #[tokio::test]
    async fn all_accounts_succeed_in_one_batch() {
        let mut doc = document(&["alice", "bob", "carol"]);
        let rotator = CountingRotator::new();
        let source = Arc::new(ScriptedSource::new(&[
            ("alice", &[FetchOutcome::Described("a".into())]),
            ("bob", &[FetchOutcome::Described("b".into())]),
            ("carol", &[FetchOutcome::Described("c".into())]),
        ]));

        let summary = run_job(&RunId::new(), &mut doc, &test_config(), &rotator, source)
            .await
            .unwrap();

        assert_eq!(summary.batches, 1);
        assert_eq!(summary.resolved, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(rotator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(doc.accounts["alice"].description.as_deref(), Some("a"));
        assert_eq!(doc.accounts["bob"].description.as_deref(), Some("b"));
        assert_eq!(doc.accounts["carol"].description.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn transient_failure_retries_once_then_succeeds() {
        let mut doc = document(&["alice"]);
        let rotator = CountingRotator::new();
        let source = Arc::new(ScriptedSource::new(&[(
            "alice",
            &[
                FetchOutcome::TransientFailure,
                FetchOutcome::Described("second try".into()),
            ],
        )]));

        let summary = run_job(
            &RunId::new(),
            &mut doc,
            &test_config(),
            &rotator,
            Arc::clone(&source) as Arc<dyn ProfileSource>,
        )
        .await
        .unwrap();

        assert_eq!(summary.batches, 2);
        assert_eq!(summary.retried, 1);
        assert_eq!(summary.resolved, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(
            doc.accounts["alice"].description.as_deref(),
            Some("second try")
        );
    }

    #[tokio::test]
    async fn two_failures_are_terminal_with_no_third_attempt() {
        let mut doc = document(&["alice"]);
        let rotator = CountingRotator::new();
        let source = Arc::new(ScriptedSource::new(&[(
            "alice",
            &[
                FetchOutcome::TransientFailure,
                FetchOutcome::TransientFailure,
            ],
        )]));

        let summary = run_job(
            &RunId::new(),
            &mut doc,
            &test_config(),
            &rotator,
            Arc::clone(&source) as Arc<dyn ProfileSource>,
        )
        .await
        .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.retried, 1);
        assert_eq!(summary.batches, 2);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert!(doc.accounts["alice"].description.is_none());
    }

    #[tokio::test]
    async fn every_account_reaches_exactly_one_terminal_outcome() {
        let mut doc = document(&["ok", "empty", "flaky", "dead"]);
        let rotator = CountingRotator::new();
        let source = Arc::new(ScriptedSource::new(&[
            ("ok", &[FetchOutcome::Described("fine".into())]),
            ("empty", &[FetchOutcome::NoDescription]),
            (
                "flaky",
                &[
                    FetchOutcome::TransientFailure,
                    FetchOutcome::Described("eventually".into()),
                ],
            ),
            (
                "dead",
                &[
                    FetchOutcome::TransientFailure,
                    FetchOutcome::TransientFailure,
                ],
            ),
        ]));

        let summary = run_job(&RunId::new(), &mut doc, &test_config(), &rotator, source)
            .await
            .unwrap();

        assert_eq!(
            summary.resolved + summary.empty + summary.failed,
            doc.accounts.len(),
            "no account is left without a recorded outcome"
        );
        assert_eq!(doc.accounts["ok"].description.as_deref(), Some("fine"));
        assert!(doc.accounts["empty"].description.is_none());
        assert_eq!(
            doc.accounts["flaky"].description.as_deref(),
            Some("eventually")
        );
        assert!(doc.accounts["dead"].description.is_none());
    }

    #[tokio::test]
    async fn small_batch_size_splits_queue_across_batches() {
        let names: Vec<String> = (0..5).map(|i| format!("account{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut doc = document(&refs);
        let rotator = CountingRotator::new();
        let source = Arc::new(ScriptedSource::new(&[]));

        let config = PipelineConfig {
            batch_size: 2,
            ..test_config()
        };
        let summary = run_job(&RunId::new(), &mut doc, &config, &rotator, source)
            .await
            .unwrap();

        // 5 accounts at 2 per batch: 3 batches, one rotation each.
        assert_eq!(summary.batches, 3);
        assert_eq!(rotator.calls.load(Ordering::SeqCst), 3);
        assert_eq!(summary.empty, 5);
    }
}
