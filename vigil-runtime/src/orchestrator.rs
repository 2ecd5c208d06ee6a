//! Collection orchestrator
//!
//! Drives every registered adapter concurrently and reconciles the
//! outcome. One slow or failing provider never blocks the others: each
//! adapter task runs under its own deadline and a failure contributes an
//! empty batch instead of aborting the sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vigil_core::Indicator;
use vigil_sources::{AdapterError, SourceAdapter};

use crate::IndicatorRepository;

/// Errors from orchestrator operations
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Lookup against a provider name nothing is registered under
    #[error("source not registered: {0}")]
    SourceNotRegistered(String),

    /// A registered adapter failed a deliberate search request
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// A search did not finish within the configured deadline
    #[error("search against {0} timed out")]
    Timeout(String),
}

/// Coordinates collection across the registered adapters
pub struct Orchestrator {
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
    repository: Arc<dyn IndicatorRepository>,
    /// Deadline for each adapter task; bounds the transport's indefinite
    /// retry loops by cancellation
    task_timeout: Duration,
}

impl Orchestrator {
    pub fn new(repository: Arc<dyn IndicatorRepository>, task_timeout: Duration) -> Self {
        Self {
            adapters: HashMap::new(),
            repository,
            task_timeout,
        }
    }

    /// Register an adapter under its declared identity
    ///
    /// Registering the same identity twice replaces the earlier adapter.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        let identity = adapter.identity().to_string();
        if self.adapters.insert(identity.clone(), adapter).is_some() {
            warn!(source = identity, "replaced previously registered adapter");
        }
    }

    pub fn register_all(&mut self, adapters: Vec<Arc<dyn SourceAdapter>>) {
        for adapter in adapters {
            self.register(adapter);
        }
    }

    /// Registered provider identities, sorted
    pub fn sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run every adapter's collection concurrently and persist the merge
    ///
    /// Returns the number of indicators actually persisted. An adapter
    /// error or elapsed deadline is logged and contributes nothing;
    /// completion order across adapters is unspecified.
    pub async fn collect_since(&self, since: Option<DateTime<Utc>>) -> usize {
        let run_id = Uuid::new_v4();
        info!(%run_id, sources = self.adapters.len(), "starting collection sweep");

        let tasks = self.adapters.values().map(|adapter| {
            let adapter = adapter.clone();
            let deadline = self.task_timeout;
            async move {
                let source = adapter.identity();
                match timeout(deadline, adapter.collect(since)).await {
                    Ok(Ok(batch)) => {
                        debug!(source, count = batch.len(), "adapter finished");
                        batch
                    }
                    Ok(Err(err)) => {
                        error!(source, error = %err, "adapter collection failed");
                        Vec::new()
                    }
                    Err(_) => {
                        warn!(source, timeout_secs = deadline.as_secs(), "adapter timed out");
                        Vec::new()
                    }
                }
            }
        });

        let indicators: Vec<Indicator> = join_all(tasks).await.into_iter().flatten().collect();
        if indicators.is_empty() {
            info!(%run_id, "sweep produced no indicators");
            return 0;
        }

        let inserted = self.repository.upsert_many(&indicators);
        info!(%run_id, collected = indicators.len(), inserted, "stored indicators");
        inserted
    }

    /// Point lookup against one registered provider
    ///
    /// Results are opportunistically persisted before returning. Failures
    /// of the adapter itself propagate; an unknown provider name is the
    /// caller's error and performs no network work.
    pub async fn search(
        &self,
        source: &str,
        query: &str,
    ) -> Result<Vec<Indicator>, OrchestratorError> {
        let adapter = self
            .adapters
            .get(source)
            .ok_or_else(|| OrchestratorError::SourceNotRegistered(source.to_string()))?;

        let results = timeout(self.task_timeout, adapter.search(query))
            .await
            .map_err(|_| OrchestratorError::Timeout(source.to_string()))??;

        if !results.is_empty() {
            let inserted = self.repository.upsert_many(&results);
            debug!(source, results = results.len(), inserted, "persisted search results");
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryRepository;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vigil_core::IndicatorKind;

    struct StubAdapter {
        identity: &'static str,
        batch: Vec<Indicator>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl StubAdapter {
        fn ok(identity: &'static str, values: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                identity,
                batch: values
                    .iter()
                    .map(|v| Indicator::new(IndicatorKind::Ip, v, identity, 50))
                    .collect(),
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(identity: &'static str) -> Arc<Self> {
            Arc::new(Self {
                identity,
                batch: Vec::new(),
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        fn identity(&self) -> &'static str {
            self.identity
        }

        async fn collect(
            &self,
            _since: Option<DateTime<Utc>>,
        ) -> Result<Vec<Indicator>, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AdapterError::Malformed("boom".to_string()))
            } else {
                Ok(self.batch.clone())
            }
        }

        async fn search(&self, query: &str) -> Result<Vec<Indicator>, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AdapterError::Malformed("boom".to_string()))
            } else {
                Ok(vec![Indicator::new(
                    IndicatorKind::Ip,
                    query,
                    self.identity,
                    50,
                )])
            }
        }
    }

    struct NeverAdapter;

    #[async_trait]
    impl SourceAdapter for NeverAdapter {
        fn identity(&self) -> &'static str {
            "tarpit"
        }

        async fn collect(
            &self,
            _since: Option<DateTime<Utc>>,
        ) -> Result<Vec<Indicator>, AdapterError> {
            futures::future::pending().await
        }

        async fn search(&self, _query: &str) -> Result<Vec<Indicator>, AdapterError> {
            futures::future::pending().await
        }
    }

    fn orchestrator(repo: Arc<MemoryRepository>) -> Orchestrator {
        Orchestrator::new(repo, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_failing_adapter_does_not_abort_sweep() {
        let repo = Arc::new(MemoryRepository::new());
        let mut orch = orchestrator(repo.clone());
        orch.register(StubAdapter::ok("otx", &["1.1.1.1", "2.2.2.2"]));
        orch.register(StubAdapter::failing("xfe"));
        orch.register(StubAdapter::ok("shodan", &["3.3.3.3"]));

        let inserted = orch.collect_since(None).await;
        assert_eq!(inserted, 3);
        assert!(repo.get("ip:1.1.1.1:otx").is_some());
        assert!(repo.get("ip:3.3.3.3:shodan").is_some());
    }

    #[tokio::test]
    async fn test_empty_sweep_skips_repository() {
        let repo = Arc::new(MemoryRepository::new());
        let mut orch = orchestrator(repo.clone());
        orch.register(StubAdapter::failing("otx"));

        assert_eq!(orch.collect_since(None).await, 0);
        assert!(repo.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_adapter_times_out_without_blocking_others() {
        let repo = Arc::new(MemoryRepository::new());
        let mut orch = Orchestrator::new(repo.clone(), Duration::from_secs(5));
        orch.register(Arc::new(NeverAdapter));
        orch.register(StubAdapter::ok("otx", &["1.1.1.1"]));

        let inserted = orch.collect_since(None).await;
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn test_search_unregistered_source() {
        let repo = Arc::new(MemoryRepository::new());
        let mut orch = orchestrator(repo);
        let probe = StubAdapter::ok("otx", &[]);
        orch.register(probe.clone());

        let result = orch.search("unregistered-source", "x").await;
        assert!(matches!(
            result,
            Err(OrchestratorError::SourceNotRegistered(_))
        ));
        // No adapter was invoked
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_search_persists_results() {
        let repo = Arc::new(MemoryRepository::new());
        let mut orch = orchestrator(repo.clone());
        orch.register(StubAdapter::ok("otx", &[]));

        let results = orch.search("otx", "9.9.9.9").await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(repo.get("ip:9.9.9.9:otx").is_some());
    }

    #[tokio::test]
    async fn test_search_failure_propagates() {
        let repo = Arc::new(MemoryRepository::new());
        let mut orch = orchestrator(repo);
        orch.register(StubAdapter::failing("otx"));

        let result = orch.search("otx", "x").await;
        assert!(matches!(result, Err(OrchestratorError::Adapter(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_timeout() {
        let repo = Arc::new(MemoryRepository::new());
        let mut orch = Orchestrator::new(repo, Duration::from_secs(5));
        orch.register(Arc::new(NeverAdapter));

        let result = orch.search("tarpit", "x").await;
        assert!(matches!(result, Err(OrchestratorError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_reregistering_replaces_adapter() {
        let repo = Arc::new(MemoryRepository::new());
        let mut orch = orchestrator(repo);
        orch.register(StubAdapter::failing("otx"));
        orch.register(StubAdapter::ok("otx", &[]));

        assert!(orch.search("otx", "1.1.1.1").await.is_ok());
        assert_eq!(orch.sources(), vec!["otx".to_string()]);
    }
}
