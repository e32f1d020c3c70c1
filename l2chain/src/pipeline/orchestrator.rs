//! The pipeline orchestrator: selects files and runs the chain over them on
//! a bounded worker pool.

use super::chain::panic_message;
use super::summary::SummaryCollector;
use super::{FileReport, RunPolicy, RunSummary, StageChain};
use crate::cancellation::CancellationToken;
use crate::context::RunIdentity;
use crate::core::{FileId, Outcome};
use crate::errors::{ConfigError, ResourceLoadError, RunError, StageError};
use crate::events::{EventSink, NoOpEventSink, RunEvent};
use crate::output::{NoOpProductWriter, ProductWriter, PRODUCT_WRITER};
use crate::resources::ResourcePool;
use crate::selectors::{FileSelector, SelectorQuery};
use futures::FutureExt;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Builder for an [`Orchestrator`].
pub struct OrchestratorBuilder {
    chain: StageChain,
    resources: ResourcePool,
    selectors: Vec<Arc<dyn FileSelector>>,
    policy: RunPolicy,
    concurrency: usize,
    preload_resources: bool,
    writer: Arc<dyn ProductWriter>,
    events: Arc<dyn EventSink>,
    label: Option<String>,
}

impl OrchestratorBuilder {
    /// Sets the shared resource pool.
    #[must_use]
    pub fn resources(mut self, resources: ResourcePool) -> Self {
        self.resources = resources;
        self
    }

    /// Adds an enabled file selector.
    #[must_use]
    pub fn selector(mut self, selector: Arc<dyn FileSelector>) -> Self {
        self.selectors.push(selector);
        self
    }

    /// Sets the run policy.
    #[must_use]
    pub fn policy(mut self, policy: RunPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the maximum number of files processed at once.
    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Loads every dataset the chain declares before dispatching files
    /// (on by default).
    #[must_use]
    pub fn preload_resources(mut self, preload: bool) -> Self {
        self.preload_resources = preload;
        self
    }

    /// Sets the writer that receives completed contexts.
    #[must_use]
    pub fn product_writer(mut self, writer: Arc<dyn ProductWriter>) -> Self {
        self.writer = writer;
        self
    }

    /// Sets the sink that receives run events.
    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets a label recorded in run identities.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Builds the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` when the concurrency limit is zero.
    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::invalid("concurrency", "must be at least 1"));
        }
        Ok(Orchestrator {
            chain: Arc::new(self.chain),
            resources: Arc::new(self.resources),
            selectors: self.selectors,
            policy: self.policy,
            concurrency: self.concurrency,
            preload_resources: self.preload_resources,
            writer: self.writer,
            events: self.events,
            label: self.label,
        })
    }
}

/// Top-level run coordinator.
///
/// Owns the shared resource pool for its whole lifetime: datasets loaded in
/// one run are reused by later runs of the same orchestrator and released
/// when it is dropped. Load failures are remembered only for the run in
/// which they happened.
pub struct Orchestrator {
    chain: Arc<StageChain>,
    resources: Arc<ResourcePool>,
    selectors: Vec<Arc<dyn FileSelector>>,
    policy: RunPolicy,
    concurrency: usize,
    preload_resources: bool,
    writer: Arc<dyn ProductWriter>,
    events: Arc<dyn EventSink>,
    label: Option<String>,
}

impl Orchestrator {
    /// Starts building an orchestrator around a validated chain.
    #[must_use]
    pub fn builder(chain: StageChain) -> OrchestratorBuilder {
        OrchestratorBuilder {
            chain,
            resources: ResourcePool::empty(),
            selectors: Vec::new(),
            policy: RunPolicy::default(),
            concurrency: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            preload_resources: true,
            writer: Arc::new(NoOpProductWriter),
            events: Arc::new(NoOpEventSink),
            label: None,
        }
    }

    /// Returns the chain.
    #[must_use]
    pub fn chain(&self) -> &StageChain {
        &self.chain
    }

    /// Returns the shared resource pool.
    #[must_use]
    pub fn resources(&self) -> &ResourcePool {
        &self.resources
    }

    /// Returns the concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the run policy.
    #[must_use]
    pub fn policy(&self) -> RunPolicy {
        self.policy
    }

    /// Selects files with every configured selector and processes them.
    ///
    /// With no selectors the run is empty and succeeds.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Selector` if a selector cannot reach its source and
    /// `RunError::ResourceLoad` if a shared dataset fails to load. Failed
    /// files are not errors; they are reported in the summary.
    pub async fn run(&self, query: &SelectorQuery) -> Result<RunSummary, RunError> {
        let identity = self.new_identity();
        let span = info_span!("run", run_id = %identity.run_id);
        async {
            info!(
                start = %query.start,
                end = %query.end,
                selectors = self.selectors.len(),
                "Starting run"
            );
            let files = match self.select_files(query).await {
                Ok(files) => files,
                Err(err) => return Err(self.abort(&identity, err).await),
            };
            self.execute(identity.clone(), files).await
        }
        .instrument(span)
        .await
    }

    /// Processes an explicit list of files, inferring each instrument mode
    /// from its file name.
    ///
    /// # Errors
    ///
    /// Returns `RunError::ResourceLoad` if a shared dataset fails to load.
    pub async fn run_files<I, P>(&self, paths: I) -> Result<RunSummary, RunError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let files: Vec<FileId> = paths.into_iter().map(FileId::from_path).collect();
        let identity = self.new_identity();
        let span = info_span!("run", run_id = %identity.run_id);
        async {
            info!(files = files.len(), "Starting run on explicit file list");
            self.execute(identity.clone(), files).await
        }
        .instrument(span)
        .await
    }

    fn new_identity(&self) -> RunIdentity {
        match &self.label {
            Some(label) => RunIdentity::new().with_label(label.clone()),
            None => RunIdentity::new(),
        }
    }

    async fn select_files(&self, query: &SelectorQuery) -> Result<Vec<FileId>, RunError> {
        let mut files = Vec::new();
        for selector in &self.selectors {
            let selector = selector.clone();
            let query = *query;
            let selected = tokio::task::spawn_blocking(move || selector.select(&query))
                .await
                .map_err(|e| RunError::Internal(format!("file selector task failed: {e}")))??;
            files.extend(selected);
        }
        Ok(files)
    }

    async fn abort(&self, identity: &RunIdentity, err: RunError) -> RunError {
        error!(kind = err.kind(), error = %err, "Run terminated");
        self.events
            .emit(&RunEvent::RunAborted {
                run_id: identity.run_id,
                reason: err.to_string(),
            })
            .await;
        err
    }

    async fn execute(&self, identity: RunIdentity, files: Vec<FileId>) -> Result<RunSummary, RunError> {
        let stages: Vec<String> = self.chain.enabled_names().into_iter().map(str::to_string).collect();
        self.events
            .emit(&RunEvent::RunStarted {
                run_id: identity.run_id,
                files: files.len(),
                stages: stages.clone(),
                concurrency: self.concurrency,
                policy: self.policy,
            })
            .await;

        let retried = self.resources.reset_failed();
        if retried > 0 {
            info!(resources = retried, "Retrying shared resources that failed in an earlier run");
        }

        if self.preload_resources {
            let required = self.chain.required_resources();
            if !required.is_empty() {
                info!(resources = ?required, "Preloading shared resources");
            }
            if let Err(err) = self.resources.preload(&required).await {
                return Err(self.abort(&identity, err.into()).await);
            }
        }

        let token = Arc::new(CancellationToken::new());
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let worker = Worker {
            chain: self.chain.clone(),
            resources: self.resources.clone(),
            writer: self.writer.clone(),
            events: self.events.clone(),
            token: token.clone(),
            policy: self.policy,
            run_id: identity.run_id,
        };
        let mut collector = SummaryCollector::new(identity.clone(), self.policy, stages, files.len());
        let mut tasks = JoinSet::new();

        let mut queue = files.into_iter();
        while let Some(file) = queue.next() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| RunError::Internal(e.to_string()))?;
            if token.is_cancelled() {
                debug!(remaining = queue.len() + 1, "Dispatch stopped");
                collector.not_started(file);
                queue.by_ref().for_each(|f| collector.not_started(f));
                break;
            }
            let span = info_span!("file", file = %file.file_name());
            tasks.spawn(worker.clone().process(file, permit).instrument(span));
        }

        // Every dispatched task is joined, even after a failure, so files in
        // flight reach their outcome before the run returns.
        let mut fatal: Option<ResourceLoadError> = None;
        let mut crashed: Option<String> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(report)) => collector.record(report),
                Ok(Err(err)) => {
                    fatal.get_or_insert(err);
                }
                Err(join_err) => {
                    error!(error = %join_err, "Worker task failed");
                    crashed.get_or_insert_with(|| join_err.to_string());
                }
            }
        }

        if let Some(err) = fatal {
            return Err(self.abort(&identity, err.into()).await);
        }
        if let Some(reason) = crashed {
            return Err(self
                .abort(&identity, RunError::Internal(format!("worker task failed: {reason}")))
                .await);
        }

        let summary = collector.finish(token.reason());
        if let Some(reason) = &summary.abort_reason {
            warn!(reason = %reason, not_started = summary.not_started.len(), "Run aborted by policy");
            self.events
                .emit(&RunEvent::RunAborted {
                    run_id: identity.run_id,
                    reason: reason.clone(),
                })
                .await;
        }
        self.events
            .emit(&RunEvent::RunCompleted {
                run_id: identity.run_id,
                completed: summary.completed,
                skipped: summary.skipped(),
                failed: summary.failed(),
                not_started: summary.not_started.len(),
            })
            .await;
        info!(
            total = summary.total_files,
            completed = summary.completed,
            skipped = summary.skipped(),
            failed = summary.failed(),
            not_started = summary.not_started.len(),
            "Run finished"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("stages", &self.chain.enabled_names())
            .field("selectors", &self.selectors.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("policy", &self.policy)
            .field("concurrency", &self.concurrency)
            .field("resources", &self.resources)
            .finish()
    }
}

/// Everything one file task needs, cloned per dispatch.
#[derive(Clone)]
struct Worker {
    chain: Arc<StageChain>,
    resources: Arc<ResourcePool>,
    writer: Arc<dyn ProductWriter>,
    events: Arc<dyn EventSink>,
    token: Arc<CancellationToken>,
    policy: RunPolicy,
    run_id: Uuid,
}

impl Worker {
    async fn process(self, file: FileId, _permit: OwnedSemaphorePermit) -> Result<FileReport, ResourceLoadError> {
        let started = Instant::now();
        let ctx = self.chain.new_context(file.clone());

        let (ctx, mut outcome) = match self.chain.run(ctx, &self.resources).await {
            Ok(done) => done,
            Err(err) => {
                self.token
                    .cancel(format!("shared resource '{}' unavailable", err.name()));
                return Err(err);
            }
        };

        if outcome.is_completed() {
            let written = AssertUnwindSafe(self.writer.write(&ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(StageError::Panicked(panic_message(&*payload))));
            if let Err(err) = written {
                outcome = Outcome::failed(PRODUCT_WRITER, &err);
            }
        }

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.report(&file, &outcome, duration_ms).await;

        Ok(FileReport {
            file,
            outcome,
            duration_ms,
            fingerprint: ctx.fingerprint(),
        })
    }

    async fn report(&self, file: &FileId, outcome: &Outcome, duration_ms: f64) {
        let event = match outcome {
            Outcome::Completed => {
                debug!(duration_ms, "File completed");
                RunEvent::FileCompleted {
                    run_id: self.run_id,
                    file: file.path.clone(),
                    duration_ms,
                }
            }
            Outcome::SkippedAtStage { stage, reason } => {
                debug!(stage = %stage, reason = %reason, "File skipped");
                RunEvent::FileSkipped {
                    run_id: self.run_id,
                    file: file.path.clone(),
                    stage: stage.clone(),
                    reason: reason.clone(),
                }
            }
            Outcome::Failed { stage, error } => {
                warn!(stage = %stage, kind = %error.kind, error = %error.message, "File failed");
                if self.policy.aborts_on_failure() {
                    self.token.cancel(format!("{} failed at {stage}: {}", file.file_name(), error.message));
                }
                RunEvent::FileFailed {
                    run_id: self.run_id,
                    file: file.path.clone(),
                    stage: stage.clone(),
                    kind: error.kind.clone(),
                    message: error.message.clone(),
                }
            }
        };
        self.events.emit(&event).await;
    }
}
