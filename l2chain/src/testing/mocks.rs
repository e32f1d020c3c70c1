//! Mock stages and selectors for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::context::{FieldContract, FieldValue, FileContext};
use crate::core::FileId;
use crate::errors::{SelectorError, StageError};
use crate::output::ProductWriter;
use crate::resources::ResourcePool;
use crate::selectors::{FileSelector, SelectorQuery};
use crate::stages::{Stage, StageResult};

/// Shared log of `stage` or `stage:file` entries, in call order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// A stage that appends its name to a shared log and continues.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    log: CallLog,
    with_file: bool,
}

impl RecordingStage {
    /// Creates a stage logging `name` on every call.
    #[must_use]
    pub fn new(name: impl Into<String>, log: CallLog) -> Self {
        Self {
            name: name.into(),
            log,
            with_file: false,
        }
    }

    /// Creates a stage logging `name:file_name` on every call.
    #[must_use]
    pub fn with_file(name: impl Into<String>, log: CallLog) -> Self {
        Self {
            with_file: true,
            ..Self::new(name, log)
        }
    }

    /// Creates an empty log.
    #[must_use]
    pub fn new_log() -> CallLog {
        Arc::new(Mutex::new(Vec::new()))
    }

    /// Returns a copy of the log.
    #[must_use]
    pub fn calls(log: &CallLog) -> Vec<String> {
        log.lock().clone()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, ctx: &mut FileContext, _resources: &ResourcePool) -> StageResult {
        let entry = if self.with_file {
            format!("{}:{}", self.name, ctx.file().file_name())
        } else {
            self.name.clone()
        };
        self.log.lock().push(entry);
        StageResult::Continue
    }
}

/// A stage that skips every file with a fixed reason.
#[derive(Debug)]
pub struct SkippingStage {
    name: String,
    reason: String,
}

impl SkippingStage {
    /// Creates a new skipping stage.
    #[must_use]
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Stage for SkippingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, _ctx: &mut FileContext, _resources: &ResourcePool) -> StageResult {
        StageResult::skip(self.reason.clone())
    }
}

/// A stage that fails, on every file or on files whose name contains a
/// pattern.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    error: StageError,
    only_for: Option<String>,
}

impl FailingStage {
    /// Creates a stage failing every file with `error`.
    #[must_use]
    pub fn new(name: impl Into<String>, error: StageError) -> Self {
        Self {
            name: name.into(),
            error,
            only_for: None,
        }
    }

    /// Restricts failures to files whose name contains `pattern`; other
    /// files continue.
    #[must_use]
    pub fn only_for(mut self, pattern: impl Into<String>) -> Self {
        self.only_for = Some(pattern.into());
        self
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, ctx: &mut FileContext, _resources: &ResourcePool) -> StageResult {
        match &self.only_for {
            Some(pattern) if !ctx.file().file_name().contains(pattern.as_str()) => StageResult::Continue,
            _ => StageResult::Fail(self.error.clone()),
        }
    }
}

/// A stage that writes one field and declares it in its contract.
#[derive(Debug)]
pub struct FieldWriterStage {
    name: String,
    key: String,
    value: FieldValue,
}

impl FieldWriterStage {
    /// Creates a stage writing `value` to `key`.
    #[must_use]
    pub fn new(name: impl Into<String>, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl Stage for FieldWriterStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn contract(&self) -> FieldContract {
        FieldContract::new().writes([self.key.clone()])
    }

    async fn apply(&self, ctx: &mut FileContext, _resources: &ResourcePool) -> StageResult {
        match ctx.put(self.key.clone(), self.value.clone()) {
            Ok(()) => StageResult::Continue,
            Err(e) => StageResult::fail(e),
        }
    }
}

/// A stage that sleeps and tracks how many calls overlap.
#[derive(Debug)]
pub struct SlowStage {
    name: String,
    delay: Duration,
    fast_for: Option<String>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowStage {
    /// Creates a stage sleeping `ms` milliseconds per file.
    #[must_use]
    pub fn with_delay_ms(name: impl Into<String>, ms: u64) -> Self {
        Self {
            name: name.into(),
            delay: Duration::from_millis(ms),
            fast_for: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Files whose name contains `pattern` pass through without sleeping.
    #[must_use]
    pub fn fast_for(mut self, pattern: impl Into<String>) -> Self {
        self.fast_for = Some(pattern.into());
        self
    }

    /// Returns the largest number of files seen inside the stage at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, ctx: &mut FileContext, _resources: &ResourcePool) -> StageResult {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let fast = self
            .fast_for
            .as_deref()
            .is_some_and(|pattern| ctx.file().file_name().contains(pattern));
        if !fast {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        StageResult::Continue
    }
}

/// A stage that declares one shared dataset and fetches it on every call.
#[derive(Debug)]
pub struct ResourceReaderStage {
    name: String,
    resource: String,
}

impl ResourceReaderStage {
    /// Creates a stage using the dataset registered as `resource`.
    #[must_use]
    pub fn new(name: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource: resource.into(),
        }
    }
}

#[async_trait]
impl Stage for ResourceReaderStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn resources(&self) -> Vec<String> {
        vec![self.resource.clone()]
    }

    async fn apply(&self, _ctx: &mut FileContext, resources: &ResourcePool) -> StageResult {
        match resources.get_shared(&self.resource).await {
            Ok(_) => StageResult::Continue,
            Err(e) => StageResult::fail(e),
        }
    }
}

/// A product writer that panics on files whose name contains a pattern and
/// counts the products it accepts.
#[derive(Debug)]
pub struct PanickingProductWriter {
    pattern: String,
    written: AtomicUsize,
}

impl PanickingProductWriter {
    /// Creates a writer panicking on files matching `pattern`.
    #[must_use]
    pub fn for_files(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            written: AtomicUsize::new(0),
        }
    }

    /// Returns how many products were written.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductWriter for PanickingProductWriter {
    async fn write(&self, ctx: &FileContext) -> Result<(), StageError> {
        let name = ctx.file().file_name();
        if name.contains(self.pattern.as_str()) {
            panic!("product writer crashed on {name}");
        }
        self.written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A selector returning a fixed list, or failing as unreachable.
#[derive(Debug, Clone)]
pub struct StaticSelector {
    name: String,
    files: Vec<FileId>,
    unreachable: Option<PathBuf>,
    calls: Arc<AtomicUsize>,
}

impl StaticSelector {
    /// Creates a selector returning `files` for any query.
    #[must_use]
    pub fn new(name: impl Into<String>, files: Vec<FileId>) -> Self {
        Self {
            name: name.into(),
            files,
            unreachable: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a selector whose source cannot be reached.
    #[must_use]
    pub fn unreachable(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            unreachable: Some(path.into()),
            ..Self::new(name, Vec::new())
        }
    }

    /// Returns how many times the selector was queried.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FileSelector for StaticSelector {
    fn name(&self) -> &str {
        &self.name
    }

    fn select(&self, query: &SelectorQuery) -> Result<Vec<FileId>, SelectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        query.validate(&self.name)?;
        if let Some(path) = &self.unreachable {
            return Err(SelectorError::SourceUnreachable {
                selector: self.name.clone(),
                path: path.clone(),
                reason: "directory not found".to_string(),
            });
        }
        Ok(self.files.clone())
    }
}
