//! The run-lifetime pool of shared reference datasets.

use super::ResourceLoader;
use crate::errors::ResourceLoadError;
use futures::future::try_join_all;
use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use parking_lot::RwLock;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

/// A loaded dataset, type-erased so one pool can hold any dataset type.
pub type SharedDataset = Arc<dyn Any + Send + Sync>;

type LoadCell = OnceCell<Result<SharedDataset, ResourceLoadError>>;

struct PoolEntry {
    loader: Arc<dyn ResourceLoader>,
    // Failures are memoised too: the loader runs at most once per run.
    // `reset_failed` swaps in a fresh cell between runs.
    cell: RwLock<Arc<LoadCell>>,
}

impl PoolEntry {
    fn current(&self) -> Arc<LoadCell> {
        self.cell.read().clone()
    }

    fn is_loaded(&self) -> bool {
        self.current().get().is_some_and(Result::is_ok)
    }
}

/// Builder for a [`ResourcePool`].
#[derive(Default)]
pub struct ResourcePoolBuilder {
    root: PathBuf,
    entries: HashMap<String, Arc<dyn ResourceLoader>>,
}

impl ResourcePoolBuilder {
    /// Registers a loader under a logical name such as `"dem:antarctica"`.
    ///
    /// Registering the same name twice replaces the earlier loader.
    #[must_use]
    pub fn register(mut self, name: impl Into<String>, loader: Arc<dyn ResourceLoader>) -> Self {
        self.entries.insert(name.into(), loader);
        self
    }

    /// Builds the pool. No dataset is loaded yet.
    #[must_use]
    pub fn build(self) -> ResourcePool {
        let entries = self
            .entries
            .into_iter()
            .map(|(name, loader)| {
                (
                    name,
                    PoolEntry {
                        loader,
                        cell: RwLock::new(Arc::new(OnceCell::new())),
                    },
                )
            })
            .collect();
        ResourcePool {
            root: self.root,
            entries,
        }
    }
}

/// Reference datasets shared read-only by every worker of a run.
///
/// The set of names is fixed when the pool is built, so lookups never take a
/// lock. Each dataset sits behind a one-time-initialisation cell: the first
/// accessor runs the loader, concurrent first accessors wait for that single
/// load, and every later read is lock-free.
pub struct ResourcePool {
    root: PathBuf,
    entries: HashMap<String, PoolEntry>,
}

impl ResourcePool {
    /// Starts a pool whose loaders resolve relative paths against `root`.
    #[must_use]
    pub fn builder(root: impl Into<PathBuf>) -> ResourcePoolBuilder {
        ResourcePoolBuilder {
            root: root.into(),
            entries: HashMap::new(),
        }
    }

    /// A pool with no datasets.
    #[must_use]
    pub fn empty() -> Self {
        ResourcePoolBuilder::default().build()
    }

    /// Returns the lookup root for dataset paths.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns true if a loader is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns true once `name` has loaded successfully.
    #[must_use]
    pub fn is_loaded(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(PoolEntry::is_loaded)
    }

    /// Returns the number of datasets loaded successfully so far.
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_loaded()).count()
    }

    /// Returns a dataset, loading it on first access.
    ///
    /// # Errors
    ///
    /// Returns `ResourceLoadError::Unknown` for unregistered names, or the
    /// (memoised) loader error.
    pub async fn get_shared(&self, name: &str) -> Result<SharedDataset, ResourceLoadError> {
        let entry = self.entries.get(name).ok_or_else(|| ResourceLoadError::Unknown {
            name: name.to_string(),
        })?;

        let cell = entry.current();
        let result = cell
            .get_or_init(|| async {
                info!(resource = %name, root = %self.root.display(), "Loading shared resource");
                let started = Instant::now();
                let loaded = entry.loader.load(name, &self.root).await;
                match &loaded {
                    Ok(_) => info!(
                        resource = %name,
                        duration_ms = started.elapsed().as_secs_f64() * 1000.0,
                        "Shared resource loaded"
                    ),
                    Err(e) => error!(resource = %name, error = %e, "Shared resource failed to load"),
                }
                loaded
            })
            .await;

        result.clone()
    }

    /// Returns a dataset downcast to its concrete type.
    ///
    /// # Errors
    ///
    /// As [`ResourcePool::get_shared`], plus `ResourceLoadError::TypeMismatch`
    /// when the loaded dataset is not a `T`.
    pub async fn get<T>(&self, name: &str) -> Result<Arc<T>, ResourceLoadError>
    where
        T: Any + Send + Sync,
    {
        let shared = self.get_shared(name).await?;
        shared.downcast::<T>().map_err(|_| ResourceLoadError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<T>(),
        })
    }

    /// Returns an already loaded dataset without triggering a load.
    #[must_use]
    pub fn try_get<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let cell = self.entries.get(name)?.current();
        let shared = cell.get()?.as_ref().ok()?.clone();
        shared.downcast::<T>().ok()
    }

    /// Forgets every memoised load failure so the next access retries.
    /// Successfully loaded datasets are kept. Returns the number of
    /// datasets reset.
    ///
    /// The orchestrator calls this at the start of each run.
    pub fn reset_failed(&self) -> usize {
        let mut reset = 0;
        for (name, entry) in &self.entries {
            let mut cell = entry.cell.write();
            if matches!(cell.get(), Some(Err(_))) {
                debug!(resource = %name, "Clearing failed load");
                *cell = Arc::new(OnceCell::new());
                reset += 1;
            }
        }
        reset
    }

    /// Loads every named dataset concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first load error encountered.
    pub async fn preload<I, S>(&self, names: I) -> Result<(), ResourceLoadError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
        debug!(count = names.len(), "Preloading shared resources");
        try_join_all(names.iter().map(|n| self.get_shared(n))).await?;
        Ok(())
    }
}

impl std::fmt::Debug for ResourcePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("root", &self.root)
            .field("names", &self.names())
            .field("loaded", &self.loaded_count())
            .finish()
    }
}
