//! Resource loaders.

use super::{Dataset, RasterGrid, SharedDataset, UncertaintyTable};
use crate::errors::ResourceLoadError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Loads one reference dataset.
///
/// Called at most once per name per run by the [`super::ResourcePool`].
#[async_trait]
pub trait ResourceLoader: Send + Sync + Debug {
    /// Loads the dataset registered as `name`, resolving relative paths
    /// against `root`.
    async fn load(&self, name: &str, root: &Path) -> Result<SharedDataset, ResourceLoadError>;
}

/// Kinds of dataset that can be declared in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// A [`RasterGrid`] (DEMs, masks, basin ids).
    RasterGrid,
    /// An [`UncertaintyTable`].
    UncertaintyTable,
}

impl DatasetKind {
    /// Creates a JSON loader for this kind of dataset.
    #[must_use]
    pub fn loader(self, path: impl Into<PathBuf>) -> Arc<dyn ResourceLoader> {
        match self {
            Self::RasterGrid => Arc::new(JsonDatasetLoader::<RasterGrid>::new(path)),
            Self::UncertaintyTable => Arc::new(JsonDatasetLoader::<UncertaintyTable>::new(path)),
        }
    }
}

/// Loads a JSON-encoded dataset of type `T` and validates it.
pub struct JsonDatasetLoader<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDatasetLoader<T> {
    /// Creates a loader for the file at `path` (relative to the pool root,
    /// or absolute).
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }
}

impl<T> Debug for JsonDatasetLoader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonDatasetLoader")
            .field("path", &self.path)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

#[async_trait]
impl<T> ResourceLoader for JsonDatasetLoader<T>
where
    T: Dataset + DeserializeOwned + Send + Sync + 'static,
{
    async fn load(&self, name: &str, root: &Path) -> Result<SharedDataset, ResourceLoadError> {
        let path = root.join(&self.path);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ResourceLoadError::NotFound {
                    name: name.to_string(),
                    path,
                });
            }
            Err(e) => return Err(ResourceLoadError::failed(name, e.to_string())),
        };
        debug!(resource = %name, path = %path.display(), bytes = bytes.len(), "Decoding dataset");

        let dataset: T = tokio::task::spawn_blocking(move || serde_json::from_slice::<T>(&bytes))
            .await
            .map_err(|e| ResourceLoadError::failed(name, e.to_string()))?
            .map_err(|e| ResourceLoadError::failed(name, format!("invalid {}: {e}", T::KIND)))?;

        dataset
            .validate()
            .map_err(|reason| ResourceLoadError::failed(name, reason))?;

        Ok(Arc::new(dataset))
    }
}

/// Loader backed by a blocking closure, for datasets built in code.
pub struct FnLoader<F, T> {
    func: Arc<F>,
    _marker: PhantomData<fn() -> T>,
}

impl<F, T> FnLoader<F, T>
where
    F: Fn(&Path) -> Result<T, ResourceLoadError> + Send + Sync + 'static,
    T: Any + Send + Sync,
{
    /// Creates a loader from a closure receiving the pool root.
    pub fn new(func: F) -> Self {
        Self {
            func: Arc::new(func),
            _marker: PhantomData,
        }
    }
}

impl<F, T> Debug for FnLoader<F, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnLoader")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

#[async_trait]
impl<F, T> ResourceLoader for FnLoader<F, T>
where
    F: Fn(&Path) -> Result<T, ResourceLoadError> + Send + Sync + 'static,
    T: Any + Send + Sync,
{
    async fn load(&self, name: &str, root: &Path) -> Result<SharedDataset, ResourceLoadError> {
        let func = self.func.clone();
        let root = root.to_path_buf();
        let dataset = tokio::task::spawn_blocking(move || func(&root))
            .await
            .map_err(|e| ResourceLoadError::failed(name, e.to_string()))??;
        Ok(Arc::new(dataset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &str) {
        let mut file = std::fs::File::create(dir.path().join(name)).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn test_json_loader_reads_grid() {
        let dir = TempDir::new().unwrap();
        write_file(
            &dir,
            "dem.json",
            r#"{"x_min":0.0,"y_max":2.0,"cell_size":1.0,"ncols":2,"nrows":2,"nodata":-9999.0,"values":[1.0,2.0,3.0,-9999.0]}"#,
        );

        let loader = DatasetKind::RasterGrid.loader("dem.json");
        let loaded = loader.load("dem:test", dir.path()).await.unwrap();
        let grid = loaded.downcast::<RasterGrid>().unwrap();
        assert_eq!(grid.value_at(0.5, 1.5), Some(1.0));
        assert_eq!(grid.value_at(1.5, 0.5), None);
    }

    #[tokio::test]
    async fn test_json_loader_missing_file() {
        let dir = TempDir::new().unwrap();
        let loader = JsonDatasetLoader::<RasterGrid>::new("missing/dem.json");

        let err = loader.load("dem:antarctica", dir.path()).await.unwrap_err();
        assert!(matches!(err, ResourceLoadError::NotFound { ref name, .. } if name == "dem:antarctica"));
    }

    #[tokio::test]
    async fn test_json_loader_rejects_invalid_dataset() {
        let dir = TempDir::new().unwrap();
        write_file(
            &dir,
            "unc.json",
            r#"{"min_slope":1.0,"max_slope":0.0,"values":[0.1]}"#,
        );

        let loader = DatasetKind::UncertaintyTable.loader("unc.json");
        let err = loader.load("unc:greenland", dir.path()).await.unwrap_err();
        assert!(matches!(err, ResourceLoadError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_json_loader_rejects_malformed_json() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "unc.json", "{not json");

        let loader = DatasetKind::UncertaintyTable.loader("unc.json");
        let err = loader.load("unc:greenland", dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("invalid uncertainty_table"));
    }
}
