//! Product writers: receive every completed context.
//!
//! The product format is the writer's concern. A writer error marks the
//! file as failed at the `product_writer` step.

use crate::context::{FieldStore, FileContext};
use crate::core::FileId;
use crate::errors::StageError;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Debug;
use std::path::PathBuf;
use tracing::debug;

/// Name under which writer failures are recorded in outcomes.
pub const PRODUCT_WRITER: &str = "product_writer";

/// Receives each completed context.
#[async_trait]
pub trait ProductWriter: Send + Sync + Debug {
    /// Writes the product for one completed file.
    async fn write(&self, ctx: &FileContext) -> Result<(), StageError>;
}

/// Discards every product.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProductWriter;

#[async_trait]
impl ProductWriter for NoOpProductWriter {
    async fn write(&self, _ctx: &FileContext) -> Result<(), StageError> {
        Ok(())
    }
}

/// Keeps the terminal field mapping of every completed file in memory.
#[derive(Debug, Default)]
pub struct CollectingProductWriter {
    products: parking_lot::Mutex<Vec<(FileId, FieldStore)>>,
}

impl CollectingProductWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collected products sorted by file.
    #[must_use]
    pub fn products(&self) -> Vec<(FileId, FieldStore)> {
        let mut products = self.products.lock().clone();
        products.sort_by(|a, b| a.0.cmp(&b.0));
        products
    }

    /// Returns the number of collected products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.products.lock().len()
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.lock().is_empty()
    }
}

#[async_trait]
impl ProductWriter for CollectingProductWriter {
    async fn write(&self, ctx: &FileContext) -> Result<(), StageError> {
        self.products
            .lock()
            .push((ctx.file().clone(), ctx.fields().clone()));
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonProduct<'a> {
    file: &'a FileId,
    fingerprint: String,
    fields: &'a FieldStore,
}

/// Writes each product as `<output_dir>/<input file stem>.json`.
#[derive(Debug, Clone)]
pub struct JsonProductWriter {
    output_dir: PathBuf,
}

impl JsonProductWriter {
    /// Creates a writer targeting `output_dir`. The directory is created on
    /// first write.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl ProductWriter for JsonProductWriter {
    async fn write(&self, ctx: &FileContext) -> Result<(), StageError> {
        let stem = ctx
            .file()
            .path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| StageError::InvalidInput(format!("no file name in {}", ctx.file())))?;
        let product = JsonProduct {
            file: ctx.file(),
            fingerprint: ctx.fingerprint(),
            fields: ctx.fields(),
        };
        let bytes = serde_json::to_vec_pretty(&product).map_err(|e| StageError::Other(e.to_string()))?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(format!("{stem}.json"));
        tokio::fs::write(&path, bytes).await?;
        debug!(file = %ctx.file(), product = %path.display(), "Product written");
        Ok(())
    }
}
