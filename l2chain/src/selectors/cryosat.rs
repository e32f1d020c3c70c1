//! Directory-scanning selector for CryoSat-2 L1b archives.

use super::{FileSelector, L1bFileName, SelectorQuery};
use crate::core::{FileId, InstrumentMode};
use crate::errors::SelectorError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Finds L1b files of one instrument mode.
///
/// The archive is laid out as `<base>/<MODE>/<YYYY>/<MM>/CS_*.nc`. With flat
/// search, files are taken directly from `<base>`.
#[derive(Debug, Clone)]
pub struct CryoSatFileSelector {
    name: String,
    mode: InstrumentMode,
    base_dir: PathBuf,
    baselines: Vec<char>,
    flat_search: bool,
}

impl CryoSatFileSelector {
    /// Creates a selector named `name` for `mode`.
    #[must_use]
    pub fn new(name: impl Into<String>, mode: InstrumentMode, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            mode,
            base_dir: base_dir.into(),
            baselines: Vec::new(),
            flat_search: false,
        }
    }

    /// The `find_lrm` selector.
    #[must_use]
    pub fn find_lrm(base_dir: impl Into<PathBuf>) -> Self {
        Self::new("find_lrm", InstrumentMode::LowResolution, base_dir)
    }

    /// The `find_sin` selector.
    #[must_use]
    pub fn find_sin(base_dir: impl Into<PathBuf>) -> Self {
        Self::new("find_sin", InstrumentMode::Interferometric, base_dir)
    }

    /// Restricts results to the given baseline letters. Empty accepts all.
    #[must_use]
    pub fn with_baselines(mut self, baselines: impl IntoIterator<Item = char>) -> Self {
        self.baselines = baselines.into_iter().map(|c| c.to_ascii_uppercase()).collect();
        self
    }

    /// Searches `base_dir` directly instead of the mode/year/month tree.
    #[must_use]
    pub fn with_flat_search(mut self, flat: bool) -> Self {
        self.flat_search = flat;
        self
    }

    /// Returns the instrument mode this selector finds.
    #[must_use]
    pub fn mode(&self) -> InstrumentMode {
        self.mode
    }

    fn search_dirs(&self, query: &SelectorQuery) -> Vec<PathBuf> {
        if self.flat_search {
            return vec![self.base_dir.clone()];
        }
        query
            .months()
            .into_iter()
            .map(|(year, month)| {
                self.base_dir
                    .join(self.mode.code())
                    .join(format!("{year:04}"))
                    .join(format!("{month:02}"))
            })
            .collect()
    }

    fn accepts(&self, name: &L1bFileName, query: &SelectorQuery) -> bool {
        name.mode() == Some(self.mode)
            && (self.baselines.is_empty() || self.baselines.contains(&name.baseline))
            && query.contains(name.start_date())
    }

    fn unreachable(&self, path: &Path, reason: impl ToString) -> SelectorError {
        SelectorError::SourceUnreachable {
            selector: self.name.clone(),
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    fn scan_dir(&self, dir: &Path, query: &SelectorQuery, out: &mut Vec<FileId>) -> Result<(), SelectorError> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(selector = %self.name, dir = %dir.display(), "No directory for month");
                return Ok(());
            }
            Err(e) => return Err(self.unreachable(dir, e)),
        };

        let before = out.len();
        for entry in entries {
            let entry = entry.map_err(|e| self.unreachable(dir, e))?;
            let file_name = entry.file_name();
            let Some(parsed) = file_name.to_str().and_then(L1bFileName::parse) else {
                continue;
            };
            if self.accepts(&parsed, query) {
                out.push(FileId::new(entry.path(), self.mode));
            }
        }
        debug!(
            selector = %self.name,
            dir = %dir.display(),
            found = out.len() - before,
            "Scanned directory"
        );
        Ok(())
    }
}

impl FileSelector for CryoSatFileSelector {
    fn name(&self) -> &str {
        &self.name
    }

    fn select(&self, query: &SelectorQuery) -> Result<Vec<FileId>, SelectorError> {
        query.validate(&self.name)?;

        match std::fs::metadata(&self.base_dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(self.unreachable(&self.base_dir, "not a directory")),
            Err(e) => return Err(self.unreachable(&self.base_dir, e)),
        }

        let mut files = Vec::new();
        for dir in self.search_dirs(query) {
            self.scan_dir(&dir, query, &mut files)?;
        }
        files.sort_by_key(FileId::file_name);

        info!(
            selector = %self.name,
            mode = %self.mode,
            start = %query.start,
            end = %query.end,
            count = files.len(),
            "Selected L1b files"
        );
        Ok(files)
    }
}
