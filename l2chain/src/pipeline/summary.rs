//! Run summaries.

use super::RunPolicy;
use crate::context::RunIdentity;
use crate::core::{FileId, Outcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Terminal outcome of one dispatched file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    /// The input file.
    pub file: FileId,
    /// Its terminal outcome.
    pub outcome: Outcome,
    /// Wall time spent on the chain and the product writer.
    pub duration_ms: f64,
    /// Fingerprint of the terminal field mapping.
    pub fingerprint: String,
}

/// Aggregated result of a run that was not terminated by a fatal error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run identity.
    pub identity: RunIdentity,
    /// When the last file finished.
    pub finished_at: DateTime<Utc>,
    /// Policy the run used.
    pub policy: RunPolicy,
    /// Enabled stages in chain order.
    pub stages: Vec<String>,
    /// Number of files selected.
    pub total_files: usize,
    /// Files that completed every stage.
    pub completed: usize,
    /// Skipped files, by reason.
    pub skipped_by_reason: BTreeMap<String, usize>,
    /// Failed files, by error kind.
    pub failed_by_kind: BTreeMap<String, usize>,
    /// Failed files, by failing stage.
    pub failed_by_stage: BTreeMap<String, usize>,
    /// Every dispatched file, sorted by path.
    pub files: Vec<FileReport>,
    /// Files never dispatched because the run was aborted.
    pub not_started: Vec<FileId>,
    /// Why dispatch stopped early, if it did.
    pub abort_reason: Option<String>,
}

impl RunSummary {
    /// Returns the number of skipped files.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped_by_reason.values().sum()
    }

    /// Returns the number of failed files.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed_by_kind.values().sum()
    }

    /// Returns true if the abort policy stopped dispatch.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort_reason.is_some()
    }

    /// Returns the report for a file path.
    #[must_use]
    pub fn report(&self, path: impl AsRef<Path>) -> Option<&FileReport> {
        let path = path.as_ref();
        self.files.iter().find(|r| r.file.path() == path)
    }

    /// Returns the outcome of a file path.
    #[must_use]
    pub fn outcome_of(&self, path: impl AsRef<Path>) -> Option<&Outcome> {
        self.report(path).map(|r| &r.outcome)
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Run {}: {} files, {} completed, {} skipped, {} failed, {} not started",
            self.identity.run_id,
            self.total_files,
            self.completed,
            self.skipped(),
            self.failed(),
            self.not_started.len()
        )?;
        for (reason, n) in &self.skipped_by_reason {
            writeln!(f, "  skipped ({reason}): {n}")?;
        }
        for (kind, n) in &self.failed_by_kind {
            writeln!(f, "  failed ({kind}): {n}")?;
        }
        for report in self.files.iter().filter(|r| r.outcome.is_failed()) {
            writeln!(f, "  {}: {}", report.file.file_name(), report.outcome)?;
        }
        if let Some(reason) = &self.abort_reason {
            writeln!(f, "  aborted: {reason}")?;
        }
        Ok(())
    }
}

/// Accumulates file reports while a run is in progress.
#[derive(Debug)]
pub(crate) struct SummaryCollector {
    identity: RunIdentity,
    policy: RunPolicy,
    stages: Vec<String>,
    total_files: usize,
    reports: Vec<FileReport>,
    not_started: Vec<FileId>,
}

impl SummaryCollector {
    pub(crate) fn new(identity: RunIdentity, policy: RunPolicy, stages: Vec<String>, total_files: usize) -> Self {
        Self {
            identity,
            policy,
            stages,
            total_files,
            reports: Vec::with_capacity(total_files),
            not_started: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, report: FileReport) {
        self.reports.push(report);
    }

    pub(crate) fn not_started(&mut self, file: FileId) {
        self.not_started.push(file);
    }

    pub(crate) fn finish(mut self, abort_reason: Option<String>) -> RunSummary {
        self.reports.sort_by(|a, b| a.file.cmp(&b.file));
        self.not_started.sort();

        let mut completed = 0;
        let mut skipped_by_reason = BTreeMap::new();
        let mut failed_by_kind = BTreeMap::new();
        let mut failed_by_stage = BTreeMap::new();
        for report in &self.reports {
            match &report.outcome {
                Outcome::Completed => completed += 1,
                Outcome::SkippedAtStage { reason, .. } => {
                    *skipped_by_reason.entry(reason.clone()).or_insert(0) += 1;
                }
                Outcome::Failed { stage, error } => {
                    *failed_by_kind.entry(error.kind.clone()).or_insert(0) += 1;
                    *failed_by_stage.entry(stage.clone()).or_insert(0) += 1;
                }
            }
        }

        RunSummary {
            identity: self.identity,
            finished_at: Utc::now(),
            policy: self.policy,
            stages: self.stages,
            total_files: self.total_files,
            completed,
            skipped_by_reason,
            failed_by_kind,
            failed_by_stage,
            files: self.reports,
            not_started: self.not_started,
            abort_reason,
        }
    }
}
