//! Chain builder with validation.

use super::{StageChain, StageSpec};
use crate::errors::{ChainValidationError, ContractErrorInfo};
use crate::stages::Stage;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// Builder for creating validated stage chains.
///
/// Stages keep the order in which they are added. Disabled stages are
/// recorded so that contract errors can point at them, but they never run.
#[derive(Debug, Clone)]
pub struct ChainBuilder {
    stages: Vec<StageSpec>,
    seeded: BTreeSet<String>,
    enforce_contracts: bool,
}

impl Default for ChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainBuilder {
    /// Creates an empty builder with contract enforcement on.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            seeded: BTreeSet::new(),
            enforce_contracts: true,
        }
    }

    /// Appends an enabled stage.
    #[must_use]
    pub fn stage(self, stage: Arc<dyn Stage>) -> Self {
        self.add(stage, true)
    }

    /// Appends a disabled stage.
    #[must_use]
    pub fn disabled_stage(self, stage: Arc<dyn Stage>) -> Self {
        self.add(stage, false)
    }

    /// Appends a stage with an explicit enable flag.
    #[must_use]
    pub fn add(mut self, stage: Arc<dyn Stage>, enabled: bool) -> Self {
        let ordinal = self.stages.len();
        self.stages.push(StageSpec::new(stage, enabled, ordinal));
        self
    }

    /// Declares fields present in every context before the first stage.
    #[must_use]
    pub fn seeded_fields(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.seeded.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Turns runtime contract enforcement on or off.
    #[must_use]
    pub fn enforce_contracts(mut self, enforce: bool) -> Self {
        self.enforce_contracts = enforce;
        self
    }

    /// Returns the number of configured stages, enabled or not.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Validates the configuration and builds the chain.
    ///
    /// # Errors
    ///
    /// - `CHAIN-DUPLICATE` when a stage name appears twice
    /// - `CHAIN-EMPTY` when no stage is enabled
    /// - `CHAIN-MISSING-FIELD` when an enabled stage requires a field that no
    ///   earlier enabled stage writes
    pub fn build(self) -> Result<StageChain, ChainValidationError> {
        self.check_duplicates()?;

        if !self.stages.iter().any(|s| s.descriptor.enabled) {
            return Err(ChainValidationError::new(
                "Chain has no enabled stages",
                ContractErrorInfo::new("CHAIN-EMPTY", "Cannot run an empty chain")
                    .with_fix_hint("Enable at least one stage in the algorithms list."),
            )
            .with_stages(self.stages.iter().map(|s| s.name().to_string()).collect()));
        }

        self.check_field_contracts()?;

        Ok(StageChain::new(self.stages, self.enforce_contracts))
    }

    fn check_duplicates(&self) -> Result<(), ChainValidationError> {
        let mut seen = HashSet::new();
        for spec in &self.stages {
            if !seen.insert(spec.name()) {
                return Err(ChainValidationError::new(
                    format!("Stage '{}' is configured more than once", spec.name()),
                    ContractErrorInfo::new("CHAIN-DUPLICATE", "Duplicate stage name")
                        .with_fix_hint("List each stage once in the algorithms list.")
                        .with_context_entry("stage", spec.name()),
                )
                .with_stages(vec![spec.name().to_string()]));
            }
        }
        Ok(())
    }

    fn check_field_contracts(&self) -> Result<(), ChainValidationError> {
        let mut available = self.seeded.clone();

        for (position, spec) in self.stages.iter().enumerate() {
            if !spec.descriptor.enabled {
                continue;
            }
            for field in &spec.contract.reads {
                if !available.contains(field) {
                    return Err(self.missing_field(position, spec, field));
                }
            }
            available.extend(spec.contract.writes.iter().cloned());
        }
        Ok(())
    }

    fn missing_field(&self, position: usize, spec: &StageSpec, field: &str) -> ChainValidationError {
        let earlier_disabled = self.stages[..position]
            .iter()
            .find(|s| !s.descriptor.enabled && s.contract.writes.contains(field));
        let later = self.stages[position + 1..]
            .iter()
            .find(|s| s.descriptor.enabled && s.contract.writes.contains(field));

        let (hint, stages) = match (earlier_disabled, later) {
            (Some(producer), _) => (
                format!("Enable stage '{}', which writes '{field}'.", producer.name()),
                vec![spec.name().to_string(), producer.name().to_string()],
            ),
            (None, Some(producer)) => (
                format!(
                    "Move stage '{}', which writes '{field}', before '{}'.",
                    producer.name(),
                    spec.name()
                ),
                vec![spec.name().to_string(), producer.name().to_string()],
            ),
            (None, None) => (
                format!("Add a stage that writes '{field}' before '{}'.", spec.name()),
                vec![spec.name().to_string()],
            ),
        };

        ChainValidationError::new(
            format!(
                "Stage '{}' reads '{field}' but no earlier enabled stage writes it",
                spec.name()
            ),
            ContractErrorInfo::new("CHAIN-MISSING-FIELD", format!("Field '{field}' is never produced"))
                .with_fix_hint(hint)
                .with_context_entry("stage", spec.name())
                .with_context_entry("field", field),
        )
        .with_stages(stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FieldContract;
    use crate::stages::{FnStage, NoOpStage, StageResult};
    use pretty_assertions::assert_eq;

    fn producer(name: &str, writes: &[&str]) -> Arc<dyn Stage> {
        Arc::new(
            FnStage::new(name, |_ctx| StageResult::Continue)
                .with_contract(FieldContract::new().writes(writes.iter().copied())),
        )
    }

    fn consumer(name: &str, reads: &[&str]) -> Arc<dyn Stage> {
        Arc::new(
            FnStage::new(name, |_ctx| StageResult::Continue)
                .with_contract(FieldContract::new().reads(reads.iter().copied())),
        )
    }

    #[test]
    fn test_valid_chain() {
        let chain = ChainBuilder::new()
            .stage(producer("alg_identify_file", &["instr_mode"]))
            .stage(consumer("alg_skip_on_mode", &["instr_mode"]))
            .build()
            .unwrap();

        assert_eq!(chain.enabled_names(), vec!["alg_identify_file", "alg_skip_on_mode"]);
    }

    #[test]
    fn test_empty_chain() {
        let err = ChainBuilder::new()
            .disabled_stage(Arc::new(NoOpStage::new("alg_identify_file")))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "CHAIN-EMPTY");

        let err = ChainBuilder::new().build().unwrap_err();
        assert_eq!(err.code(), "CHAIN-EMPTY");
    }

    #[test]
    fn test_duplicate_stage() {
        let err = ChainBuilder::new()
            .stage(Arc::new(NoOpStage::new("alg_retrack")))
            .disabled_stage(Arc::new(NoOpStage::new("alg_retrack")))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "CHAIN-DUPLICATE");
        assert_eq!(err.stages, vec!["alg_retrack"]);
    }

    #[test]
    fn test_disabled_producer_is_a_configuration_error() {
        let err = ChainBuilder::new()
            .disabled_stage(producer("alg_waveform_quality", &["waveform_quality"]))
            .stage(consumer("alg_retrack", &["waveform_quality"]))
            .build()
            .unwrap_err();

        assert_eq!(err.code(), "CHAIN-MISSING-FIELD");
        assert_eq!(err.stages, vec!["alg_retrack", "alg_waveform_quality"]);
        assert_eq!(
            err.error_info.fix_hint.as_deref(),
            Some("Enable stage 'alg_waveform_quality', which writes 'waveform_quality'.")
        );
        assert_eq!(err.error_info.context.get("field").map(String::as_str), Some("waveform_quality"));
    }

    #[test]
    fn test_producer_after_consumer() {
        let err = ChainBuilder::new()
            .stage(consumer("alg_retrack", &["waveform_quality"]))
            .stage(producer("alg_waveform_quality", &["waveform_quality"]))
            .build()
            .unwrap_err();

        assert_eq!(err.code(), "CHAIN-MISSING-FIELD");
        assert!(err.error_info.fix_hint.unwrap().starts_with("Move stage 'alg_waveform_quality'"));
    }

    #[test]
    fn test_seeded_fields_satisfy_reads() {
        let chain = ChainBuilder::new()
            .seeded_fields(["orbit_number"])
            .stage(consumer("alg_orbit_check", &["orbit_number"]))
            .build();
        assert!(chain.is_ok());
    }

    #[test]
    fn test_optional_reads_are_not_required() {
        let stage: Arc<dyn Stage> = Arc::new(
            FnStage::new("alg_uncertainty", |_ctx| StageResult::Continue)
                .with_contract(FieldContract::new().optional_reads(["slope"])),
        );
        assert!(ChainBuilder::new().stage(stage).build().is_ok());
    }
}
