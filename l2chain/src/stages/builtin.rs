//! Built-in stages.

use super::{Stage, StageResult};
use crate::context::{FieldContract, FileContext};
use crate::core::InstrumentMode;
use crate::errors::{ConfigError, StageError};
use crate::resources::ResourcePool;
use crate::selectors::L1bFileName;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Identifies an L1b file from its product name.
///
/// Writes `instr_mode` (raw mode code, e.g. "LRM" or "SAR"), `l1b_baseline`,
/// `l1b_version` and `start_time` (ISO 8601, UTC). Fails with
/// `StageError::InvalidInput` when the name is not a CryoSat L1b name.
#[derive(Debug, Clone, Default)]
pub struct IdentifyFileStage;

impl IdentifyFileStage {
    /// Configuration name.
    pub const NAME: &'static str = "alg_identify_file";

    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn identify(ctx: &mut FileContext) -> Result<StageResult, StageError> {
        let file_name = ctx.file().file_name();
        let parsed = L1bFileName::parse(&file_name)
            .ok_or_else(|| StageError::InvalidInput(format!("not a CryoSat-2 L1b file name: {file_name}")))?;

        ctx.put("instr_mode", parsed.mode_code.as_str())?;
        ctx.put("l1b_baseline", parsed.baseline.to_string())?;
        ctx.put("l1b_version", i64::from(parsed.version))?;
        ctx.put("start_time", parsed.start.format("%Y-%m-%dT%H:%M:%S").to_string())?;
        Ok(StageResult::Continue)
    }
}

#[async_trait]
impl Stage for IdentifyFileStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn contract(&self) -> FieldContract {
        FieldContract::new().writes(["instr_mode", "l1b_baseline", "l1b_version", "start_time"])
    }

    async fn apply(&self, ctx: &mut FileContext, _resources: &ResourcePool) -> StageResult {
        Self::identify(ctx).into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SkipOnModeSettings {
    #[serde(default = "all_modes")]
    allowed_modes: Vec<InstrumentMode>,
}

fn all_modes() -> Vec<InstrumentMode> {
    InstrumentMode::ALL.to_vec()
}

/// Skips files whose `instr_mode` is not one of the allowed modes.
#[derive(Debug, Clone)]
pub struct SkipOnModeStage {
    allowed_modes: Vec<InstrumentMode>,
}

impl SkipOnModeStage {
    /// Configuration name.
    pub const NAME: &'static str = "alg_skip_on_mode";

    /// Skip reason recorded in outcomes.
    pub const REASON: &'static str = "wrong_mode";

    /// Creates the stage.
    #[must_use]
    pub fn new(allowed_modes: impl IntoIterator<Item = InstrumentMode>) -> Self {
        Self {
            allowed_modes: allowed_modes.into_iter().collect(),
        }
    }

    /// Builds the stage from its settings, e.g. `{ allowed_modes: [LRM] }`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for malformed settings.
    pub fn from_settings(settings: &serde_json::Value) -> Result<Self, ConfigError> {
        if settings.is_null() {
            return Ok(Self::new(InstrumentMode::ALL));
        }
        let parsed: SkipOnModeSettings = serde_json::from_value(settings.clone())
            .map_err(|e| ConfigError::invalid(format!("stage_settings.{}", Self::NAME), e.to_string()))?;
        Ok(Self::new(parsed.allowed_modes))
    }

    fn check(&self, ctx: &FileContext) -> Result<StageResult, StageError> {
        let code = ctx.get_text("instr_mode")?;
        let allowed = InstrumentMode::from_code(code).is_some_and(|m| self.allowed_modes.contains(&m));
        if allowed {
            return Ok(StageResult::Continue);
        }
        debug!(file = %ctx.file(), instr_mode = %code, "Skipping file in unprocessed mode");
        Ok(StageResult::skip(Self::REASON))
    }
}

#[async_trait]
impl Stage for SkipOnModeStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn contract(&self) -> FieldContract {
        FieldContract::new().reads(["instr_mode"])
    }

    async fn apply(&self, ctx: &mut FileContext, _resources: &ResourcePool) -> StageResult {
        self.check(ctx).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FileId;
    use crate::errors::FieldError;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const LRM_FILE: &str = "/l1b/CS_OFFL_SIR_LRM_1B_20200930T191158_20200930T191302_D001.nc";
    const SAR_FILE: &str = "/l1b/CS_OFFL_SIR_SAR_1B_20200930T191158_20200930T191302_E003.nc";

    async fn run(stage: &dyn Stage, ctx: &mut FileContext) -> StageResult {
        ctx.enter_stage(stage.name(), Arc::new(stage.contract()));
        let result = stage.apply(ctx, &ResourcePool::empty()).await;
        ctx.leave_stage();
        result
    }

    #[tokio::test]
    async fn test_identify_file_writes_fields() {
        let mut ctx = FileContext::new(FileId::from_path(LRM_FILE));
        let result = run(&IdentifyFileStage::new(), &mut ctx).await;

        assert!(result.is_continue());
        assert_eq!(ctx.get_text("instr_mode").unwrap(), "LRM");
        assert_eq!(ctx.get_text("l1b_baseline").unwrap(), "D");
        assert_eq!(ctx.get_int("l1b_version").unwrap(), 1);
        assert_eq!(ctx.get_text("start_time").unwrap(), "2020-09-30T19:11:58");
        assert_eq!(
            ctx.fields().entry("instr_mode").map(|e| e.written_by.as_str()),
            Some("alg_identify_file")
        );
    }

    #[tokio::test]
    async fn test_identify_file_rejects_unknown_name() {
        let mut ctx = FileContext::new(FileId::from_path("/l1b/track.nc"));
        let result = run(&IdentifyFileStage::new(), &mut ctx).await;

        assert!(matches!(result, StageResult::Fail(StageError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_skip_on_mode_skips_sar() {
        let mut ctx = FileContext::new(FileId::from_path(SAR_FILE));
        run(&IdentifyFileStage::new(), &mut ctx).await;

        let result = run(&SkipOnModeStage::new(InstrumentMode::ALL), &mut ctx).await;
        assert!(matches!(result, StageResult::SkipFile(ref r) if r == "wrong_mode"));
    }

    #[tokio::test]
    async fn test_skip_on_mode_respects_settings() {
        let stage = SkipOnModeStage::from_settings(&serde_json::json!({ "allowed_modes": ["SIN"] })).unwrap();
        let mut ctx = FileContext::new(FileId::from_path(LRM_FILE));
        run(&IdentifyFileStage::new(), &mut ctx).await;

        assert!(run(&stage, &mut ctx).await.is_skip());
    }

    #[tokio::test]
    async fn test_skip_on_mode_requires_instr_mode() {
        let mut ctx = FileContext::new(FileId::from_path(LRM_FILE));
        let result = run(&SkipOnModeStage::new(InstrumentMode::ALL), &mut ctx).await;

        assert!(matches!(
            result,
            StageResult::Fail(StageError::Field(FieldError::Missing { .. }))
        ));
    }
}
