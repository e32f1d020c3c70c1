//! The stage chain runner.

use super::{StageDescriptor, StageSpec};
use crate::context::FileContext;
use crate::core::{FileId, Outcome};
use crate::errors::{ResourceLoadError, StageError};
use crate::resources::ResourcePool;
use crate::stages::StageResult;
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, warn};

/// An ordered, validated sequence of stages.
///
/// Built by [`super::ChainBuilder`]. Only enabled stages run, in their
/// configured order; the chain never reorders or retries.
#[derive(Debug, Clone)]
pub struct StageChain {
    specs: Vec<StageSpec>,
    enforce_contracts: bool,
}

impl StageChain {
    pub(crate) fn new(specs: Vec<StageSpec>, enforce_contracts: bool) -> Self {
        Self {
            specs,
            enforce_contracts,
        }
    }

    /// Returns the descriptors of every configured stage, enabled or not.
    #[must_use]
    pub fn descriptors(&self) -> Vec<&StageDescriptor> {
        self.specs.iter().map(|s| &s.descriptor).collect()
    }

    /// Returns the names of the enabled stages in run order.
    #[must_use]
    pub fn enabled_names(&self) -> Vec<&str> {
        self.enabled().map(StageSpec::name).collect()
    }

    /// Returns the number of enabled stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.enabled().count()
    }

    /// Returns true if no stage is enabled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the datasets used by the enabled stages, sorted and deduplicated.
    #[must_use]
    pub fn required_resources(&self) -> Vec<String> {
        self.enabled()
            .flat_map(|s| s.runner.resources())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Creates a fresh context for a file, with this chain's enforcement mode.
    #[must_use]
    pub fn new_context(&self, file: FileId) -> FileContext {
        FileContext::new(file).with_contract_enforcement(self.enforce_contracts)
    }

    /// Runs the enabled stages against one context until the first
    /// non-`Continue` result.
    ///
    /// Stage failures and panics become `Outcome::Failed` on the returned
    /// context.
    ///
    /// # Errors
    ///
    /// Returns the `ResourceLoadError` when a stage fails because a shared
    /// dataset is unavailable: that failure belongs to the run, not the file.
    pub async fn run(
        &self,
        mut ctx: FileContext,
        resources: &ResourcePool,
    ) -> Result<(FileContext, Outcome), ResourceLoadError> {
        for spec in self.enabled() {
            let name = spec.name();
            ctx.enter_stage(name, spec.contract.clone());
            let started = Instant::now();

            let result = AssertUnwindSafe(spec.runner.apply(&mut ctx, resources))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| StageResult::Fail(StageError::Panicked(panic_message(&*payload))));

            ctx.leave_stage();
            debug!(
                stage = %name,
                file = %ctx.file(),
                duration_ms = started.elapsed().as_secs_f64() * 1000.0,
                result = result_label(&result),
                "Stage finished"
            );

            let outcome = match result {
                StageResult::Continue => continue,
                StageResult::SkipFile(reason) => Outcome::skipped(name, reason),
                StageResult::Fail(StageError::Resource(err)) => {
                    warn!(stage = %name, file = %ctx.file(), error = %err, "Shared resource unavailable");
                    return Err(err);
                }
                StageResult::Fail(err) => Outcome::failed(name, &err),
            };
            ctx.finish(outcome.clone());
            return Ok((ctx, outcome));
        }

        ctx.finish(Outcome::Completed);
        Ok((ctx, Outcome::Completed))
    }

    fn enabled(&self) -> impl Iterator<Item = &StageSpec> {
        self.specs.iter().filter(|s| s.descriptor.enabled)
    }
}

fn result_label(result: &StageResult) -> &'static str {
    match result {
        StageResult::Continue => "continue",
        StageResult::SkipFile(_) => "skip",
        StageResult::Fail(_) => "fail",
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FieldContract;
    use crate::core::ContextStatus;
    use crate::errors::FieldError;
    use crate::pipeline::ChainBuilder;
    use crate::stages::{FnStage, Stage};
    use crate::testing::{FailingStage, FieldWriterStage, RecordingStage, SkippingStage};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const LRM_FILE: &str = "/l1b/CS_OFFL_SIR_LRM_1B_20200930T191158_20200930T191302_D001.nc";

    fn file() -> FileId {
        FileId::from_path(LRM_FILE)
    }

    #[tokio::test]
    async fn test_enabled_stages_run_in_order() {
        let log = RecordingStage::new_log();
        let chain = ChainBuilder::new()
            .stage(Arc::new(RecordingStage::new("a", log.clone())))
            .disabled_stage(Arc::new(RecordingStage::new("b", log.clone())))
            .stage(Arc::new(RecordingStage::new("c", log.clone())))
            .build()
            .unwrap();

        let (ctx, outcome) = chain.run(chain.new_context(file()), &ResourcePool::empty()).await.unwrap();

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(ctx.status(), &ContextStatus::Completed);
        assert_eq!(ctx.outcome(), Some(&Outcome::Completed));
        assert_eq!(RecordingStage::calls(&log), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_skip_short_circuits() {
        let log = RecordingStage::new_log();
        let chain = ChainBuilder::new()
            .stage(Arc::new(RecordingStage::new("a", log.clone())))
            .stage(Arc::new(SkippingStage::new("alg_skip_on_area", "outside_area")))
            .stage(Arc::new(RecordingStage::new("c", log.clone())))
            .build()
            .unwrap();

        let (ctx, outcome) = chain.run(chain.new_context(file()), &ResourcePool::empty()).await.unwrap();

        assert_eq!(outcome, Outcome::skipped("alg_skip_on_area", "outside_area"));
        assert_eq!(ctx.status(), &ContextStatus::Skipped("outside_area".into()));
        assert_eq!(RecordingStage::calls(&log), vec!["a"]);
    }

    #[tokio::test]
    async fn test_fail_short_circuits() {
        let log = RecordingStage::new_log();
        let chain = ChainBuilder::new()
            .stage(Arc::new(FailingStage::new("alg_retrack", StageError::Numerical("nan range".into()))))
            .stage(Arc::new(RecordingStage::new("c", log.clone())))
            .build()
            .unwrap();

        let (_ctx, outcome) = chain.run(chain.new_context(file()), &ResourcePool::empty()).await.unwrap();

        match outcome {
            Outcome::Failed { stage, error } => {
                assert_eq!(stage, "alg_retrack");
                assert_eq!(error.kind, "numerical");
            }
            other => panic!("expected failure, got {other}"),
        }
        assert!(RecordingStage::calls(&log).is_empty());
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let chain = ChainBuilder::new()
            .stage(Arc::new(FnStage::new("alg_panics", |_ctx| -> StageResult {
                panic!("index out of bounds")
            })))
            .build()
            .unwrap();

        let (ctx, outcome) = chain.run(chain.new_context(file()), &ResourcePool::empty()).await.unwrap();

        assert!(matches!(&outcome, Outcome::Failed { error, .. } if error.kind == "panic" && error.message.contains("index out of bounds")));
        assert!(ctx.status().is_terminal());
        assert!(ctx.active_stage().is_none());
    }

    #[tokio::test]
    async fn test_resource_failure_is_returned_not_recorded() {
        let stage: Arc<dyn Stage> = Arc::new(FailingStage::new(
            "alg_dem",
            StageError::Resource(ResourceLoadError::Unknown { name: "dem:antarctica".into() }),
        ));
        let chain = ChainBuilder::new().stage(stage).build().unwrap();

        let err = chain
            .run(chain.new_context(file()), &ResourcePool::empty())
            .await
            .unwrap_err();
        assert_eq!(err.name(), "dem:antarctica");
    }

    #[tokio::test]
    async fn test_undeclared_write_fails_file() {
        let stage: Arc<dyn Stage> = Arc::new(FnStage::new("alg_sneaky", |ctx| match ctx.put("poca_latitude", 71.2) {
            Ok(()) => StageResult::Continue,
            Err(e) => StageResult::fail(e),
        }));
        let chain = ChainBuilder::new().stage(stage.clone()).build().unwrap();

        let (_ctx, outcome) = chain.run(chain.new_context(file()), &ResourcePool::empty()).await.unwrap();
        assert!(matches!(&outcome, Outcome::Failed { error, .. } if error.kind == "field"));

        let lenient = ChainBuilder::new().stage(stage).enforce_contracts(false).build().unwrap();
        let (ctx, outcome) = lenient.run(lenient.new_context(file()), &ResourcePool::empty()).await.unwrap();
        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(ctx.get_float("poca_latitude"), Ok(71.2));
    }

    #[tokio::test]
    async fn test_rerun_is_deterministic() {
        let chain = ChainBuilder::new()
            .stage(Arc::new(FieldWriterStage::new("alg_surface_type", "surface_type", vec![1_i64, 1, 4])))
            .stage(Arc::new(
                FnStage::new("alg_count_ice", |ctx| {
                    let ice = match ctx.get_int_array("surface_type") {
                        Ok(types) => types.iter().filter(|&&t| t == 1).count(),
                        Err(e) => return StageResult::fail(e),
                    };
                    match ctx.put("n_ice", i64::try_from(ice).unwrap_or(i64::MAX)) {
                        Ok(()) => StageResult::Continue,
                        Err(e) => StageResult::fail(e),
                    }
                })
                .with_contract(FieldContract::new().reads(["surface_type"]).writes(["n_ice"])),
            ))
            .build()
            .unwrap();

        let (first, _) = chain.run(chain.new_context(file()), &ResourcePool::empty()).await.unwrap();
        let (second, _) = chain.run(chain.new_context(file()), &ResourcePool::empty()).await.unwrap();

        assert_eq!(first.get_int("n_ice"), Ok(2));
        assert_eq!(first.fields(), second.fields());
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[tokio::test]
    async fn test_missing_required_field_at_runtime() {
        let chain = ChainBuilder::new()
            .seeded_fields(["orbit_number"])
            .stage(Arc::new(
                FnStage::new("alg_orbit", |ctx| match ctx.get_int("orbit_number") {
                    Ok(_) => StageResult::Continue,
                    Err(e) => StageResult::fail(e),
                })
                .with_contract(FieldContract::new().reads(["orbit_number"])),
            ))
            .build()
            .unwrap();

        let (ctx, outcome) = chain.run(chain.new_context(file()), &ResourcePool::empty()).await.unwrap();
        assert!(outcome.is_failed());
        assert_eq!(
            ctx.status(),
            &ContextStatus::Failed(FieldError::Missing { key: "orbit_number".into() }.to_string())
        );
    }
}
