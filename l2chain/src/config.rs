//! Chain configuration.
//!
//! A configuration file lists the algorithm stages and file selectors in
//! order, each tagged `Enable` or `Disable`, plus the run settings:
//!
//! ```yaml
//! chain:
//!   use_multi_processing: true
//!   max_processes_for_multiprocessing: 4
//!   stop_on_error: false
//! algorithms:
//!   - alg_identify_file: Enable
//!   - alg_skip_on_mode: Enable
//! l1b_file_selectors:
//!   - find_lrm: Enable
//!   - find_sin: Disable
//! l1b_base_dir: /data/cs2/l1b
//! ```

use crate::errors::{ConfigError, RunError};
use crate::pipeline::{ChainBuilder, Orchestrator, OrchestratorBuilder, RunPolicy, StageChain};
use crate::resources::{DatasetKind, ResourcePool};
use crate::selectors::{CryoSatFileSelector, FileSelector};
use crate::stages::StageRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Enable/disable flag of a configured stage or selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Toggle {
    /// Part of the run.
    Enable,
    /// Listed but left out of the run.
    Disable,
}

impl Toggle {
    /// Returns true for `Enable`.
    #[must_use]
    pub fn is_enabled(self) -> bool {
        self == Self::Enable
    }
}

/// One `name: Enable|Disable` list entry.
pub type ToggleEntry = BTreeMap<String, Toggle>;

/// Run-wide settings under the `chain` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainSettings {
    /// Process files concurrently. When false, files run one at a time.
    #[serde(default = "default_true")]
    pub use_multi_processing: bool,

    /// Worker limit; defaults to the available parallelism.
    #[serde(default)]
    pub max_processes_for_multiprocessing: Option<usize>,

    /// Abort the run at the first failed file.
    #[serde(default)]
    pub stop_on_error: bool,

    /// Fail files whose stages touch fields outside their contract.
    #[serde(default = "default_true")]
    pub enforce_field_contracts: bool,

    /// Load every declared shared dataset before dispatching files.
    #[serde(default = "default_true")]
    pub preload_resources: bool,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            use_multi_processing: true,
            max_processes_for_multiprocessing: None,
            stop_on_error: false,
            enforce_field_contracts: true,
            preload_resources: true,
        }
    }
}

/// A shared dataset entry under `resources.datasets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    /// Dataset type.
    pub kind: DatasetKind,
    /// Source path, relative to `resources.base_dir` unless absolute.
    pub path: PathBuf,
}

/// Shared reference dataset configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourcesConfig {
    /// Root directory of the reference datasets.
    #[serde(default)]
    pub base_dir: PathBuf,

    /// Datasets by logical name (e.g. "dem:antarctica").
    #[serde(default)]
    pub datasets: BTreeMap<String, DatasetConfig>,
}

/// Complete chain configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    /// Run-wide settings.
    #[serde(default)]
    pub chain: ChainSettings,

    /// Ordered algorithm stages.
    #[serde(default)]
    pub algorithms: Vec<ToggleEntry>,

    /// Ordered L1b file selectors.
    #[serde(default)]
    pub l1b_file_selectors: Vec<ToggleEntry>,

    /// Root of the L1b archive searched by the selectors.
    #[serde(default)]
    pub l1b_base_dir: Option<PathBuf>,

    /// Comma separated baseline letters to accept (empty accepts all).
    #[serde(default)]
    pub l1b_baselines: String,

    /// Search `l1b_base_dir` directly instead of `MODE/YYYY/MM` subdirectories.
    #[serde(default)]
    pub flat_search: bool,

    /// Per-stage settings passed to the stage factories.
    #[serde(default)]
    pub stage_settings: BTreeMap<String, serde_json::Value>,

    /// Shared reference datasets.
    #[serde(default)]
    pub resources: ResourcesConfig,
}

impl ChainConfig {
    /// Loads configuration from a YAML or JSON file.
    /// Format is detected from the extension (.yaml, .yml or .json).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` or `ConfigError::Parse`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext {
            "json" => Self::from_json(&contents),
            // YAML is a superset of JSON
            _ => Self::from_yaml(&contents),
        }
    }

    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` on malformed input.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` on malformed input.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the configuration to YAML.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if serialization fails.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks list shapes, name uniqueness and numeric limits.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError::Invalid` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let stages = self.stages()?;
        self.selectors()?;

        if self.chain.max_processes_for_multiprocessing == Some(0) {
            return Err(ConfigError::invalid(
                "chain.max_processes_for_multiprocessing",
                "must be at least 1",
            ));
        }
        self.baselines()?;

        for name in self.stage_settings.keys() {
            if !stages.iter().any(|(stage, _)| stage == name) {
                return Err(ConfigError::invalid(
                    format!("stage_settings.{name}"),
                    "settings for a stage that is not listed in algorithms",
                ));
            }
        }
        for (name, dataset) in &self.resources.datasets {
            if dataset.path.as_os_str().is_empty() {
                return Err(ConfigError::invalid(format!("resources.datasets.{name}.path"), "is empty"));
            }
        }
        Ok(())
    }

    /// Returns the algorithm stages in order with their enabled flags.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for malformed entries or duplicates.
    pub fn stages(&self) -> Result<Vec<(String, bool)>, ConfigError> {
        flatten_toggles("algorithms", &self.algorithms)
    }

    /// Returns the file selectors in order with their enabled flags.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for malformed entries or duplicates.
    pub fn selectors(&self) -> Result<Vec<(String, bool)>, ConfigError> {
        flatten_toggles("l1b_file_selectors", &self.l1b_file_selectors)
    }

    /// Parses `l1b_baselines` ("D,E") into baseline letters.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if an item is not a single letter.
    pub fn baselines(&self) -> Result<Vec<char>, ConfigError> {
        self.l1b_baselines
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|item| {
                let mut chars = item.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_alphabetic() => Ok(c.to_ascii_uppercase()),
                    _ => Err(ConfigError::invalid(
                        "l1b_baselines",
                        format!("'{item}' is not a baseline letter"),
                    )),
                }
            })
            .collect()
    }

    /// Number of files processed at once.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        if !self.chain.use_multi_processing {
            return 1;
        }
        self.chain
            .max_processes_for_multiprocessing
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get))
    }

    /// The run policy implied by `stop_on_error`.
    #[must_use]
    pub fn policy(&self) -> RunPolicy {
        RunPolicy::from_stop_on_error(self.chain.stop_on_error)
    }

    /// Builds the effective stage chain.
    ///
    /// Every listed stage, enabled or not, must be known to the registry.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Config` for unknown stages or bad settings and
    /// `RunError::Validation` if the chain breaks a field contract.
    pub fn build_chain(&self, registry: &StageRegistry) -> Result<StageChain, RunError> {
        let mut builder = ChainBuilder::new().enforce_contracts(self.chain.enforce_field_contracts);
        for (name, enabled) in self.stages()? {
            let settings = self.stage_settings.get(&name).cloned().unwrap_or_default();
            let stage = registry.create(&name, &settings)?;
            builder = builder.add(stage, enabled);
        }
        Ok(builder.build()?)
    }

    /// Builds the shared resource pool. Nothing is loaded yet.
    #[must_use]
    pub fn build_resources(&self) -> ResourcePool {
        self.resources
            .datasets
            .iter()
            .fold(ResourcePool::builder(&self.resources.base_dir), |builder, (name, dataset)| {
                builder.register(name.clone(), dataset.kind.loader(dataset.path.clone()))
            })
            .build()
    }

    /// Builds the enabled file selectors in configured order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Unknown` for an unknown selector name and
    /// `ConfigError::Invalid` if `l1b_base_dir` is missing.
    pub fn build_selectors(&self) -> Result<Vec<Arc<dyn FileSelector>>, ConfigError> {
        let baselines = self.baselines()?;
        let mut selectors: Vec<Arc<dyn FileSelector>> = Vec::new();

        for (name, enabled) in self.selectors()? {
            let selector = match name.as_str() {
                "find_lrm" | "find_sin" => {
                    let base = self.l1b_base_dir.clone().ok_or_else(|| {
                        ConfigError::invalid("l1b_base_dir", format!("required by file selector '{name}'"))
                    })?;
                    if name == "find_lrm" {
                        CryoSatFileSelector::find_lrm(base)
                    } else {
                        CryoSatFileSelector::find_sin(base)
                    }
                }
                _ => {
                    return Err(ConfigError::Unknown {
                        what: "file selector",
                        name,
                    })
                }
            };
            if !enabled {
                debug!(selector = %name, "File selector disabled");
                continue;
            }
            selectors.push(Arc::new(
                selector
                    .with_baselines(baselines.iter().copied())
                    .with_flat_search(self.flat_search),
            ));
        }
        Ok(selectors)
    }

    /// Builds an orchestrator builder with the chain, resources, selectors
    /// and run settings of this configuration. Writers, event sinks and
    /// labels are left to the caller.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Config` or `RunError::Validation` if any part of
    /// the configuration is invalid, including stages that need datasets
    /// missing from `resources.datasets`.
    pub fn orchestrator(&self, registry: &StageRegistry) -> Result<OrchestratorBuilder, RunError> {
        self.validate()?;
        let chain = self.build_chain(registry)?;
        let resources = self.build_resources();

        let missing: Vec<String> = chain
            .required_resources()
            .into_iter()
            .filter(|name| !resources.contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::invalid(
                "resources.datasets",
                format!("no dataset configured for {}", missing.join(", ")),
            )
            .into());
        }

        let builder = self.build_selectors()?.into_iter().fold(
            Orchestrator::builder(chain)
                .resources(resources)
                .policy(self.policy())
                .concurrency(self.concurrency())
                .preload_resources(self.chain.preload_resources),
            OrchestratorBuilder::selector,
        );
        Ok(builder)
    }
}

fn flatten_toggles(key: &str, entries: &[ToggleEntry]) -> Result<Vec<(String, bool)>, ConfigError> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let mut iter = entry.iter();
            let (name, toggle) = match (iter.next(), iter.next()) {
                (Some(pair), None) => pair,
                _ => {
                    return Err(ConfigError::invalid(
                        format!("{key}[{index}]"),
                        "each entry must be a single 'name: Enable|Disable' pair",
                    ))
                }
            };
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::invalid(format!("{key}[{index}]"), format!("'{name}' is listed twice")));
            }
            Ok((name.clone(), toggle.is_enabled()))
        })
        .collect()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{FnStage, Stage, StageResult};
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    const YAML: &str = r#"
chain:
  use_multi_processing: true
  max_processes_for_multiprocessing: 3
  stop_on_error: true
algorithms:
  - alg_identify_file: Enable
  - alg_skip_on_mode: Enable
  - alg_flag_filters: Disable
l1b_file_selectors:
  - find_lrm: Enable
  - find_sin: Disable
l1b_base_dir: /data/cs2/l1b
l1b_baselines: "d, E"
stage_settings:
  alg_skip_on_mode: { allowed_modes: [LRM] }
resources:
  base_dir: /data/resources
  datasets:
    "dem:antarctica": { kind: raster_grid, path: dems/ant.json }
"#;

    fn registry() -> StageRegistry {
        let mut registry = StageRegistry::with_builtins();
        registry.register("alg_flag_filters", |_| {
            Ok(Arc::new(FnStage::new("alg_flag_filters", |_ctx| StageResult::Continue)) as Arc<dyn Stage>)
        });
        registry
    }

    #[test]
    fn test_parse_yaml() {
        let config = ChainConfig::from_yaml(YAML).unwrap();
        config.validate().unwrap();

        assert_eq!(
            config.stages().unwrap(),
            vec![
                ("alg_identify_file".to_string(), true),
                ("alg_skip_on_mode".to_string(), true),
                ("alg_flag_filters".to_string(), false),
            ]
        );
        assert_eq!(config.baselines().unwrap(), vec!['D', 'E']);
        assert_eq!(config.concurrency(), 3);
        assert_eq!(config.policy(), RunPolicy::AbortOnFirstFailure);
        assert!(config.chain.enforce_field_contracts);
    }

    #[test]
    fn test_from_file_detects_format() {
        let yaml = ChainConfig::from_yaml(YAML).unwrap();
        let json = serde_json::to_string(&yaml).unwrap();

        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        file.write_all(json.as_bytes()).unwrap();
        let loaded = ChainConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.stages().unwrap(), yaml.stages().unwrap());

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chain.yml");
        std::fs::write(&path, YAML).unwrap();
        assert_eq!(ChainConfig::from_file(&path).unwrap().l1b_baselines, "d, E");
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = ChainConfig::from_file("/no/such/chain.yml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = ChainConfig::from_yaml("chain:\n  use_multiprocessing: true\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_sequential_when_multiprocessing_disabled() {
        let config =
            ChainConfig::from_yaml("chain:\n  use_multi_processing: false\n  max_processes_for_multiprocessing: 8\n")
                .unwrap();
        assert_eq!(config.concurrency(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_entries() {
        let two_keys = ChainConfig::from_yaml("algorithms:\n  - { a: Enable, b: Enable }\n").unwrap();
        assert!(matches!(two_keys.validate(), Err(ConfigError::Invalid { key, .. }) if key == "algorithms[0]"));

        let duplicate = ChainConfig::from_yaml("algorithms:\n  - a: Enable\n  - a: Disable\n").unwrap();
        assert!(duplicate.validate().is_err());

        let zero = ChainConfig::from_yaml("chain:\n  max_processes_for_multiprocessing: 0\n").unwrap();
        assert!(zero.validate().is_err());

        let baseline = ChainConfig::from_yaml("l1b_baselines: \"DE\"\n").unwrap();
        assert!(baseline.validate().is_err());

        let orphan = ChainConfig::from_yaml("stage_settings:\n  alg_x: {}\n").unwrap();
        assert!(orphan.validate().is_err());
    }

    #[test]
    fn test_bad_toggle_value_fails_to_parse() {
        assert!(ChainConfig::from_yaml("algorithms:\n  - a: On\n").is_err());
    }

    #[test]
    fn test_build_chain_skips_disabled_stages() {
        let config = ChainConfig::from_yaml(YAML).unwrap();
        let chain = config.build_chain(&registry()).unwrap();

        assert_eq!(chain.enabled_names(), vec!["alg_identify_file", "alg_skip_on_mode"]);
        assert_eq!(chain.descriptors().len(), 3);
    }

    #[test]
    fn test_build_chain_rejects_unknown_stage() {
        let config = ChainConfig::from_yaml(YAML).unwrap();
        let err = config.build_chain(&StageRegistry::with_builtins()).unwrap_err();
        assert!(matches!(
            err,
            RunError::Config(ConfigError::Unknown { what: "stage", ref name }) if name == "alg_flag_filters"
        ));
    }

    #[test]
    fn test_build_chain_reports_contract_error() {
        let config =
            ChainConfig::from_yaml("algorithms:\n  - alg_identify_file: Disable\n  - alg_skip_on_mode: Enable\n")
                .unwrap();
        let err = config.build_chain(&registry()).unwrap_err();
        assert!(matches!(err, RunError::Validation(ref e) if e.code() == "CHAIN-MISSING-FIELD"));
    }

    #[test]
    fn test_build_selectors() {
        let config = ChainConfig::from_yaml(YAML).unwrap();
        let selectors = config.build_selectors().unwrap();
        assert_eq!(selectors.len(), 1);
        assert_eq!(selectors[0].name(), "find_lrm");

        let unknown = ChainConfig::from_yaml("l1b_base_dir: /x\nl1b_file_selectors:\n  - find_sar: Enable\n").unwrap();
        assert!(matches!(
            unknown.build_selectors(),
            Err(ConfigError::Unknown { what: "file selector", .. })
        ));

        let no_base = ChainConfig::from_yaml("l1b_file_selectors:\n  - find_lrm: Enable\n").unwrap();
        assert!(no_base.build_selectors().is_err());
    }

    #[test]
    fn test_all_selectors_disabled_gives_none() {
        let config = ChainConfig::from_yaml(
            "l1b_base_dir: /x\nl1b_file_selectors:\n  - find_lrm: Disable\n  - find_sin: Disable\n",
        )
        .unwrap();
        assert!(config.build_selectors().unwrap().is_empty());
    }

    #[test]
    fn test_build_resources_registers_datasets() {
        let config = ChainConfig::from_yaml(YAML).unwrap();
        let pool = config.build_resources();
        assert_eq!(pool.names(), vec!["dem:antarctica".to_string()]);
        assert_eq!(pool.root(), Path::new("/data/resources"));
        assert_eq!(pool.loaded_count(), 0);
    }

    #[test]
    fn test_orchestrator_from_config() {
        let config = ChainConfig::from_yaml(YAML).unwrap();
        let orchestrator = config.orchestrator(&registry()).unwrap().build().unwrap();
        assert_eq!(orchestrator.concurrency(), 3);
        assert_eq!(orchestrator.policy(), RunPolicy::AbortOnFirstFailure);
        assert!(orchestrator.resources().contains("dem:antarctica"));
    }
}
