//! Stage registry: maps configuration names to stage factories.

use super::{IdentifyFileStage, SkipOnModeStage, Stage};
use crate::errors::ConfigError;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory building a stage from its `stage_settings` entry
/// (`serde_json::Value::Null` when none is configured).
pub type StageFactory = Arc<dyn Fn(&serde_json::Value) -> Result<Arc<dyn Stage>, ConfigError> + Send + Sync>;

/// Registry of known stage implementations, built once at startup.
#[derive(Clone, Default)]
pub struct StageRegistry {
    factories: HashMap<String, StageFactory>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in stages.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(IdentifyFileStage::NAME, |_settings| {
            Ok(Arc::new(IdentifyFileStage::new()) as Arc<dyn Stage>)
        });
        registry.register(SkipOnModeStage::NAME, |settings| {
            Ok(Arc::new(SkipOnModeStage::from_settings(settings)?) as Arc<dyn Stage>)
        });
        registry
    }

    /// Registers a factory under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<Arc<dyn Stage>, ConfigError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Registers a ready-made stage instance under its own name.
    ///
    /// The instance is shared by every chain built from this registry and
    /// ignores its settings.
    pub fn register_stage(&mut self, stage: Arc<dyn Stage>) {
        let name = stage.name().to_string();
        self.register(name, move |_settings| Ok(stage.clone()));
    }

    /// Checks if a name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Lists registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Builds the stage registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Unknown` for unregistered names, the factory's
    /// own error for bad settings, or `ConfigError::Invalid` when the built
    /// stage reports a different name.
    pub fn create(&self, name: &str, settings: &serde_json::Value) -> Result<Arc<dyn Stage>, ConfigError> {
        let factory = self.factories.get(name).ok_or_else(|| ConfigError::Unknown {
            what: "stage",
            name: name.to_string(),
        })?;
        let stage = factory(settings)?;
        if stage.name() != name {
            return Err(ConfigError::invalid(
                name,
                format!("factory built a stage named '{}'", stage.name()),
            ));
        }
        Ok(stage)
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("stages", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::NoOpStage;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtins_are_registered() {
        let registry = StageRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["alg_identify_file", "alg_skip_on_mode"]);

        let stage = registry.create("alg_identify_file", &serde_json::Value::Null).unwrap();
        assert_eq!(stage.name(), "alg_identify_file");
    }

    #[test]
    fn test_unknown_stage() {
        let registry = StageRegistry::new();
        let err = registry.create("alg_retrack", &serde_json::Value::Null).unwrap_err();
        assert!(matches!(err, ConfigError::Unknown { what: "stage", ref name } if name == "alg_retrack"));
    }

    #[test]
    fn test_register_stage_instance_is_shared() {
        let mut registry = StageRegistry::new();
        let stage: Arc<dyn Stage> = Arc::new(NoOpStage::new("alg_surface_type"));
        registry.register_stage(stage.clone());

        let created = registry.create("alg_surface_type", &serde_json::Value::Null).unwrap();
        assert!(Arc::ptr_eq(&stage, &created));
    }

    #[test]
    fn test_factory_name_mismatch() {
        let mut registry = StageRegistry::new();
        registry.register("alg_retrack", |_settings| Ok(Arc::new(NoOpStage::new("other")) as Arc<dyn Stage>));

        let err = registry.create("alg_retrack", &serde_json::Value::Null).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_bad_settings_are_reported() {
        let registry = StageRegistry::with_builtins();
        let err = registry
            .create("alg_skip_on_mode", &serde_json::json!({ "allowed_modes": ["XYZ"] }))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
