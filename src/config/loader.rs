//! Configuration Loader
//!
//! Environment-aware layered loading. Sources, lowest precedence first:
//! built-in defaults, `conductor.toml`, `conductor.<env>.toml`, then
//! `CONDUCTOR_<SECTION>__<KEY>` environment variables.

use super::error::ConfigResult;
use super::EngineConfig;
use ::config::{Config, Environment, File, Map};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENV_PREFIX: &str = "CONDUCTOR";
const ENV_NAME_VAR: &str = "CONDUCTOR_ENV";
const BASE_FILE_STEM: &str = "conductor";

/// Loaded engine configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: EngineConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with an explicit environment name
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_overrides(config_dir, environment, None)
    }

    /// Load with an explicit variable map standing in for the process environment.
    /// Tests use this to exercise overrides without touching global state.
    pub fn load_with_overrides(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_overrides: Option<Map<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "CONFIG: Loading configuration"
        );

        let config = Self::load_and_merge_config(&config_directory, environment, env_overrides)?;
        config.validate()?;

        info!(
            environment = %environment,
            max_concurrent_pipelines = config.resources.max_concurrent_pipelines,
            reserved_capacity = config.resources.reserved_capacity,
            "CONFIG: Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: EngineConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Environment name the configuration was resolved for
    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
        env_overrides: Option<Map<String, String>>,
    ) -> ConfigResult<EngineConfig> {
        let base = config_directory.join(format!("{BASE_FILE_STEM}.toml"));
        let overlay = config_directory.join(format!("{BASE_FILE_STEM}.{environment}.toml"));

        let env_source = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env_overrides);

        let merged = Config::builder()
            .add_source(File::from(base).required(false))
            .add_source(File::from(overlay).required(false))
            .add_source(env_source)
            .build()?;

        Ok(merged.try_deserialize::<EngineConfig>()?)
    }

    /// Detect the environment name, defaulting to `development`
    pub fn detect_environment() -> String {
        env::var(ENV_NAME_VAR)
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        env::var("CONDUCTOR_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn no_env() -> Option<Map<String, String>> {
        Some(Map::new())
    }

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let manager =
            ConfigManager::load_with_overrides(Some(dir.path().to_path_buf()), "test", no_env())
                .unwrap();
        assert_eq!(manager.config(), &EngineConfig::default());
        assert_eq!(manager.environment(), "test");
    }

    #[test]
    fn test_partial_file_and_environment_overlay() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("conductor.toml"),
            "[resources]\nmax_concurrent_executors = 4\nreserved_capacity = 0.5\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("conductor.test.toml"),
            "[scheduling]\nrebalance_interval_seconds = 5\n",
        )
        .unwrap();

        let manager =
            ConfigManager::load_with_overrides(Some(dir.path().to_path_buf()), "test", no_env())
                .unwrap();
        let config = manager.config();
        assert_eq!(config.resources.max_concurrent_executors, 4);
        assert_eq!(config.resources.reserved_capacity, 0.5);
        // untouched fields keep defaults
        assert_eq!(config.resources.max_memory_mb, 8192);
        assert_eq!(config.scheduling.rebalance_interval_seconds, 5);
        assert_eq!(config.scheduling.monitor_interval_seconds, 30);
    }

    #[test]
    fn test_environment_variables_override_files() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("conductor.toml"),
            "[policy]\noverloaded_threshold = 92.0\n",
        )
        .unwrap();

        let mut vars = Map::new();
        vars.insert("CONDUCTOR_POLICY__OVERLOADED_THRESHOLD".to_string(), "88".to_string());
        vars.insert("CONDUCTOR_LOGGING__JSON".to_string(), "true".to_string());

        let manager =
            ConfigManager::load_with_overrides(Some(dir.path().to_path_buf()), "test", Some(vars))
                .unwrap();
        assert_eq!(manager.config().policy.overloaded_threshold, 88.0);
        assert!(manager.config().logging.json);
    }

    #[test]
    fn test_invalid_file_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("conductor.toml"),
            "[resources]\nreserved_capacity = 1.5\n",
        )
        .unwrap();

        let result =
            ConfigManager::load_with_overrides(Some(dir.path().to_path_buf()), "test", no_env());
        assert!(result.is_err());
    }

    #[test]
    fn test_from_config_validates() {
        let mut config = EngineConfig::default();
        config.resources.max_work_items_per_executor = 0;
        assert!(ConfigManager::from_config(config, "test").is_err());
        assert!(ConfigManager::from_config(EngineConfig::default(), "test").is_ok());
    }
}
