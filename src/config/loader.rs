//! Configuration Loader
//!
//! Environment-aware configuration loading built on the `config` crate.
//! Handles file discovery, environment detection, layering and validation.

use super::error::{ConfigResult, ConfigurationError};
use super::ResilienceConfig;
use config::{Config, ConfigBuilder, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Loaded, validated configuration plus the context it was loaded in
#[derive(Debug)]
pub struct ConfigManager {
    config: ResilienceConfig,
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

    /// Load configuration from a specific directory with explicit environment
    ///
    /// Useful for testing without modifying global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = environment,
            directory = %config_directory.display(),
            "Loading resilience configuration"
        );

        let builder = Self::layered_builder(&config_directory, environment)?;
        let builder = Self::apply_store_env_overrides(builder)?;

        let config: ResilienceConfig = builder.build()?.try_deserialize().map_err(|e| {
            ConfigurationError::EnvironmentConfigError {
                environment: environment.to_string(),
                error: e.to_string(),
            }
        })?;

        config.validate()?;

        info!(
            environment = environment,
            execution_mode = ?config.execution_mode,
            store_backend = %config.store.backend,
            store_url = %config.store.redacted_url(),
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (validated)
    pub fn from_config(config: ResilienceConfig, environment: &str) -> ConfigResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Current environment name: `RESILIENCE_ENV`, then `APP_ENV`, else `development`
    pub fn detect_environment() -> String {
        env::var("RESILIENCE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("RESILIENCE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn layered_builder(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<ConfigBuilder<config::builder::DefaultState>> {
        let base_file = config_directory.join("resilience.toml");
        let env_file = config_directory.join(format!("resilience.{environment}.toml"));

        debug!(
            base_file = %base_file.display(),
            base_present = base_file.exists(),
            env_file = %env_file.display(),
            env_present = env_file.exists(),
            "Configuration file layers"
        );

        Ok(Config::builder()
            .add_source(Config::try_from(&ResilienceConfig::default())?)
            .add_source(File::from(base_file).required(false))
            .add_source(File::from(env_file).required(false))
            .add_source(
                Environment::with_prefix("RESILIENCE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            ))
    }

    /// Conventional `REDIS_*` variables take final precedence
    fn apply_store_env_overrides(
        builder: ConfigBuilder<config::builder::DefaultState>,
    ) -> ConfigResult<ConfigBuilder<config::builder::DefaultState>> {
        let port = env::var("REDIS_PORT")
            .ok()
            .and_then(|p| p.parse::<i64>().ok());
        let database = env::var("REDIS_DB")
            .ok()
            .and_then(|db| db.parse::<i64>().ok());

        Ok(builder
            .set_override_option("store.url", env::var("REDIS_URL").ok())?
            .set_override_option("store.host", env::var("REDIS_HOST").ok())?
            .set_override_option("store.port", port)?
            .set_override_option("store.password", env::var("REDIS_PASSWORD").ok())?
            .set_override_option("store.database", database)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionModeSetting;
    use std::fs;

    #[test]
    fn test_load_defaults_from_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();

        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.config().cache.default_ttl_seconds, 300);
        assert_eq!(manager.config().rate_limits.key_prefix, "rate_limit:");
    }

    #[test]
    fn test_environment_file_overrides_base_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("resilience.toml"),
            r#"
execution_mode = "long_lived"

[cache]
default_ttl_seconds = 120

[circuit_breakers.component_configs.content-analysis]
failure_threshold = 7
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("resilience.production.toml"),
            r#"
execution_mode = "stateless"

[retry]
max_attempts = 5
"#,
        )
        .unwrap();

        let manager = ConfigManager::load_from_directory_with_env(
            Some(dir.path().to_path_buf()),
            "production",
        )
        .unwrap();
        let config = manager.config();

        assert_eq!(config.execution_mode, ExecutionModeSetting::Stateless);
        assert_eq!(config.cache.default_ttl_seconds, 120);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(
            config
                .circuit_breakers
                .config_for_component("content-analysis")
                .failure_threshold,
            7
        );
    }

    #[test]
    fn test_invalid_file_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("resilience.toml"),
            r#"
[retry]
max_attempts = 0
"#,
        )
        .unwrap();

        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }
}
