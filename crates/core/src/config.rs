//! Configuration management
//!
//! Settings live in a TOML file. Every section is defaulted, so a missing
//! file or a file holding only some keys both load cleanly.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cipher::SecretCipher;
use crate::error::{Error, Result};
use crate::transfer::DEFAULT_CHUNK_SIZE;

/// Environment variable that overrides the configuration directory
pub const CONFIG_DIR_ENV: &str = "STOWAGE_CONFIG_DIR";

/// Environment variable holding the hex secret key unless configured otherwise
pub const DEFAULT_KEY_ENV: &str = "STOWAGE_SECRET_KEY";

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transfer: TransferSettings,
    pub retry: RetryConfig,
    pub secrets: SecretSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Bytes moved per read/write round trip
    pub chunk_size: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Backoff policy used by [`crate::retry::retry_with_backoff`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretSettings {
    /// Name of the environment variable holding the hex-encoded key
    pub key_env: String,
}

impl Default for SecretSettings {
    fn default() -> Self {
        Self {
            key_env: DEFAULT_KEY_ENV.to_string(),
        }
    }
}

impl SecretSettings {
    /// Build the secret cipher from the configured environment variable
    pub fn load_cipher(&self) -> Result<SecretCipher> {
        let value = std::env::var(&self.key_env).map_err(|_| {
            Error::Config(format!(
                "secret key not set; export {} as 64 hex characters",
                self.key_env
            ))
        })?;
        SecretCipher::from_hex(&value)
    }
}

impl Config {
    /// Reject values no transfer could run with
    pub fn validate(&self) -> Result<()> {
        if self.transfer.chunk_size == 0 {
            return Err(Error::Config("transfer.chunk_size must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(Error::Config(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".into(),
            ));
        }
        if self.secrets.key_env.trim().is_empty() {
            return Err(Error::Config("secrets.key_env must not be empty".into()));
        }
        Ok(())
    }
}

/// Loads and saves [`Config`] at a resolved path
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Resolve `$STOWAGE_CONFIG_DIR/config.toml`, falling back to the
    /// platform config directory
    pub fn new() -> Result<Self> {
        let dir = match std::env::var(CONFIG_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => dirs::config_dir()
                .ok_or_else(|| Error::Config("cannot determine config directory".into()))?
                .join("stowage"),
        };
        Ok(Self::with_path(dir.join(CONFIG_FILE)))
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the config; a missing file yields defaults
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            tracing::debug!(path = %self.config_path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }

        let contents = std::fs::read_to_string(&self.config_path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::debug!(path = %self.config_path.display(), "Loaded config");
        Ok(config)
    }

    /// Write the config, creating the directory when needed
    pub fn save(&self, config: &Config) -> Result<()> {
        config.validate()?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(config)?;
        std::fs::write(&self.config_path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.toml"));
        let config = manager.load().unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.transfer.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.secrets.key_env, DEFAULT_KEY_ENV);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[transfer]\nchunk_size = 1048576\n").unwrap();

        let config = ConfigManager::with_path(&path).load().unwrap();
        assert_eq!(config.transfer.chunk_size, 1048576);
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_save_creates_directory() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("nested/stowage/config.toml"));

        let mut config = Config::default();
        config.retry.max_attempts = 7;
        config.secrets.key_env = "MY_KEY".to_string();
        manager.save(&config).unwrap();

        assert_eq!(manager.load().unwrap(), config);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(&path, "[transfer]\nchunk_size = 0\n").unwrap();
        assert!(matches!(
            ConfigManager::with_path(&path).load(),
            Err(Error::Config(_))
        ));

        std::fs::write(
            &path,
            "[retry]\ninitial_backoff_ms = 60000\nmax_backoff_ms = 1000\n",
        )
        .unwrap();
        assert!(matches!(
            ConfigManager::with_path(&path).load(),
            Err(Error::Config(msg)) if msg.contains("initial_backoff_ms")
        ));

        std::fs::write(&path, "transfer = [").unwrap();
        assert!(matches!(
            ConfigManager::with_path(&path).load(),
            Err(Error::TomlParse(_))
        ));
    }

    #[test]
    fn test_load_cipher_requires_env() {
        let settings = SecretSettings {
            key_env: "STOWAGE_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
        };
        let err = settings.load_cipher().unwrap_err();
        assert!(err.to_string().contains("STOWAGE_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
