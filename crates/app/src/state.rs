use std::{fs, path::PathBuf};

use common::peer::SyncConfig;
use common::remote::{
    RemoteConfig, RemoteError, DEFAULT_PUBLIC_USERS_URL, DEFAULT_SERVICE_URL, DEFAULT_USERS_URL,
};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "thorne";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STORE_FILE_NAME: &str = "identity.store";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the ledger service
    #[serde(default = "default_service_url")]
    pub service_url: String,
    /// Key directory for private accounts
    #[serde(default = "default_users_url")]
    pub users_url: String,
    /// Key directory for aliases and RSA keys
    #[serde(default = "default_public_users_url")]
    pub public_users_url: String,
    /// Default log level, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Withhold blocks whose signature does not verify
    #[serde(default = "default_strict")]
    pub strict_signature_verification: bool,
}

fn default_service_url() -> String {
    DEFAULT_SERVICE_URL.to_string()
}

fn default_users_url() -> String {
    DEFAULT_USERS_URL.to_string()
}

fn default_public_users_url() -> String {
    DEFAULT_PUBLIC_USERS_URL.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_strict() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            users_url: default_users_url(),
            public_users_url: default_public_users_url(),
            log_level: default_log_level(),
            strict_signature_verification: default_strict(),
        }
    }
}

impl AppConfig {
    pub fn remote_config(&self) -> Result<RemoteConfig, RemoteError> {
        RemoteConfig::new(&self.service_url, &self.users_url, &self.public_users_url)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            strict_signature_verification: self.strict_signature_verification,
        }
    }

    /// Parsed log level, falling back to info
    pub fn log_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the thorne directory (~/.thorne)
    pub thorne_dir: PathBuf,
    /// Path to the encrypted identity store
    pub store_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the thorne directory path (custom or default ~/.thorne)
    pub fn thorne_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Create the thorne directory and write its config.
    ///  The identity store is written separately, once it has an account.
    pub fn init(custom_path: Option<PathBuf>, config: Option<AppConfig>) -> Result<Self, StateError> {
        let thorne_dir = Self::thorne_dir(custom_path)?;
        let config_path = thorne_dir.join(CONFIG_FILE_NAME);
        let store_path = thorne_dir.join(STORE_FILE_NAME);

        if config_path.exists() || store_path.exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&thorne_dir)?;

        let config = config.unwrap_or_default();
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        Ok(Self {
            thorne_dir,
            store_path,
            config_path,
            config,
        })
    }

    /// Undo an `init` whose identity store could not be written,
    ///  so that `init` can be run again
    pub fn abandon(self) -> Result<(), StateError> {
        for path in [&self.store_path, &self.config_path] {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Load existing state from the thorne directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let thorne_dir = Self::thorne_dir(custom_path)?;
        if !thorne_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_path = thorne_dir.join(CONFIG_FILE_NAME);
        let store_path = thorne_dir.join(STORE_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }
        if !store_path.exists() {
            return Err(StateError::MissingFile(STORE_FILE_NAME.to_string()));
        }

        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;

        Ok(Self {
            thorne_dir,
            store_path,
            config_path,
            config,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("thorne directory not initialized. Run 'thorne init' first")]
    NotInitialized,

    #[error("thorne directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("thorne");

        let config = AppConfig {
            service_url: "http://localhost:8080/api".to_string(),
            ..AppConfig::default()
        };
        let state = AppState::init(Some(dir.clone()), Some(config.clone())).unwrap();
        assert_eq!(state.store_path, dir.join(STORE_FILE_NAME));

        // No store yet
        assert!(matches!(
            AppState::load(Some(dir.clone())),
            Err(StateError::MissingFile(_))
        ));

        fs::write(&state.store_path, b"sealed").unwrap();
        let loaded = AppState::load(Some(dir)).unwrap();
        assert_eq!(loaded.config, config);
    }

    #[test]
    fn test_init_twice_fails() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        AppState::init(Some(dir.clone()), None).unwrap();
        assert!(matches!(
            AppState::init(Some(dir), None),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_abandoned_init_can_be_retried() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        let state = AppState::init(Some(dir.clone()), None).unwrap();
        state.abandon().unwrap();

        assert!(!dir.join(CONFIG_FILE_NAME).exists());
        AppState::init(Some(dir), None).unwrap();
    }

    #[test]
    fn test_load_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let result = AppState::load(Some(temp_dir.path().join("absent")));
        assert!(matches!(result, Err(StateError::NotInitialized)));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig = toml::from_str("log_level = \"debug\"").unwrap();
        assert_eq!(config.log_level(), tracing::Level::DEBUG);
        assert_eq!(config.service_url, DEFAULT_SERVICE_URL);
        assert!(config.sync_config().strict_signature_verification);
        assert!(config.remote_config().is_ok());
    }
}
