//! Rosterd configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main rosterd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration
    pub store: StoreConfig,

    /// Outbound channel configuration
    pub channel: ChannelConfig,

    /// Conversation lifecycle configuration
    pub conversation: ConversationConfig,

    /// Registry concurrency configuration
    pub registry: RegistryConfig,

    /// Prompt template paths configuration
    pub prompts: PromptsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that required environment variables and values are set correctly.
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        match self.channel.provider.as_str() {
            "console" => {}
            "whatsapp" => {
                if std::env::var(&self.channel.token_env).is_err() {
                    return Err(eyre::eyre!(
                        "Channel token not found. Set the {} environment variable.",
                        self.channel.token_env
                    ));
                }
            }
            other => {
                return Err(eyre::eyre!(
                    "Unknown channel provider '{other}' (expected \"whatsapp\" or \"console\")"
                ));
            }
        }

        if self.conversation.expiry_hours == 0 {
            return Err(eyre::eyre!("conversation.expiry-hours must be at least 1"));
        }

        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .rosterd.yml
        let local_config = PathBuf::from(".rosterd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/rosterd/rosterd.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("rosterd").join("rosterd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Read just the log level, for use before logging is initialized
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.logging.level)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory for the roster store database
    #[serde(rename = "data-dir")]
    pub data_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/rosterd on Linux)
        let data_dir = dirs::data_dir()
            .map(|d| d.join("rosterd"))
            .unwrap_or_else(|| PathBuf::from(".rosterstore"))
            .to_string_lossy()
            .into_owned();

        Self { data_dir }
    }
}

impl StoreConfig {
    /// Path to the SQLite database file
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("roster.db")
    }

    /// Path to the daemon lock file
    pub fn lock_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("rosterd.lock")
    }
}

/// Outbound channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Delivery provider ("whatsapp" or "console")
    pub provider: String,

    /// Base URL of the WhatsApp bridge
    pub endpoint: String,

    /// Environment variable containing the bridge access token
    #[serde(rename = "token-env")]
    pub token_env: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            provider: "console".to_string(),
            endpoint: "http://localhost:3000".to_string(),
            token_env: "ROSTERD_CHANNEL_TOKEN".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl ChannelConfig {
    /// Read the bridge token from the configured environment variable
    pub fn get_token(&self) -> Result<String> {
        std::env::var(&self.token_env).map_err(|_| {
            eyre::eyre!(
                "Channel token not found. Set the {} environment variable.",
                self.token_env
            )
        })
    }
}

/// Conversation lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Hours before an unanswered conversation expires
    #[serde(rename = "expiry-hours")]
    pub expiry_hours: i64,

    /// Seconds between expiry sweeps
    #[serde(rename = "sweep-interval-secs")]
    pub sweep_interval_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            expiry_hours: 24,
            sweep_interval_secs: 300,
        }
    }
}

/// Registry concurrency configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Internal retries for version-conflicted writes
    #[serde(rename = "cas-retries")]
    pub cas_retries: u32,

    /// Command channel capacity
    #[serde(rename = "command-buffer")]
    pub command_buffer: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cas_retries: 3,
            command_buffer: 256,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR); CLI flag wins
    pub level: Option<String>,
}

/// Prompt template paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Paths to search for prompt templates (searched in order)
    pub paths: Vec<String>,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            paths: vec![
                "builtin".to_string(),
                "~/.config/rosterd/prompts".to_string(),
                ".rosterd/prompts".to_string(),
            ],
        }
    }
}

impl PromptsConfig {
    /// Expand paths (resolve ~/ and relative paths)
    pub fn expanded_paths(&self) -> Vec<PathBuf> {
        self.paths
            .iter()
            .filter_map(|p| {
                if p == "builtin" {
                    None // builtin is handled specially
                } else if p.starts_with("~/") {
                    dirs::home_dir().map(|home| home.join(&p[2..]))
                } else {
                    Some(PathBuf::from(p))
                }
            })
            .collect()
    }

    /// Check if builtin templates should be loaded
    pub fn use_builtin(&self) -> bool {
        self.paths.iter().any(|p| p == "builtin")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.channel.provider, "console");
        assert_eq!(config.conversation.expiry_hours, 24);
        assert_eq!(config.registry.cas_retries, 3);
        assert!(config.prompts.use_builtin());
        assert!(config.logging.level.is_none());
    }

    #[test]
    fn test_load_log_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rosterd.yml");
        std::fs::write(&path, "logging:\n  level: DEBUG\n").unwrap();

        assert_eq!(Config::load_log_level(Some(&path)), Some("DEBUG".to_string()));
    }

    #[test]
    fn test_channel_config_defaults() {
        let config = ChannelConfig::default();

        assert_eq!(config.provider, "console");
        assert_eq!(config.token_env, "ROSTERD_CHANNEL_TOKEN");
        assert_eq!(config.timeout_ms, 30_000);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
store:
  data-dir: /var/lib/rosterd

channel:
  provider: whatsapp
  endpoint: http://bridge.internal:3000
  token-env: MY_BRIDGE_TOKEN
  timeout-ms: 10000

conversation:
  expiry-hours: 48
  sweep-interval-secs: 60

registry:
  cas-retries: 5
  command-buffer: 512
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.store.data_dir, "/var/lib/rosterd");
        assert_eq!(config.channel.provider, "whatsapp");
        assert_eq!(config.channel.endpoint, "http://bridge.internal:3000");
        assert_eq!(config.channel.token_env, "MY_BRIDGE_TOKEN");
        assert_eq!(config.conversation.expiry_hours, 48);
        assert_eq!(config.registry.cas_retries, 5);
        assert_eq!(config.registry.command_buffer, 512);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
conversation:
  expiry-hours: 12
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.conversation.expiry_hours, 12);

        // Defaults for unspecified
        assert_eq!(config.channel.provider, "console");
        assert_eq!(config.conversation.sweep_interval_secs, 300);
        assert_eq!(config.registry.cas_retries, 3);
    }

    #[test]
    fn test_store_paths() {
        let config = StoreConfig {
            data_dir: "/tmp/rosterd-test".to_string(),
        };

        assert_eq!(config.db_path(), PathBuf::from("/tmp/rosterd-test/roster.db"));
        assert_eq!(config.lock_path(), PathBuf::from("/tmp/rosterd-test/rosterd.lock"));
    }

    #[test]
    fn test_prompts_expanded_paths_skip_builtin() {
        let config = PromptsConfig {
            paths: vec!["builtin".to_string(), "/etc/rosterd/prompts".to_string()],
        };

        let expanded = config.expanded_paths();
        assert_eq!(expanded, vec![PathBuf::from("/etc/rosterd/prompts")]);
        assert!(config.use_builtin());
    }

    #[test]
    fn test_validate_console_provider() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = Config::default();
        config.channel.provider = "telegram".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Unknown channel provider"));
    }

    #[test]
    fn test_validate_zero_expiry() {
        let mut config = Config::default();
        config.conversation.expiry_hours = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rosterd.yml");
        std::fs::write(&path, "conversation:\n  expiry-hours: 6\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.conversation.expiry_hours, 6);
    }

    #[test]
    fn test_load_explicit_path_missing() {
        let path = PathBuf::from("/nonexistent/rosterd.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    #[serial]
    fn test_load_project_local_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".rosterd.yml"), "conversation:\n  expiry-hours: 48\n").unwrap();

        let prev = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let loaded = Config::load(None);
        std::env::set_current_dir(prev).unwrap();

        assert_eq!(loaded.unwrap().conversation.expiry_hours, 48);
    }

    #[test]
    #[serial]
    fn test_load_explicit_path_beats_project_local() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".rosterd.yml"), "conversation:\n  expiry-hours: 48\n").unwrap();
        let explicit = dir.path().join("other.yml");
        std::fs::write(&explicit, "conversation:\n  expiry-hours: 12\n").unwrap();

        let prev = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let loaded = Config::load(Some(&explicit));
        std::env::set_current_dir(prev).unwrap();

        assert_eq!(loaded.unwrap().conversation.expiry_hours, 12);
    }
}
