//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Placeholder some build tools substitute for missing values
const UNDEFINED: &str = "undefined";

/// CycleSync configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Identity provider settings
///
/// The API key is never read from or written to the file; it comes from
/// `CYCLESYNC_API_KEY`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messaging_sender_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    pub endpoint: String,
    pub token_endpoint: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub settle_timeout_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            auth_domain: None,
            project_id: None,
            storage_bucket: None,
            messaging_sender_id: None,
            app_id: None,
            endpoint: "https://identitytoolkit.googleapis.com/v1".to_string(),
            token_endpoint: "https://securetoken.googleapis.com/v1".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_timeout_secs: 10,
        }
    }
}

/// Identity settings after environment overrides are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySettings {
    pub api_key: Option<String>,
    pub auth_domain: Option<String>,
    pub project_id: Option<String>,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
    pub app_id: Option<String>,
    pub endpoint: String,
    pub token_endpoint: String,
    pub timeout_secs: u64,
}

impl IdentitySettings {
    /// Names of required values that are missing, empty, or `undefined`
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("api_key", &self.api_key),
            ("auth_domain", &self.auth_domain),
            ("project_id", &self.project_id),
            ("storage_bucket", &self.storage_bucket),
            ("messaging_sender_id", &self.messaging_sender_id),
            ("app_id", &self.app_id),
        ]
        .into_iter()
        .filter(|(_, value)| !is_present(value.as_deref()))
        .map(|(name, _)| name)
        .collect()
    }

    /// Whether every required value is present
    pub fn is_configured(&self) -> bool {
        self.missing().is_empty()
    }
}

fn is_present(value: Option<&str>) -> bool {
    value
        .map(str::trim)
        .is_some_and(|v| !v.is_empty() && v != UNDEFINED)
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Keep only the last four characters of an API key
pub(crate) fn redact_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "***".to_string();
    }
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("***{}", suffix)
}

impl IdentityConfig {
    /// Apply `CYCLESYNC_*` environment overrides
    pub fn resolve(&self) -> anyhow::Result<IdentitySettings> {
        self.resolve_with(|name| env::var(name).ok())
    }

    /// Apply overrides from `lookup`, which maps variable names to values
    pub fn resolve_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<IdentitySettings> {
        self.enforce_env_only()?;

        let pick = |name: &str, stored: &Option<String>| {
            lookup(name)
                .as_deref()
                .and_then(non_empty)
                .or_else(|| stored.clone())
        };

        let timeout_secs = match lookup("CYCLESYNC_IDENTITY_TIMEOUT_SECS") {
            Some(value) => value
                .trim()
                .parse()
                .with_context(|| format!("Invalid CYCLESYNC_IDENTITY_TIMEOUT_SECS: {}", value))?,
            None => self.timeout_secs,
        };

        Ok(IdentitySettings {
            api_key: lookup("CYCLESYNC_API_KEY").as_deref().and_then(non_empty),
            auth_domain: pick("CYCLESYNC_AUTH_DOMAIN", &self.auth_domain),
            project_id: pick("CYCLESYNC_PROJECT_ID", &self.project_id),
            storage_bucket: pick("CYCLESYNC_STORAGE_BUCKET", &self.storage_bucket),
            messaging_sender_id: pick("CYCLESYNC_MESSAGING_SENDER_ID", &self.messaging_sender_id),
            app_id: pick("CYCLESYNC_APP_ID", &self.app_id),
            endpoint: lookup("CYCLESYNC_IDENTITY_ENDPOINT")
                .as_deref()
                .and_then(non_empty)
                .unwrap_or_else(|| self.endpoint.clone()),
            token_endpoint: lookup("CYCLESYNC_TOKEN_ENDPOINT")
                .as_deref()
                .and_then(non_empty)
                .unwrap_or_else(|| self.token_endpoint.clone()),
            timeout_secs,
        })
    }

    /// API key from the environment, masked for display
    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        self.resolve().map(|settings| {
            settings.api_key.as_deref().map(redact_api_key)
        })
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "Identity API keys must be provided via the CYCLESYNC_API_KEY environment variable, not stored in configuration"
            ));
        }
        Ok(())
    }

    fn optional_field(&mut self, key: &str) -> Option<&mut Option<String>> {
        match key {
            "auth_domain" => Some(&mut self.auth_domain),
            "project_id" => Some(&mut self.project_id),
            "storage_bucket" => Some(&mut self.storage_bucket),
            "messaging_sender_id" => Some(&mut self.messaging_sender_id),
            "app_id" => Some(&mut self.app_id),
            _ => None,
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("CYCLESYNC_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("cyclesync")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Path of the durable flag file
    pub fn flags_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("flags.toml"))
    }

    /// Path of the identity provider's credential cache
    pub fn credentials_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("credentials.toml"))
    }

    /// Load configuration from file, or the defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`, creating its directory
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.identity.enforce_env_only()?;
        if self.identity.timeout_secs == 0 {
            return Err(anyhow!("identity.timeout_secs must be greater than zero"));
        }
        if self.session.settle_timeout_secs == 0 {
            return Err(anyhow!("session.settle_timeout_secs must be greater than zero"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        let unset = || "(not set)".to_string();
        match key {
            "identity.auth_domain" => Ok(self.identity.auth_domain.clone().unwrap_or_else(unset)),
            "identity.project_id" => Ok(self.identity.project_id.clone().unwrap_or_else(unset)),
            "identity.storage_bucket" => {
                Ok(self.identity.storage_bucket.clone().unwrap_or_else(unset))
            }
            "identity.messaging_sender_id" => {
                Ok(self.identity.messaging_sender_id.clone().unwrap_or_else(unset))
            }
            "identity.app_id" => Ok(self.identity.app_id.clone().unwrap_or_else(unset)),
            "identity.endpoint" => Ok(self.identity.endpoint.clone()),
            "identity.token_endpoint" => Ok(self.identity.token_endpoint.clone()),
            "identity.timeout_secs" => Ok(self.identity.timeout_secs.to_string()),

            "session.settle_timeout_secs" => Ok(self.session.settle_timeout_secs.to_string()),

            // API key (special handling - show redacted)
            "identity.api_key" | "api_key" => match self.identity.redacted_api_key()? {
                Some(redacted) => Ok(redacted),
                None => Ok("(not set - use CYCLESYNC_API_KEY env var)".to_string()),
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `cyclesync config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    ///
    /// An empty value clears optional identity settings.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        if let Some(name) = key.strip_prefix("identity.")
            && let Some(field) = self.identity.optional_field(name)
        {
            *field = non_empty(value);
            return Ok(());
        }

        match key {
            "identity.endpoint" | "identity.token_endpoint" => {
                let url = non_empty(value).ok_or_else(|| anyhow!("{} cannot be empty", key))?;
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(anyhow!("{} must be an http(s) URL: {}", key, url));
                }
                let url = url.trim_end_matches('/').to_string();
                if key == "identity.endpoint" {
                    self.identity.endpoint = url;
                } else {
                    self.identity.token_endpoint = url;
                }
            }
            "identity.timeout_secs" => {
                let secs: u64 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
                if secs == 0 {
                    return Err(anyhow!("timeout_secs must be greater than zero"));
                }
                self.identity.timeout_secs = secs;
            }
            "session.settle_timeout_secs" => {
                let secs: u64 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid settle_timeout_secs value: {}", value))?;
                if secs == 0 {
                    return Err(anyhow!("settle_timeout_secs must be greater than zero"));
                }
                self.session.settle_timeout_secs = secs;
            }

            // API key cannot be set via config
            "identity.api_key" | "api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration for security. \
                     Set the CYCLESYNC_API_KEY environment variable instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `cyclesync config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "identity.api_key",
            "identity.auth_domain",
            "identity.project_id",
            "identity.storage_bucket",
            "identity.messaging_sender_id",
            "identity.app_id",
            "identity.endpoint",
            "identity.token_endpoint",
            "identity.timeout_secs",
            "session.settle_timeout_secs",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}
