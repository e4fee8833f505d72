//! Per-platform selector configuration and the platform table.
//! Uses injected `AppPaths` so embedding hosts control where files live.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use thiserror::Error;

use crate::document::validate_selector;
use crate::platform::AppPaths;
use crate::protocol::Identity;

pub const DEFAULT_WARMUP_MS: u64 = 2000;
pub const DEFAULT_POLL_MS: u64 = 1000;

/// Errors from loading, saving or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid toml: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("{0}")]
    Format(String),
    #[error("platform '{platform}': {reason}")]
    Invalid { platform: String, reason: String },
    #[error("unknown platform '{0}'")]
    UnknownPlatform(String),
}

// Helper struct for serialization to maintain TOML structure
#[derive(Serialize)]
struct ConfigForSerialization {
    platforms: toml::map::Map<String, toml::Value>,
}

/// Where one identity field is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelector {
    pub selector: String,
    /// Read this attribute instead of the element's text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl FieldSelector {
    pub fn text(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            attribute: None,
        }
    }

    pub fn attribute(selector: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            attribute: Some(attribute.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySelectors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<FieldSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mall_name: Option<FieldSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<FieldSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mall_id: Option<FieldSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<FieldSelector>,
}

impl IdentitySelectors {
    fn iter(&self) -> impl Iterator<Item = &FieldSelector> {
        [
            &self.user_name,
            &self.mall_name,
            &self.user_id,
            &self.mall_id,
            &self.avatar,
        ]
        .into_iter()
        .flatten()
    }
}

/// How the current identity is resolved: per-field selectors over
/// literal defaults. With no selectors this is the constant placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityConfig {
    pub defaults: Identity,
    pub selectors: IdentitySelectors,
}

impl IdentityConfig {
    pub fn is_constant(&self) -> bool {
        self.selectors.iter().next().is_none()
    }
}

fn default_true() -> bool {
    true
}

fn default_warmup_ms() -> u64 {
    DEFAULT_WARMUP_MS
}

fn default_poll_ms() -> u64 {
    DEFAULT_POLL_MS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_url: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub message_selectors: Vec<String>,
    #[serde(default = "default_warmup_ms")]
    pub warmup_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default)]
    pub identity: Identity,
    #[serde(default)]
    pub identity_selectors: IdentitySelectors,
}

impl PlatformConfig {
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn identity_config(&self) -> IdentityConfig {
        IdentityConfig {
            defaults: self.identity.clone(),
            selectors: self.identity_selectors.clone(),
        }
    }

    /// Reject configurations that cannot run: no indicator selectors, a
    /// selector that does not compile, or a zero poll period.
    pub fn validate(&self, key: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            platform: key.to_string(),
            reason,
        };

        if self.message_selectors.is_empty() {
            return Err(invalid("no message selectors".to_string()));
        }
        if self.poll_ms == 0 {
            return Err(invalid("poll_ms must be greater than zero".to_string()));
        }

        let identity_selectors = self.identity_selectors.iter().map(|f| &f.selector);
        for selector in self.message_selectors.iter().chain(identity_selectors) {
            validate_selector(selector).map_err(|e| invalid(e.to_string()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub platforms: Vec<(String, PlatformConfig)>,
}

impl Config {
    /// Load configuration from the provided paths. Creates a default file if missing.
    pub fn load_with(paths: &dyn AppPaths) -> Result<Self, ConfigError> {
        let config_path = paths.config_path();

        if !config_path.exists() {
            info!(
                "Config file not found at {:?}, creating default config",
                config_path
            );
            let default_config = Self::default();
            default_config.save_with(paths)?;
            return Ok(default_config);
        }

        debug!("Loading config from {:?}", config_path);
        let content = fs::read_to_string(&config_path)?;
        let config = Self::from_toml_str(&content)?;

        info!("Loaded {} platform configurations", config.platforms.len());
        Ok(config)
    }

    /// Save configuration to the provided paths.
    pub fn save_with(&self, paths: &dyn AppPaths) -> Result<(), ConfigError> {
        let config_path = paths.config_path();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&config_path, self.to_toml_string()?)?;

        info!("Saved config to {:?}", config_path);
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        let mut platforms = toml::map::Map::new();
        for (key, platform) in &self.platforms {
            platforms.insert(key.clone(), toml::Value::try_from(platform)?);
        }
        let serializable_config = ConfigForSerialization { platforms };
        Ok(toml::to_string_pretty(&serializable_config)?)
    }

    /// Parse as toml::Value first to preserve platform order, then convert
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let value: toml::Value = content.parse()?;
        let table = value
            .as_table()
            .ok_or_else(|| ConfigError::Format("Root must be a table".to_string()))?;

        let mut platforms = Vec::new();

        if let Some(platforms_value) = table.get("platforms") {
            let platforms_table = platforms_value.as_table().ok_or_else(|| {
                ConfigError::Format("'platforms' must be a table".to_string())
            })?;
            // With preserve_order feature, this iteration maintains order
            for (key, value) in platforms_table {
                let platform: PlatformConfig = value.clone().try_into()?;
                platforms.push((key.clone(), platform));
            }
        }

        Ok(Config { platforms })
    }

    /// Look up a platform by key.
    pub fn platform(&self, key: &str) -> Result<&PlatformConfig, ConfigError> {
        self.platforms
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, platform)| platform)
            .ok_or_else(|| ConfigError::UnknownPlatform(key.to_string()))
    }

    pub fn enabled_platforms(&self) -> impl Iterator<Item = &(String, PlatformConfig)> {
        self.platforms.iter().filter(|(_, platform)| platform.enabled)
    }

    /// Validate every platform, reporting the first failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, platform) in &self.platforms {
            platform.validate(key)?;
        }
        Ok(())
    }
}

fn stub_identity(prefix: &str, label: &str) -> Identity {
    Identity {
        user_name: format!("{label}用户"),
        mall_name: format!("{label}店铺"),
        user_id: format!("{prefix}_user_id"),
        mall_id: format!("{prefix}_mall_id"),
        avatar: String::new(),
    }
}

fn selectors(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        let platforms = vec![
            (
                "doudian".to_string(),
                PlatformConfig {
                    name: "抖店".to_string(),
                    chat_url: Some("https://fxg.jinritemai.com/ffa/mshop/shopIndex".to_string()),
                    enabled: true,
                    message_selectors: selectors(&[
                        ".message-notify",
                        ".unread-count",
                        "[class*=\"unread\"]",
                    ]),
                    warmup_ms: DEFAULT_WARMUP_MS,
                    poll_ms: DEFAULT_POLL_MS,
                    identity: stub_identity("doudian", "抖店"),
                    identity_selectors: IdentitySelectors::default(),
                },
            ),
            (
                "kuaishou".to_string(),
                PlatformConfig {
                    name: "快手".to_string(),
                    chat_url: Some("https://s.kwaixiaodian.com/zone/settles/chat".to_string()),
                    enabled: true,
                    message_selectors: selectors(&[
                        ".new-message",
                        ".unread-badge",
                        "[class*=\"unread\"]",
                        "[class*=\"new-msg\"]",
                    ]),
                    warmup_ms: DEFAULT_WARMUP_MS,
                    poll_ms: DEFAULT_POLL_MS,
                    identity: stub_identity("kuaishou", "快手"),
                    identity_selectors: IdentitySelectors::default(),
                },
            ),
            (
                "jd".to_string(),
                PlatformConfig {
                    name: "京东".to_string(),
                    chat_url: Some("https://dongdong.jd.com/".to_string()),
                    enabled: true,
                    message_selectors: selectors(&[
                        ".new-msg",
                        ".msg-count",
                        "[class*=\"new\"]",
                        "[class*=\"unread\"]",
                    ]),
                    warmup_ms: DEFAULT_WARMUP_MS,
                    poll_ms: DEFAULT_POLL_MS,
                    identity: stub_identity("jd", "京东"),
                    identity_selectors: IdentitySelectors::default(),
                },
            ),
        ];

        Self { platforms }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
