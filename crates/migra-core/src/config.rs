//! Layered configuration
//!
//! `MigraConfig` is read from TOML. The path comes from `MIGRA_CONFIG`, else
//! `migra.toml` in the working directory when it exists; otherwise every
//! section takes its defaults.

use crate::coordinator::CoordinatorSettings;
use crate::error::ConfigError;
use crate::llm::{ProviderSpec, Vendor};
use migra_gateway::GatewayConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "MIGRA_CONFIG";

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "migra.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigraConfig {
    pub gateway: GatewayConfig,
    pub llm: LlmConfig,
    pub session: SessionConfig,
}

/// Reasoning-oracle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `"<vendor>/<model>"`
    pub provider: String,
    pub openai_api_key_secret: String,
    pub gemini_api_key_secret: String,
    pub temperature: f32,
    pub openai_base_url: String,
    pub google_base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai/gpt-4o".to_string(),
            openai_api_key_secret: "openai-api-key".to_string(),
            gemini_api_key_secret: "gemini-api-key".to_string(),
            temperature: 0.1,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            google_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
        }
    }
}

impl LlmConfig {
    pub fn provider_spec(&self) -> Result<ProviderSpec, ConfigError> {
        self.provider.parse()
    }

    #[must_use]
    pub fn api_key_secret(&self, provider: &ProviderSpec) -> &str {
        match provider.vendor {
            Vendor::OpenAi => &self.openai_api_key_secret,
            Vendor::Google => &self.gemini_api_key_secret,
        }
    }

    #[must_use]
    pub fn base_url(&self, provider: &ProviderSpec) -> &str {
        match provider.vendor {
            Vendor::OpenAi => &self.openai_base_url,
            Vendor::Google => &self.google_base_url,
        }
    }
}

/// Coordinator bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_turns: u32,
    pub agent_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: 15,
            agent_timeout_secs: 600,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            max_turns: self.max_turns,
            reply_budget: Duration::from_secs(self.agent_timeout_secs),
        }
    }
}

impl MigraConfig {
    /// Load from the resolved path, or defaults when there is none
    pub fn load() -> Result<Self, ConfigError> {
        match resolve_path(std::env::var_os(CONFIG_ENV).map(PathBuf::from), Path::new(".")) {
            Some(path) => Self::from_path(&path),
            None => {
                tracing::debug!("no config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "config_loaded");
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Reject values that would make a session meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.max_turns == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.max_turns",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.session.agent_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.agent_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature",
                reason: format!("{} is outside 0.0..=2.0", self.llm.temperature),
            });
        }
        Ok(())
    }
}

/// Explicit path wins; otherwise `migra.toml` under `dir` if it exists
#[must_use]
pub fn resolve_path(explicit: Option<PathBuf>, dir: &Path) -> Option<PathBuf> {
    explicit.or_else(|| {
        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        candidate.is_file().then_some(candidate)
    })
}
