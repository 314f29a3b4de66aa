use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result, anyhow, bail};

use crate::client::HttpCompletionClient;
use crate::dispatcher::{ChatSettings, ReplyFormat, SendPolicy};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_MAX_TOKENS: u32 = 100;

pub const ENDPOINT_ENV: &str = "CHATBOX_ENDPOINT";
pub const API_KEY_ENV: &str = "CHATBOX_API_KEY";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub reply_format: Option<ReplyFormat>,
    pub send_policy: Option<SendPolicy>,
    pub clear_input_on_send: Option<bool>,
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the default location, falling back to defaults if absent
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Environment variables win over file values
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENDPOINT_ENV) {
            self.endpoint = Some(endpoint);
        }
        if let Some(key) = lookup(API_KEY_ENV) {
            self.api_key = Some(key);
        }
        self
    }

    /// Endpoint and token are required; there are no defaults for either.
    pub fn validate(&self) -> Result<()> {
        match self.endpoint.as_deref().map(str::trim) {
            None | Some("") => bail!(
                "no completion endpoint configured (set \"endpoint\" in the config file, {} or --endpoint)",
                ENDPOINT_ENV
            ),
            Some(endpoint) => {
                reqwest::Url::parse(endpoint)
                    .with_context(|| format!("invalid completion endpoint {:?}", endpoint))?;
            }
        }

        match self.api_key.as_deref().map(str::trim) {
            None | Some("") => bail!(
                "no API key configured (set \"api_key\" in the config file or {})",
                API_KEY_ENV
            ),
            Some(_) => {}
        }

        if self.max_tokens == Some(0) {
            bail!("max_tokens must be greater than zero");
        }

        Ok(())
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            model: self.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            reply_format: self.reply_format.unwrap_or_default(),
            send_policy: self.send_policy.unwrap_or_default(),
        }
    }

    pub fn clear_input_on_send(&self) -> bool {
        self.clear_input_on_send.unwrap_or(true)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn build_client(&self) -> Result<HttpCompletionClient> {
        self.validate()?;
        let endpoint = self.endpoint.as_deref().ok_or_else(|| anyhow!("endpoint missing"))?.trim();
        let api_key = self.api_key.as_deref().ok_or_else(|| anyhow!("api key missing"))?.trim();

        match self.request_timeout() {
            Some(timeout) => HttpCompletionClient::with_timeout(endpoint, api_key, timeout),
            None => Ok(HttpCompletionClient::new(endpoint, api_key)),
        }
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("chatbox").join("config.json"))
    }
}
