// ABOUTME: Typed configuration records for sources, destinations, watch timing and credentials
// ABOUTME: YAML is parsed and validated once; every problem surfaces as Error::Config

use crate::frontmatter::FrontmatterMapping;
use crate::model::{LlmOptions, OAuthCredentials};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.yaml";

/// Shortest poll interval allowed against the remote API.
pub const MIN_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BloggerConfig {
    pub name: String,
    pub blog_url: String,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub generate_llm_descriptions: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarkdownConfig {
    pub name: String,
    #[serde(default)]
    pub content_dir: Option<PathBuf>,
    #[serde(default)]
    pub git_dir: Option<PathBuf>,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub frontmatter_mapping: FrontmatterMapping,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PlatformConfig {
    Blogger(BloggerConfig),
    Markdown(MarkdownConfig),
}

impl PlatformConfig {
    pub fn name(&self) -> &str {
        match self {
            PlatformConfig::Blogger(c) => &c.name,
            PlatformConfig::Markdown(c) => &c.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub interval_secs: u64,
    pub cleanup_interval_secs: u64,
    pub retry: RetryConfig,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            interval_secs: 30,
            cleanup_interval_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

impl WatchConfig {
    /// Poll interval, raised to the minimum when configured lower.
    pub fn interval(&self) -> Duration {
        if self.interval_secs < MIN_INTERVAL_SECS {
            warn!(
                configured = self.interval_secs,
                minimum = MIN_INTERVAL_SECS,
                "Watch interval too short, using the minimum"
            );
            return Duration::from_secs(MIN_INTERVAL_SECS);
        }
        Duration::from_secs(self.interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub blogger_base_url: Option<String>,
    pub token_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sources: Vec<PlatformConfig>,
    #[serde(default)]
    pub destinations: Vec<PlatformConfig>,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

fn check_unique(kind: &str, entries: &[PlatformConfig]) -> Result<()> {
    let mut seen = HashSet::new();
    for entry in entries {
        if entry.name().trim().is_empty() {
            return Err(Error::Config(format!("every {} needs a non-empty name", kind)));
        }
        if !seen.insert(entry.name()) {
            return Err(Error::Config(format!(
                "{} name `{}` is configured more than once",
                kind,
                entry.name()
            )));
        }
    }
    Ok(())
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            let config = Config::default();
            config.validate()?;
            return Ok(config);
        }
        let config: Config = serde_yaml::from_str(text)
            .map_err(|e| Error::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_unique("source", &self.sources)?;
        check_unique("destination", &self.destinations)?;

        for entry in self.sources.iter().chain(&self.destinations) {
            if let PlatformConfig::Blogger(c) = entry {
                if c.blog_url.trim().is_empty() {
                    return Err(Error::Config(format!("`{}` needs a blog_url", c.name)));
                }
            }
        }
        for entry in &self.destinations {
            if let PlatformConfig::Markdown(c) = entry {
                if c.content_dir.is_none() {
                    return Err(Error::Config(format!(
                        "markdown destination `{}` needs a content_dir",
                        c.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn source(&self, name: &str) -> Option<&PlatformConfig> {
        self.sources.iter().find(|s| s.name() == name)
    }

    pub fn destination(&self, name: &str) -> Option<&PlatformConfig> {
        self.destinations.iter().find(|d| d.name() == name)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    info!(config_path = %path.display(), "Loading configuration");
    let text = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    let config = Config::from_yaml(&text)?;
    debug!(
        sources = config.sources.len(),
        destinations = config.destinations.len(),
        "Parsed configuration"
    );
    Ok(config)
}

/// Secrets, kept apart from `config.yaml`.
#[derive(Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub google_refresh_token: Option<String>,
    pub llm_provider: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("google_client_id", &self.google_client_id)
            .field("google_client_secret", &redacted(&self.google_client_secret))
            .field("google_refresh_token", &redacted(&self.google_refresh_token))
            .field("llm_provider", &self.llm_provider)
            .field("llm_base_url", &self.llm_base_url)
            .field("llm_api_key", &redacted(&self.llm_api_key))
            .field("llm_model", &self.llm_model)
            .finish()
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(String::from)
}

impl Credentials {
    /// Values set in `overrides` (flags, environment) win over the file.
    pub fn merge(self, overrides: Credentials) -> Credentials {
        let pick = |over: Option<String>, base: Option<String>| over.filter(|v| !v.is_empty()).or(base);
        Credentials {
            google_client_id: pick(overrides.google_client_id, self.google_client_id),
            google_client_secret: pick(overrides.google_client_secret, self.google_client_secret),
            google_refresh_token: pick(overrides.google_refresh_token, self.google_refresh_token),
            llm_provider: pick(overrides.llm_provider, self.llm_provider),
            llm_base_url: pick(overrides.llm_base_url, self.llm_base_url),
            llm_api_key: pick(overrides.llm_api_key, self.llm_api_key),
            llm_model: pick(overrides.llm_model, self.llm_model),
        }
    }

    /// Client id and secret are required; the refresh token may still be empty.
    pub fn oauth(&self) -> Result<OAuthCredentials> {
        Ok(OAuthCredentials {
            client_id: non_empty(&self.google_client_id)
                .ok_or(Error::MissingOption("google_client_id"))?,
            client_secret: non_empty(&self.google_client_secret)
                .ok_or(Error::MissingOption("google_client_secret"))?,
            refresh_token: non_empty(&self.google_refresh_token).unwrap_or_default(),
        })
    }

    pub fn llm(&self) -> Result<Option<LlmOptions>> {
        let Some(provider) = non_empty(&self.llm_provider) else {
            return Ok(None);
        };
        Ok(Some(LlmOptions {
            provider: provider.parse()?,
            base_url: non_empty(&self.llm_base_url),
            api_key: non_empty(&self.llm_api_key),
            model: non_empty(&self.llm_model),
        }))
    }
}

/// A missing credentials file is not an error: everything can come from flags.
pub fn load_credentials(path: &Path) -> Result<Credentials> {
    if !path.exists() {
        debug!(file = %path.display(), "No credentials file");
        return Ok(Credentials::default());
    }
    let text = fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Ok(Credentials::default());
    }
    serde_yaml::from_str(&text)
        .map_err(|e| Error::Config(format!("invalid credentials file {}: {}", path.display(), e)))
}
