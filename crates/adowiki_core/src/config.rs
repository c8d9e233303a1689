use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_VERSION: &str = "7.1-preview.2";
pub const DEFAULT_BASE_URL: &str = "https://dev.azure.com";
pub const DEFAULT_SEARCH_URL: &str = "https://almsearch.dev.azure.com";

pub const ENV_ORGANIZATION: &str = "AZURE_DEVOPS_ORG";
pub const ENV_PROJECT: &str = "AZURE_DEVOPS_PROJECT";
pub const ENV_TOKEN: &str = "AZURE_DEVOPS_PAT";
pub const ENV_API_VERSION: &str = "AZURE_DEVOPS_API_VERSION";
pub const ENV_BASE_URL: &str = "AZURE_DEVOPS_BASE_URL";
pub const ENV_SEARCH_URL: &str = "AZURE_DEVOPS_SEARCH_URL";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiConfig {
    #[serde(default)]
    pub azure: AzureSection,
}

/// `[azure]` section of the optional config file. The access token is
/// intentionally absent: it is only ever read from the environment.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct AzureSection {
    pub organization: Option<String>,
    pub project: Option<String>,
    pub api_version: Option<String>,
    pub base_url: Option<String>,
    pub search_url: Option<String>,
}

/// Load and parse a WikiConfig from a TOML file. Returns default if the file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<WikiConfig> {
    if !config_path.exists() {
        return Ok(WikiConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: WikiConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Fully resolved connection settings, immutable for the lifetime of a
/// client. Missing credentials are a startup error, not a per-request
/// condition.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub organization: String,
    pub project: String,
    pub token: String,
    pub api_version: String,
    pub base_url: String,
    pub search_url: String,
}

impl ClientSettings {
    pub fn from_env() -> Result<Self> {
        Self::resolve(&WikiConfig::default())
    }

    /// Resolve settings with env-over-file precedence.
    pub fn resolve(config: &WikiConfig) -> Result<Self> {
        Self::resolve_with(config, |key| env::var(key).ok())
    }

    fn resolve_with<F>(config: &WikiConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let organization = pick(&lookup, ENV_ORGANIZATION, config.azure.organization.as_deref());
        let project = pick(&lookup, ENV_PROJECT, config.azure.project.as_deref());
        let token = pick(&lookup, ENV_TOKEN, None);

        if organization.is_empty() || project.is_empty() || token.is_empty() {
            bail!(
                "organization, project, and access token must all be set \
                 ({ENV_ORGANIZATION} / {ENV_PROJECT} / {ENV_TOKEN}, or the [azure] config section)"
            );
        }

        let api_version = non_empty_or(
            pick(&lookup, ENV_API_VERSION, config.azure.api_version.as_deref()),
            DEFAULT_API_VERSION,
        );
        let base_url = non_empty_or(
            pick(&lookup, ENV_BASE_URL, config.azure.base_url.as_deref()),
            DEFAULT_BASE_URL,
        );
        let search_url = non_empty_or(
            pick(&lookup, ENV_SEARCH_URL, config.azure.search_url.as_deref()),
            DEFAULT_SEARCH_URL,
        );

        Ok(Self {
            organization,
            project,
            token,
            api_version,
            base_url: base_url.trim_end_matches('/').to_string(),
            search_url: search_url.trim_end_matches('/').to_string(),
        })
    }
}

// The token must never reach logs or diagnostics output in full.
impl fmt::Debug for ClientSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ClientSettings")
            .field("organization", &self.organization)
            .field("project", &self.project)
            .field("token", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("base_url", &self.base_url)
            .field("search_url", &self.search_url)
            .finish()
    }
}

fn pick<F>(lookup: &F, env_key: &str, config_value: Option<&str>) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(env_key) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    config_value.map(str::trim).unwrap_or_default().to_string()
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}
