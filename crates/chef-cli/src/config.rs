//! Configuration file management for chef.
//!
//! A TOML config file lives at `~/.config/chef/config.toml`. Values resolve
//! through the chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use chef_core::generation::HttpGeneratorConfig;
use chef_core::settings::Settings;
use chef_db::config::DbConfig;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 90;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: DbConfig::DEFAULT_URL.to_owned(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    /// Base URL of an OpenAI-compatible API.
    pub endpoint: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// `$XDG_CONFIG_HOME/chef` or `~/.config/chef`, on every platform.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("chef");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("chef")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

/// Write the config file, creating parent dirs as needed. The file may
/// hold an API key, so it is made owner-only on Unix.
pub fn save_config_to(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

#[derive(Debug)]
pub struct ChefConfig {
    pub db_config: DbConfig,
    pub generation: HttpGeneratorConfig,
    pub settings: Settings,
}

impl ChefConfig {
    /// Resolve from the CLI flag, the process environment and the config
    /// file at [`config_path`], if present.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let path = config_path();
        let file = if path.exists() {
            Some(load_config_from(&path)?)
        } else {
            None
        };
        Ok(Self::resolve_with(cli_db_url, |key| std::env::var(key).ok(), file))
    }

    /// - DB URL: `cli_db_url` > `CHEF_DATABASE_URL` > `database.url` > default
    /// - endpoint, model, api key: `CHEF_GENERATION_ENDPOINT`,
    ///   `CHEF_GENERATION_MODEL`, `CHEF_API_KEY` > `[generation]` > default
    /// - settings: `[settings]` > default
    pub fn resolve_with(
        cli_db_url: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
        file: Option<ConfigFile>,
    ) -> Self {
        let file = file.unwrap_or_default();

        let db_url = cli_db_url
            .map(str::to_owned)
            .or_else(|| env("CHEF_DATABASE_URL"))
            .unwrap_or(file.database.url);

        let generation = HttpGeneratorConfig {
            endpoint: env("CHEF_GENERATION_ENDPOINT").unwrap_or(file.generation.endpoint),
            model: env("CHEF_GENERATION_MODEL").unwrap_or(file.generation.model),
            api_key: env("CHEF_API_KEY").or(file.generation.api_key),
            request_timeout: Duration::from_secs(file.generation.timeout_secs.max(1)),
        };

        Self {
            db_config: DbConfig::new(db_url),
            generation,
            settings: file.settings,
        }
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
