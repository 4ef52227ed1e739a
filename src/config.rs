use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::dedup::DEFAULT_MAX_ENTRIES;

const SESSION_KEY: &str = "SESSION_STRING";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_id: i32,
    pub api_hash: String,
    /// Saved account session; `None` means an interactive login is needed.
    pub session_string: Option<String>,
    pub bot_token: String,
    pub monitored_chats: Vec<String>,
    pub filter_keywords: Vec<String>,
    pub dedup: DedupConfig,
    /// Env file the session gets written back to.
    pub env_path: PathBuf,
}

/// Optional tuning loaded from the TOML settings file
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub dedup: DedupConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DedupConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Cron expression (with seconds) for the processed-id sweep.
    #[serde(default = "default_sweep_schedule")]
    pub sweep_schedule: String,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            sweep_schedule: default_sweep_schedule(),
        }
    }
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_sweep_schedule() -> String {
    "0 0 * * * *".to_string()
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("relay.toml")
}

/// Split a comma-separated option, trimming entries and dropping blanks.
fn split_list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }
}

impl Config {
    /// Load the env file into the process environment, then read options.
    pub fn load(env_path: &Path) -> Result<Self> {
        if env_path.exists() {
            dotenvy::from_path(env_path)
                .with_context(|| format!("Failed to read env file: {}", env_path.display()))?;
        }

        let lookup = |key: &str| std::env::var(key).ok();
        let settings_path = lookup("RELAY_SETTINGS")
            .map(PathBuf::from)
            .unwrap_or_else(default_settings_path);
        let settings = Settings::load(&settings_path)?;

        Self::from_lookup(lookup, settings, env_path.to_path_buf())
    }

    pub fn from_lookup<F>(lookup: F, settings: Settings, env_path: PathBuf) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_id = non_empty(lookup("API_ID")).context("API_ID is not set")?;
        let api_id: i32 = api_id
            .parse()
            .with_context(|| format!("API_ID must be a number, got '{}'", api_id))?;
        let api_hash = non_empty(lookup("API_HASH")).context("API_HASH is not set")?;
        let bot_token = non_empty(lookup("BOT_TOKEN")).context("BOT_TOKEN is not set")?;

        if settings.dedup.max_entries == 0 {
            bail!("dedup.max_entries must be greater than zero");
        }

        Ok(Self {
            api_id,
            api_hash,
            session_string: non_empty(lookup(SESSION_KEY)),
            bot_token,
            monitored_chats: split_list(lookup("MONITORED_CHAT_USERNAMES")),
            filter_keywords: split_list(lookup("FILTER_KEYWORDS"))
                .into_iter()
                .map(|k| k.to_lowercase())
                .collect(),
            dedup: settings.dedup,
            env_path,
        })
    }
}

/// Only a session created by an interactive login is written back, and
/// never over a `SESSION_STRING` supplied by the operator.
pub fn should_persist(created: bool, config: &Config) -> bool {
    created && config.session_string.is_none()
}

/// Write the session into the env file, replacing an existing
/// `SESSION_STRING=` line or appending one.
pub fn persist_session(env_path: &Path, session: &str) -> Result<()> {
    let content = if env_path.exists() {
        std::fs::read_to_string(env_path)
            .with_context(|| format!("Failed to read env file: {}", env_path.display()))?
    } else {
        String::new()
    };

    let line = format!("{}={}", SESSION_KEY, session);
    let mut replaced = false;
    let mut lines: Vec<String> = content
        .lines()
        .map(|existing| {
            if !replaced && existing.trim_start().starts_with(&format!("{}=", SESSION_KEY)) {
                replaced = true;
                line.clone()
            } else {
                existing.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(line);
    }

    let mut updated = lines.join("\n");
    updated.push('\n');
    std::fs::write(env_path, updated)
        .with_context(|| format!("Failed to write env file: {}", env_path.display()))?;
    Ok(())
}
