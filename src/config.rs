use anyhow::{anyhow, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for repoarchive
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Working trees to auto-commit and mirror
    #[serde(default)]
    pub sources: Vec<String>,

    /// Master archive repository receiving the mirrors
    pub archive: String,

    /// Push behaviour after commits
    #[serde(default)]
    pub push: PushConfig,

    /// Periodic runner settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Push toggles, one for the source trees and one for the archive
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct PushConfig {
    /// Push each source tree after an auto commit
    #[serde(default)]
    pub sources: bool,

    /// Push the archive after a mirror commit
    #[serde(default)]
    pub archive: bool,
}

/// Watch mode configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatchConfig {
    /// Interval between runs
    #[serde(default = "default_interval")]
    pub interval: String, // "1h"
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"

    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,
}

/// Command-line values layered over the loaded file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub sources: Vec<String>,
    pub archive: Option<String>,
    pub push: bool,
    pub push_archive: bool,
    pub interval: Option<String>,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_interval() -> String {
    "1h".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            color: default_true(),
        }
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let mut config = Self::default();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }

            config.save(&config_path)?;
            tracing::info!("Created default configuration at: {:?}", config_path);

            config.expand_paths()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("repoarchive").join("config.yml"))
    }

    /// Expand `~` and environment variables in every configured path
    pub fn expand_paths(&mut self) -> Result<()> {
        self.sources = expand_all(&self.sources)?;
        self.archive = expand(&self.archive).context("Failed to expand archive path")?;
        Ok(())
    }

    /// Layer command-line values over the file. Sources given on the command
    /// line replace the configured list rather than extending it. Only the
    /// new values are expanded; the loaded ones already were.
    pub fn apply_overrides(&mut self, overrides: Overrides) -> Result<()> {
        if !overrides.sources.is_empty() {
            self.sources = expand_all(&overrides.sources)?;
        }
        if let Some(archive) = overrides.archive {
            self.archive = expand(&archive).context("Failed to expand archive override")?;
        }
        if let Some(interval) = overrides.interval {
            self.watch.interval = interval;
        }
        self.push.sources |= overrides.push;
        self.push.archive |= overrides.push_archive;

        Ok(())
    }

    pub fn source_paths(&self) -> Vec<PathBuf> {
        self.sources.iter().map(PathBuf::from).collect()
    }

    pub fn archive_path(&self) -> PathBuf {
        PathBuf::from(&self.archive)
    }

    /// Parsed `watch.interval`
    pub fn watch_interval(&self) -> Result<Duration> {
        let secs = parse_interval(&self.watch.interval)?;
        if secs == 0 {
            return Err(anyhow!("Watch interval must be greater than zero"));
        }
        Ok(Duration::from_secs(secs))
    }
}

fn expand(path: &str) -> Result<String> {
    Ok(shellexpand::full(path)?.into_owned())
}

fn expand_all(paths: &[String]) -> Result<Vec<String>> {
    paths
        .iter()
        .map(|path| expand(path).with_context(|| format!("Failed to expand source path: {}", path)))
        .collect()
}

/// Parse duration strings like "30m", "1h", "2d" into seconds
pub fn parse_interval(duration_str: &str) -> Result<u64> {
    let duration_str = duration_str.trim().to_lowercase();

    if let Some(value) = duration_str.strip_suffix('s') {
        value.parse::<u64>().context("Invalid seconds value")
    } else if let Some(value) = duration_str.strip_suffix('m') {
        value.parse::<u64>().map(|v| v * 60).context("Invalid minutes value")
    } else if let Some(value) = duration_str.strip_suffix('h') {
        value.parse::<u64>().map(|v| v * 3600).context("Invalid hours value")
    } else if let Some(value) = duration_str.strip_suffix('d') {
        value.parse::<u64>().map(|v| v * 86400).context("Invalid days value")
    } else {
        duration_str
            .parse::<u64>()
            .context("Invalid duration format. Use format like '30m', '1h', '2d'")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            archive: "${HOME}/archive".to_string(),
            push: PushConfig::default(),
            watch: WatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
