//! Configuration file parser for ~/.config/udnews/config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`,
//! which runs the pipeline with an in-memory store and no sources. Unknown
//! keys are accepted (with `deny_unknown_fields` off), though we log a
//! warning when the file contains potential typos.
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    /// Feeds to ingest, in the order runs should visit them.
    pub sources: Vec<SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            ingest: IngestConfig::default(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Database file path; only meaningful for the sqlite backend.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: "udnews.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Minutes between scheduled runs.
    pub refresh_interval_minutes: u64,

    /// Seconds to wait after startup before the first run, so the process
    /// finishes coming up before it starts hitting the network.
    pub startup_delay_seconds: u64,

    /// Per-source fetch budget in seconds.
    pub fetch_timeout_seconds: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            refresh_interval_minutes: 30,
            startup_delay_seconds: 5,
            fetch_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted (serde default behavior), logged as warning
    /// - Sources with unparseable URLs → dropped with a warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = ["store", "ingest", "sources"];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let mut config: Config = toml::from_str(&content)?;

        config.sources.retain(|source| {
            match url::Url::parse(&source.url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => true,
                _ => {
                    tracing::warn!(
                        name = %source.name,
                        url = %source.url,
                        "Source has an invalid feed URL, dropping"
                    );
                    false
                }
            }
        });

        tracing::info!(
            path = %path.display(),
            sources = config.sources.len(),
            "Loaded configuration"
        );
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
