//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// File-level settings. Every field is optional in the file; command-line
/// flags override whatever is loaded here.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub collect: CollectConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub language: String,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let engine = ayat_quran::Config::default();
        Self {
            base_url: engine.base_url,
            language: engine.language,
            user_agent: engine.user_agent,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    pub output: PathBuf,
    pub translations: Vec<u32>,
    pub tafsirs: Vec<u32>,
    pub workers: usize,
    pub flush_threshold: usize,
    pub include_metadata: bool,
    pub include_footnotes: bool,
    pub require_tafsir: bool,
    pub empty_is_present: bool,
    pub max_failure_ratio: f64,
}

impl Default for CollectConfig {
    fn default() -> Self {
        let engine = ayat_quran::Config::default();
        Self {
            output: engine.output,
            translations: engine.translations,
            tafsirs: engine.tafsirs,
            workers: engine.workers,
            flush_threshold: engine.flush_threshold,
            include_metadata: engine.include_metadata,
            include_footnotes: engine.include_footnotes,
            require_tafsir: engine.require_tafsir,
            empty_is_present: engine.empty_is_present,
            max_failure_ratio: engine.max_failure_ratio,
        }
    }
}

/// Durations are plain integers in the file
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub min_delay_ms: u64,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub rate_limit_requeues: u32,
    pub breaker_threshold: u32,
    pub breaker_pause_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let http = ayat_quran::HttpSettings::default();
        Self {
            min_delay_ms: http.min_delay.as_millis() as u64,
            timeout_secs: http.timeout.as_secs(),
            max_retries: http.max_retries,
            backoff_ms: http.backoff_base.as_millis() as u64,
            rate_limit_requeues: http.rate_limit_requeues,
            breaker_threshold: http.breaker_threshold,
            breaker_pause_secs: http.breaker_pause.as_secs(),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./ayat.toml (current directory)
    /// 2. ~/.config/ayat/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("ayat.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "ayat") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Engine settings before command-line overrides. Covers every chapter.
    pub fn engine(&self) -> ayat_quran::Config {
        ayat_quran::Config {
            base_url: self.api.base_url.clone(),
            user_agent: self.api.user_agent.clone(),
            language: self.api.language.clone(),
            translations: self.collect.translations.clone(),
            tafsirs: self.collect.tafsirs.clone(),
            workers: self.collect.workers,
            flush_threshold: self.collect.flush_threshold,
            output: self.collect.output.clone(),
            include_metadata: self.collect.include_metadata,
            include_footnotes: self.collect.include_footnotes,
            require_tafsir: self.collect.require_tafsir,
            empty_is_present: self.collect.empty_is_present,
            max_failure_ratio: self.collect.max_failure_ratio,
            http: ayat_quran::HttpSettings {
                min_delay: Duration::from_millis(self.http.min_delay_ms),
                timeout: Duration::from_secs(self.http.timeout_secs),
                max_retries: self.http.max_retries,
                backoff_base: Duration::from_millis(self.http.backoff_ms),
                rate_limit_requeues: self.http.rate_limit_requeues,
                breaker_threshold: self.http.breaker_threshold,
                breaker_pause: Duration::from_secs(self.http.breaker_pause_secs),
            },
            ..ayat_quran::Config::default()
        }
    }
}
