//! Collection run configuration (plain values; no file or env parsing here)

use std::path::{Path, PathBuf};
use std::time::Duration;

use ayat_core::{BreakerConfig, ClientConfig, DEFAULT_REQUEST_TIMEOUT, MAX_WORKERS, MIN_WORKERS};

use crate::api::DEFAULT_BASE_URL;

/// Chapters in the corpus
pub const CHAPTER_COUNT: u16 = 114;

/// Request pacing, retry, and breaker knobs
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub min_delay: Duration,
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    /// How often a rate-limited request is re-issued before it counts as failed
    pub rate_limit_requeues: u32,
    pub breaker_threshold: u32,
    pub breaker_pause: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        let breaker = BreakerConfig::default();
        Self {
            min_delay: Duration::from_millis(300),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            rate_limit_requeues: 3,
            breaker_threshold: breaker.threshold,
            breaker_pause: breaker.pause,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub user_agent: String,
    /// Language for chapter names and resource listings
    pub language: String,
    /// Requested chapters; normalized to ascending, deduplicated order
    pub chapters: Vec<u16>,
    pub translations: Vec<u32>,
    pub tafsirs: Vec<u32>,
    /// Fan-out workers, also the initial breaker concurrency
    pub workers: usize,
    pub flush_threshold: usize,
    pub output: PathBuf,
    /// Skip chapters already complete in `output` and append to it
    pub resume: bool,
    pub include_metadata: bool,
    pub include_footnotes: bool,
    /// Abandon a chapter when any commentary fetch fails (404 excepted)
    pub require_tafsir: bool,
    /// Whether an empty string satisfies a required field when resuming
    pub empty_is_present: bool,
    /// Failure ratio above which a fan-out batch is reported as degraded
    pub max_failure_ratio: f64,
    pub http: HttpSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: format!("ayat/{}", env!("CARGO_PKG_VERSION")),
            language: "en".to_string(),
            chapters: (1..=CHAPTER_COUNT).collect(),
            translations: vec![131, 85],
            tafsirs: Vec::new(),
            workers: 3,
            flush_threshold: 50,
            output: PathBuf::from("quran_data.jsonl"),
            resume: false,
            include_metadata: true,
            include_footnotes: true,
            require_tafsir: false,
            empty_is_present: true,
            max_failure_ratio: 0.5,
            http: HttpSettings::default(),
        }
    }
}

impl Config {
    /// Check ranges and normalize the chapter list.
    pub fn validate(&mut self) -> anyhow::Result<()> {
        self.chapters.sort_unstable();
        self.chapters.dedup();
        anyhow::ensure!(!self.chapters.is_empty(), "No chapters requested");
        if let Some(bad) = self
            .chapters
            .iter()
            .find(|&&c| c == 0 || c > CHAPTER_COUNT)
        {
            anyhow::bail!("Chapter {bad} out of range 1-{CHAPTER_COUNT}");
        }
        anyhow::ensure!(
            (MIN_WORKERS..=MAX_WORKERS).contains(&self.workers),
            "workers must be between {MIN_WORKERS} and {MAX_WORKERS}, got {}",
            self.workers
        );
        anyhow::ensure!(self.flush_threshold >= 1, "flush threshold must be at least 1");
        anyhow::ensure!(
            !self.translations.is_empty(),
            "At least one translation id is required"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.max_failure_ratio),
            "max failure ratio must be within 0.0-1.0"
        );
        anyhow::ensure!(
            !(self.require_tafsir && self.tafsirs.is_empty()),
            "require_tafsir is set but no tafsir ids were given"
        );
        anyhow::ensure!(
            self.http.breaker_threshold >= 1,
            "breaker threshold must be at least 1"
        );
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            min_delay: self.http.min_delay,
            max_retries: self.http.max_retries,
            backoff_base: self.http.backoff_base,
            breaker: BreakerConfig {
                concurrency: self.workers,
                threshold: self.http.breaker_threshold,
                pause: self.http.breaker_pause,
            },
        }
    }

    /// Sidecar file for the failure audit: `<output>.errors.json`
    pub fn audit_path(&self) -> PathBuf {
        audit_path_for(&self.output)
    }
}

pub fn audit_path_for(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".errors.json");
    PathBuf::from(name)
}

/// Inclusive chapter range, clamped to the corpus
pub fn chapter_range(start: u16, end: u16) -> Vec<u16> {
    let start = start.max(1);
    let end = end.min(CHAPTER_COUNT);
    (start..=end).collect()
}
