//! Collect subcommand - harvest chapters into the output ledger

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Args;

use ayat_core::{SharedProgress, ShutdownToken};
use ayat_quran::chapter_range;

use crate::config::Config;

/// Inclusive `START-END` chapter span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChapterSpan {
    pub start: u16,
    pub end: u16,
}

fn parse_span(s: &str) -> Result<ChapterSpan, String> {
    let (start, end) = s
        .split_once('-')
        .ok_or_else(|| format!("Expected START-END, got {s:?}"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u16>()
            .map_err(|e| format!("Invalid chapter {v:?}: {e}"))
    };
    let span = ChapterSpan {
        start: parse(start)?,
        end: parse(end)?,
    };
    if span.start > span.end {
        return Err(format!("Empty range {s:?}"));
    }
    Ok(span)
}

/// What to collect and where it goes. Shared by `collect` and `plan`.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Chapters (comma-separated); default is all 114
    #[arg(long, value_delimiter = ',', conflicts_with = "range")]
    pub chapters: Option<Vec<u16>>,

    /// Inclusive chapter range, e.g. 2-10
    #[arg(long, value_parser = parse_span)]
    pub range: Option<ChapterSpan>,

    /// Translation resource ids (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub translations: Option<Vec<u32>>,

    /// Tafsir resource ids (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub tafsirs: Option<Vec<u32>>,

    /// Output JSONL file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Language for chapter names and resource listings
    #[arg(long)]
    pub language: Option<String>,

    /// When resuming, treat empty strings as missing fields
    #[arg(long)]
    pub empty_is_missing: bool,
}

impl SelectionArgs {
    fn apply(&self, config: &mut ayat_quran::Config) {
        if let Some(chapters) = &self.chapters {
            config.chapters = chapters.clone();
        } else if let Some(span) = self.range {
            config.chapters = chapter_range(span.start, span.end);
        }
        if let Some(translations) = &self.translations {
            config.translations = translations.clone();
        }
        if let Some(tafsirs) = &self.tafsirs {
            config.tafsirs = tafsirs.clone();
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(language) = &self.language {
            config.language = language.clone();
        }
        if self.empty_is_missing {
            config.empty_is_present = false;
        }
    }

    /// File settings with these flags on top, validated
    pub fn resolve(&self, file: &Config) -> Result<ayat_quran::Config> {
        let mut config = file.engine();
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct CollectArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Number of parallel workers for commentary and footnotes (1-10)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Verses buffered before each write
    #[arg(long)]
    pub flush_every: Option<usize>,

    /// Skip chapters already complete in the output and append the rest
    #[arg(long)]
    pub resume: bool,

    /// Omit juz/page/hizb metadata from records
    #[arg(long)]
    pub no_metadata: bool,

    /// Do not fetch footnote texts
    #[arg(long)]
    pub no_footnotes: bool,

    /// Abandon a chapter when any commentary request fails
    #[arg(long)]
    pub require_tafsir: bool,

    /// Minimum milliseconds between request starts
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Maximum retry attempts for transient failures
    #[arg(long)]
    pub max_retries: Option<u32>,
}

impl CollectArgs {
    pub fn resolve(&self, file: &Config) -> Result<ayat_quran::Config> {
        let mut config = file.engine();
        self.selection.apply(&mut config);
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(n) = self.flush_every {
            config.flush_threshold = n;
        }
        if let Some(ms) = self.delay_ms {
            config.http.min_delay = Duration::from_millis(ms);
        }
        if let Some(n) = self.max_retries {
            config.http.max_retries = n;
        }
        config.resume |= self.resume;
        config.include_metadata &= !self.no_metadata;
        config.include_footnotes &= !self.no_footnotes;
        config.require_tafsir |= self.require_tafsir;
        config.validate()?;
        Ok(config)
    }
}

pub fn run(config: &ayat_quran::Config, progress: SharedProgress, token: ShutdownToken) -> ExitCode {
    match ayat_quran::run(config, progress, token) {
        Ok(code) => code,
        Err(e) => {
            log::error!("Fatal error: {e:#}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_span() {
        assert_eq!(parse_span("2-10"), Ok(ChapterSpan { start: 2, end: 10 }));
        assert!(parse_span("10-2").is_err());
        assert!(parse_span("7").is_err());
        assert!(parse_span("a-3").is_err());
    }

    #[test]
    fn flags_override_file() {
        let file = Config::default();
        let args = CollectArgs {
            selection: SelectionArgs {
                range: Some(ChapterSpan { start: 110, end: 120 }),
                tafsirs: Some(vec![169]),
                ..Default::default()
            },
            workers: Some(6),
            resume: true,
            no_footnotes: true,
            delay_ms: Some(1000),
            ..Default::default()
        };
        let config = args.resolve(&file).unwrap();
        assert_eq!(config.chapters, vec![110, 111, 112, 113, 114]);
        assert_eq!(config.tafsirs, vec![169]);
        assert_eq!(config.workers, 6);
        assert!(config.resume);
        assert!(!config.include_footnotes);
        assert!(config.include_metadata);
        assert_eq!(config.http.min_delay, Duration::from_secs(1));
    }

    #[test]
    fn explicit_chapters_are_normalized() {
        let args = SelectionArgs {
            chapters: Some(vec![3, 1, 3]),
            ..Default::default()
        };
        let config = args.resolve(&Config::default()).unwrap();
        assert_eq!(config.chapters, vec![1, 3]);
    }

    #[test]
    fn invalid_settings_rejected() {
        let args = CollectArgs {
            workers: Some(11),
            ..Default::default()
        };
        assert!(args.resolve(&Config::default()).is_err());

        let args = CollectArgs {
            require_tafsir: true,
            ..Default::default()
        };
        assert!(args.resolve(&Config::default()).is_err());
    }
}
