//! Run statistics, failure audit, and summary reporting.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use ayat_core::{BreakerSnapshot, fmt_num};
use comfy_table::{Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureScope {
    Chapter,
    Tafsir,
    Footnote,
}

/// One audited failure, identifying what a resumed run has to redo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub scope: FailureScope,
    pub chapter: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verse_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<u64>,
    pub message: String,
}

impl FailureRecord {
    pub fn chapter(chapter: u16, message: impl Into<String>) -> Self {
        Self {
            scope: FailureScope::Chapter,
            chapter,
            verse_key: None,
            resource_id: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollectStats {
    pub chapters_requested: usize,
    pub chapters_skipped: usize,
    pub chapters_completed: usize,
    pub chapters_failed: usize,
    pub verses_written: usize,
    pub tafsirs_fetched: usize,
    pub tafsirs_not_found: usize,
    pub tafsirs_failed: usize,
    pub footnotes_fetched: usize,
    pub footnotes_failed: usize,
    /// Fan-out batches whose failure ratio exceeded the limit
    pub degraded_batches: usize,
    pub breaker_trips: u32,
    pub final_concurrency: usize,
    pub elapsed: Duration,
    pub failures: Vec<FailureRecord>,
}

impl CollectStats {
    pub fn record_breaker(&mut self, snapshot: BreakerSnapshot) {
        self.breaker_trips = snapshot.trips;
        self.final_concurrency = snapshot.concurrency;
    }

    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Collection")
                    .fg(Color::Cyan)
                    .add_attribute(Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
            ]);

        let mut row = |label: &str, value: String| {
            table.add_row(vec![Cell::new(label), Cell::new(value)]);
        };
        row(
            "Chapters",
            format!(
                "{}/{} ({} skipped, {} failed)",
                self.chapters_completed,
                self.chapters_requested,
                self.chapters_skipped,
                self.chapters_failed
            ),
        );
        row("Verses written", fmt_num(self.verses_written));
        row(
            "Tafsirs",
            format!(
                "{} fetched, {} not found, {} failed",
                fmt_num(self.tafsirs_fetched),
                fmt_num(self.tafsirs_not_found),
                fmt_num(self.tafsirs_failed)
            ),
        );
        row(
            "Footnotes",
            format!(
                "{} fetched, {} failed",
                fmt_num(self.footnotes_fetched),
                fmt_num(self.footnotes_failed)
            ),
        );
        row("Degraded batches", self.degraded_batches.to_string());
        row(
            "Breaker",
            format!(
                "{} trip(s), concurrency {}",
                self.breaker_trips, self.final_concurrency
            ),
        );
        row("Elapsed", format!("{:.1}s", self.elapsed.as_secs_f64()));
        table.to_string()
    }

    pub fn print(&self) {
        eprintln!("\n{}", self.format_table());
    }

    pub fn log(&self) {
        log::info!(
            "Collected {}/{} chapters ({} skipped, {} failed), {} verses in {:.1}s",
            self.chapters_completed,
            self.chapters_requested,
            self.chapters_skipped,
            self.chapters_failed,
            fmt_num(self.verses_written),
            self.elapsed.as_secs_f64()
        );
        log::info!(
            "Tafsirs: {} fetched, {} not found, {} failed; footnotes: {} fetched, {} failed",
            self.tafsirs_fetched,
            self.tafsirs_not_found,
            self.tafsirs_failed,
            self.footnotes_fetched,
            self.footnotes_failed
        );
        if self.breaker_trips > 0 {
            log::info!(
                "Breaker tripped {} time(s), final concurrency {}",
                self.breaker_trips,
                self.final_concurrency
            );
        }
    }
}

/// Write failures as a JSON array to `path`, or remove a stale file when
/// there were none. Returns whether a file was written.
pub fn write_audit(path: &Path, failures: &[FailureRecord]) -> anyhow::Result<bool> {
    if failures.is_empty() {
        match std::fs::remove_file(path) {
            Ok(()) => log::debug!("Removed stale {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("Cannot remove {}", path.display())),
        }
        return Ok(false);
    }
    let json = serde_json::to_string_pretty(failures).context("Cannot encode failure audit")?;
    std::fs::write(path, json + "\n")
        .with_context(|| format!("Cannot write {}", path.display()))?;
    log::warn!("{} failure(s) recorded in {}", failures.len(), path.display());
    Ok(true)
}
