//! Plan subcommand - show what a resumed run would collect

use anyhow::Result;

use ayat_core::{SharedProgress, ShutdownToken};
use ayat_quran::runner::{connect, plan_only};

use super::collect::SelectionArgs;
use super::print_summary;
use crate::config::Config;

/// Compress ascending chapter numbers into ranges: `1-3, 5, 7-8`
fn fmt_chapters(chapters: &[u16]) -> String {
    if chapters.is_empty() {
        return "-".to_string();
    }
    let mut parts = Vec::new();
    let mut start = chapters[0];
    let mut prev = start;
    for &c in &chapters[1..] {
        if c == prev + 1 {
            prev = c;
            continue;
        }
        parts.push(span(start, prev));
        start = c;
        prev = c;
    }
    parts.push(span(start, prev));
    parts.join(", ")
}

fn span(start: u16, end: u16) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}-{end}")
    }
}

pub fn run(args: SelectionArgs, file: &Config, progress: &SharedProgress) -> Result<()> {
    let config = args.resolve(file)?;
    let api = connect(&config, ShutdownToken::new())?;
    let plan = plan_only(&api, &config)?;

    let rows = [
        ("Ledger", config.output.display().to_string()),
        ("Complete", fmt_chapters(&plan.complete)),
        ("Partial", fmt_chapters(&plan.partial)),
        ("Untouched", fmt_chapters(&plan.untouched)),
        ("To collect", plan.tasks.len().to_string()),
        ("Unreadable lines", plan.skipped_lines.to_string()),
    ];
    if progress.is_tty() {
        print_summary("Resume plan", &rows);
    } else {
        for (label, value) in &rows {
            log::info!("{label}: {value}");
        }
    }
    Ok(())
}
