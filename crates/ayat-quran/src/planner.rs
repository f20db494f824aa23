//! Resume planning from an existing ledger.
//!
//! The ledger is a log: a redone chapter is appended again, so the last
//! occurrence of each verse key wins. A chapter is complete when every
//! expected verse is present and carries every requested translation and
//! commentary source. Anything less is redone in full, since the ledger
//! cannot be patched in place.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use ayat_core::{LedgerError, scan};
use serde::Deserialize;

use crate::record::{ChapterTask, parse_verse_key};

/// Fields a stored verse must carry to count toward a complete chapter.
#[derive(Debug, Clone, Default)]
pub struct FieldRequirements {
    /// Translator names
    pub translations: Vec<String>,
    /// Commentary source names
    pub tafsirs: Vec<String>,
    /// Whether an empty string counts as present
    pub empty_is_present: bool,
}

/// The subset of a ledger line the planner needs.
#[derive(Debug, Deserialize)]
struct LedgerEntry {
    #[serde(alias = "verse_id")]
    verse_key: String,
    #[serde(default)]
    translations: BTreeMap<String, Option<String>>,
    #[serde(default)]
    tafsirs: BTreeMap<String, Option<String>>,
}

impl FieldRequirements {
    fn text_present(&self, value: &str) -> bool {
        self.empty_is_present || !value.is_empty()
    }

    /// A `null` commentary is an upstream "none for this verse" and counts
    /// as present; a `null` translation does not.
    fn satisfied_by(&self, entry: &LedgerEntry) -> bool {
        let translations_ok = self.translations.iter().all(|name| {
            matches!(entry.translations.get(name), Some(Some(text)) if self.text_present(text))
        });
        let tafsirs_ok = self.tafsirs.iter().all(|name| match entry.tafsirs.get(name) {
            Some(Some(text)) => self.text_present(text),
            Some(None) => true,
            None => false,
        });
        translations_ok && tafsirs_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterStatus {
    Complete,
    Partial,
    Untouched,
}

#[derive(Debug, Default)]
pub struct ResumePlan {
    /// Chapters to collect, ascending
    pub tasks: Vec<ChapterTask>,
    pub complete: Vec<u16>,
    pub partial: Vec<u16>,
    pub untouched: Vec<u16>,
    /// Ledger lines that could not be parsed
    pub skipped_lines: usize,
}

impl ResumePlan {
    pub fn chapters(&self) -> Vec<u16> {
        self.tasks.iter().map(ChapterTask::number).collect()
    }

    pub fn log(&self) {
        log::info!(
            "Resume plan: {} complete, {} partial, {} untouched -> {} chapter(s) to collect",
            self.complete.len(),
            self.partial.len(),
            self.untouched.len(),
            self.tasks.len()
        );
        if !self.partial.is_empty() {
            log::info!("Redoing partial chapters: {:?}", self.partial);
        }
    }
}

/// Per-chapter view of the ledger: verse number -> whether its last
/// occurrence satisfied the requirements.
type Observed = HashMap<u16, HashMap<u16, bool>>;

fn observe(entries: &[LedgerEntry], requirements: &FieldRequirements) -> Observed {
    let mut observed: Observed = HashMap::new();
    for entry in entries {
        let Some((chapter, verse)) = parse_verse_key(&entry.verse_key) else {
            log::debug!("Ignoring ledger line with key {:?}", entry.verse_key);
            continue;
        };
        observed
            .entry(chapter)
            .or_default()
            .insert(verse, requirements.satisfied_by(entry));
    }
    observed
}

fn classify(verses: Option<&HashMap<u16, bool>>, expected: u16) -> ChapterStatus {
    let Some(verses) = verses else {
        return ChapterStatus::Untouched;
    };
    let mut present = 0u16;
    for n in 1..=expected {
        match verses.get(&n) {
            Some(true) => present += 1,
            Some(false) => return ChapterStatus::Partial,
            None => {}
        }
    }
    if present == expected {
        ChapterStatus::Complete
    } else {
        ChapterStatus::Partial
    }
}

/// Work out which of `requested` still need collecting.
///
/// A missing ledger yields every requested chapter as untouched.
pub fn plan(
    ledger: &Path,
    requested: &[ChapterTask],
    requirements: &FieldRequirements,
) -> Result<ResumePlan, LedgerError> {
    let (entries, skipped_lines) = match scan::<LedgerEntry>(ledger)? {
        Some(scan) => {
            log::debug!(
                "{}: {} ledger line(s) scanned",
                ledger.display(),
                scan.lines
            );
            (scan.entries, scan.skipped_lines)
        }
        None => {
            log::info!("{} not found, starting fresh", ledger.display());
            (Vec::new(), 0)
        }
    };
    let observed = observe(&entries, requirements);

    let mut ordered: Vec<&ChapterTask> = requested.iter().collect();
    ordered.sort_by_key(|t| t.number());
    ordered.dedup_by_key(|t| t.number());

    let mut plan = ResumePlan {
        skipped_lines,
        ..Default::default()
    };
    for task in ordered {
        let number = task.number();
        match classify(observed.get(&number), task.expected_verses()) {
            ChapterStatus::Complete => plan.complete.push(number),
            ChapterStatus::Partial => {
                plan.partial.push(number);
                plan.tasks.push(task.clone());
            }
            ChapterStatus::Untouched => {
                plan.untouched.push(number);
                plan.tasks.push(task.clone());
            }
        }
    }
    Ok(plan)
}
