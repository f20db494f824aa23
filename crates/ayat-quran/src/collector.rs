//! Chapter-by-chapter collection into the output ledger.
//!
//! The collector runs on one coordinating thread. For each chapter it
//! fetches the verse pages, fans out commentary and footnote requests,
//! merges everything into [`VerseRecord`]s, and only then hands the
//! records to the ledger buffer. Workers never touch the buffer.
//!
//! The shutdown token is checked before each chapter, between phases, and
//! before each verse is buffered. On interruption the buffer is flushed and
//! the partially processed chapter is left for the resume planner.

use ayat_core::{FetchError, Ledger, LedgerError, ShutdownToken, SharedProgress};

use crate::api::{QuranApi, Verse};
use crate::footnote::{extract_markers, footnote_key};
use crate::record::{ChapterTask, VerseRecord};
use crate::stats::{CollectStats, FailureRecord, FailureScope};
use crate::subresource::{
    SubContent, SubResource, SubResourceBatch, SubResourceFetcher, SubResourceKey,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Interrupted,
}

/// Failures that end a run. Everything already flushed stays valid.
#[derive(Debug)]
pub enum CollectError {
    /// Primary verse fetch failed after retries
    Chapter { chapter: u16, source: FetchError },
    /// Commentary was mandatory and some of it could not be fetched
    MissingCommentary { chapter: u16, failed: usize },
    Ledger(LedgerError),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chapter { chapter, source } => {
                write!(f, "chapter {chapter}: verse fetch failed: {source}")
            }
            Self::MissingCommentary { chapter, failed } => write!(
                f,
                "chapter {chapter}: {failed} mandatory commentary request(s) failed"
            ),
            Self::Ledger(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Chapter { source, .. } => Some(source),
            Self::Ledger(e) => Some(e),
            Self::MissingCommentary { .. } => None,
        }
    }
}

impl From<LedgerError> for CollectError {
    fn from(e: LedgerError) -> Self {
        Self::Ledger(e)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CollectorOptions {
    pub include_metadata: bool,
    pub include_footnotes: bool,
    pub require_tafsir: bool,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            include_metadata: true,
            include_footnotes: true,
            require_tafsir: false,
        }
    }
}

enum ChapterOutcome {
    Done,
    Interrupted,
}

pub struct Collector {
    api: QuranApi,
    fetcher: SubResourceFetcher,
    ledger: Ledger<VerseRecord>,
    progress: SharedProgress,
    options: CollectorOptions,
    stats: CollectStats,
}

impl Collector {
    pub fn new(
        api: QuranApi,
        fetcher: SubResourceFetcher,
        ledger: Ledger<VerseRecord>,
        progress: SharedProgress,
        options: CollectorOptions,
    ) -> Self {
        Self {
            api,
            fetcher,
            ledger,
            progress,
            options,
            stats: CollectStats::default(),
        }
    }

    fn token(&self) -> &ShutdownToken {
        self.api.client().token()
    }

    pub fn stats(&self) -> &CollectStats {
        &self.stats
    }

    pub fn into_stats(self) -> CollectStats {
        self.stats
    }

    /// Collect `tasks` in ascending chapter order.
    pub fn collect(&mut self, tasks: &[ChapterTask]) -> Result<Outcome, CollectError> {
        let mut ordered: Vec<&ChapterTask> = tasks.iter().collect();
        ordered.sort_by_key(|t| t.number());
        self.stats.chapters_requested += ordered.len();

        let pb = self.progress.chapter_bar(ordered.len() as u64);
        let result = self.collect_ordered(&ordered, &pb);
        pb.finish_and_clear();

        // Flush on every exit path; a ledger error here outranks the result
        let flushed = self.ledger.flush();
        self.stats.verses_written = self.ledger.written();
        self.stats.record_breaker(self.api.client().breaker().snapshot());
        flushed?;
        result
    }

    fn collect_ordered(
        &mut self,
        tasks: &[&ChapterTask],
        pb: &indicatif::ProgressBar,
    ) -> Result<Outcome, CollectError> {
        for task in tasks {
            if self.token().is_cancelled() {
                log::warn!("Shutdown requested, stopping before chapter {}", task.number());
                return Ok(Outcome::Interrupted);
            }
            pb.set_message(task.chapter.name_simple.clone());

            match self.collect_chapter(task) {
                Ok(ChapterOutcome::Done) => {
                    self.stats.chapters_completed += 1;
                    pb.inc(1);
                }
                Ok(ChapterOutcome::Interrupted) => {
                    log::warn!(
                        "Shutdown requested during chapter {}, it will be redone on resume",
                        task.number()
                    );
                    return Ok(Outcome::Interrupted);
                }
                Err(e) => {
                    self.stats.chapters_failed += 1;
                    if !matches!(e, CollectError::Ledger(_)) {
                        self.stats
                            .failures
                            .push(FailureRecord::chapter(task.number(), e.to_string()));
                    }
                    log::error!("{e}");
                    return Err(e);
                }
            }
        }
        Ok(Outcome::Completed)
    }

    fn collect_chapter(&mut self, task: &ChapterTask) -> Result<ChapterOutcome, CollectError> {
        let number = task.number();
        let resources = &task.resources;
        log::info!(
            "Collecting chapter {number}: {} ({} verses)",
            task.chapter.name_simple,
            task.expected_verses()
        );

        let verses = match self.api.chapter_verses(number, &resources.translation_ids()) {
            Ok(v) => v,
            Err(FetchError::Cancelled) => return Ok(ChapterOutcome::Interrupted),
            Err(source) => {
                return Err(CollectError::Chapter {
                    chapter: number,
                    source,
                });
            }
        };
        if self.token().is_cancelled() {
            return Ok(ChapterOutcome::Interrupted);
        }
        if verses.len() != usize::from(task.expected_verses()) {
            log::warn!(
                "chapter {number}: expected {} verses, API returned {}",
                task.expected_verses(),
                verses.len()
            );
        }

        let mut records: Vec<VerseRecord> = verses
            .iter()
            .map(|v| VerseRecord::from_verse(&task.chapter, v, resources, self.options.include_metadata))
            .collect();

        // Auxiliary requests
        let mut items = Vec::new();
        for record in &records {
            for tafsir in &resources.tafsirs {
                items.push(SubResource::Tafsir {
                    verse_key: record.verse_key.clone(),
                    tafsir: tafsir.clone(),
                });
            }
        }
        if self.options.include_footnotes {
            for (verse, record) in verses.iter().zip(&records) {
                for translation in &verse.translations {
                    let translator = resources.translation_name(translation.resource_id);
                    for marker in extract_markers(&translation.text) {
                        items.push(SubResource::Footnote {
                            verse_key: record.verse_key.clone(),
                            translator: translator.clone(),
                            number: marker.number,
                            id: marker.id,
                        });
                    }
                }
            }
        }

        if !items.is_empty() {
            let pb = self
                .progress
                .batch_bar(&format!("chapter {number}"), items.len() as u64);
            let batch = self.fetcher.fetch_all(&self.api, items, &pb);
            pb.finish_and_clear();
            if self.token().is_cancelled() {
                return Ok(ChapterOutcome::Interrupted);
            }
            if batch.degraded {
                self.stats.degraded_batches += 1;
            }

            if self.options.require_tafsir {
                let mut failed = 0;
                for (key, result) in &batch.report.results {
                    if let (SubResourceKey::Tafsir { verse_key, tafsir_id }, Err(e)) = (key, result) {
                        failed += 1;
                        self.stats.failures.push(FailureRecord {
                            scope: FailureScope::Tafsir,
                            chapter: number,
                            verse_key: Some(verse_key.clone()),
                            resource_id: Some(u64::from(*tafsir_id)),
                            message: e.to_string(),
                        });
                    }
                }
                if failed > 0 {
                    self.stats.tafsirs_failed += failed;
                    return Err(CollectError::MissingCommentary {
                        chapter: number,
                        failed,
                    });
                }
            }

            for (verse, record) in verses.iter().zip(records.iter_mut()) {
                self.merge_tafsirs(task, record, &batch);
                if self.options.include_footnotes {
                    self.merge_footnotes(task, verse, record, &batch);
                }
            }
        }

        for record in records {
            if self.token().is_cancelled() {
                return Ok(ChapterOutcome::Interrupted);
            }
            self.ledger.push(record)?;
        }
        Ok(ChapterOutcome::Done)
    }

    /// Failed sources are left out of the map; 404s are kept as `None`.
    fn merge_tafsirs(
        &mut self,
        task: &ChapterTask,
        record: &mut VerseRecord,
        batch: &SubResourceBatch,
    ) {
        for tafsir in &task.resources.tafsirs {
            let key = SubResourceKey::Tafsir {
                verse_key: record.verse_key.clone(),
                tafsir_id: tafsir.id,
            };
            match batch.get(&key) {
                Some(Ok(SubContent::Tafsir(text))) => {
                    if text.is_some() {
                        self.stats.tafsirs_fetched += 1;
                    } else {
                        self.stats.tafsirs_not_found += 1;
                    }
                    record.tafsirs.insert(tafsir.name.clone(), text.clone());
                }
                Some(Err(e)) => {
                    self.stats.tafsirs_failed += 1;
                    log::warn!("{}: tafsir {} failed: {e}", record.verse_key, tafsir.id);
                    self.stats.failures.push(FailureRecord {
                        scope: FailureScope::Tafsir,
                        chapter: task.number(),
                        verse_key: Some(record.verse_key.clone()),
                        resource_id: Some(u64::from(tafsir.id)),
                        message: e.to_string(),
                    });
                }
                Some(Ok(SubContent::Footnote(_))) | None => {}
            }
        }
    }

    fn merge_footnotes(
        &mut self,
        task: &ChapterTask,
        verse: &Verse,
        record: &mut VerseRecord,
        batch: &SubResourceBatch,
    ) {
        for translation in &verse.translations {
            let translator = task.resources.translation_name(translation.resource_id);
            for marker in extract_markers(&translation.text) {
                let footnote_key = footnote_key(&translator, &marker.number);
                let key = SubResourceKey::Footnote {
                    verse_key: record.verse_key.clone(),
                    footnote_key: footnote_key.clone(),
                };
                match batch.get(&key) {
                    Some(Ok(SubContent::Footnote(text))) => {
                        self.stats.footnotes_fetched += 1;
                        record.footnotes.insert(footnote_key, text.clone());
                    }
                    Some(Err(e)) => {
                        self.stats.footnotes_failed += 1;
                        log::debug!("{}: footnote {} failed: {e}", record.verse_key, marker.id);
                        self.stats.failures.push(FailureRecord {
                            scope: FailureScope::Footnote,
                            chapter: task.number(),
                            verse_key: Some(record.verse_key.clone()),
                            resource_id: Some(marker.id),
                            message: e.to_string(),
                        });
                    }
                    Some(Ok(SubContent::Tafsir(_))) | None => {}
                }
            }
        }
    }
}
