//! Per-verse auxiliary requests (commentary and footnotes) fanned out in parallel

use ayat_core::{Fanout, FanoutReport, FetchError};
use indicatif::ProgressBar;

use crate::api::QuranApi;
use crate::footnote::footnote_key;
use crate::record::Resource;

/// One auxiliary request.
#[derive(Debug, Clone)]
pub enum SubResource {
    Tafsir {
        verse_key: String,
        tafsir: Resource,
    },
    Footnote {
        verse_key: String,
        translator: String,
        number: String,
        id: u64,
    },
}

/// Merge key: identifies where a result lands on its verse record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubResourceKey {
    Tafsir { verse_key: String, tafsir_id: u32 },
    Footnote { verse_key: String, footnote_key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubContent {
    /// `None`: the source has no commentary for this verse
    Tafsir(Option<String>),
    Footnote(String),
}

impl SubResource {
    pub fn key(&self) -> SubResourceKey {
        match self {
            Self::Tafsir { verse_key, tafsir } => SubResourceKey::Tafsir {
                verse_key: verse_key.clone(),
                tafsir_id: tafsir.id,
            },
            Self::Footnote {
                verse_key,
                translator,
                number,
                ..
            } => SubResourceKey::Footnote {
                verse_key: verse_key.clone(),
                footnote_key: footnote_key(translator, number),
            },
        }
    }

    fn fetch(&self, api: &QuranApi) -> Result<SubContent, FetchError> {
        match self {
            Self::Tafsir { verse_key, tafsir } => api
                .tafsir_by_ayah(tafsir.id, verse_key)
                .map(SubContent::Tafsir),
            Self::Footnote { id, .. } => api.footnote(*id).map(SubContent::Footnote),
        }
    }
}

/// Results of one batch, keyed for merging.
#[derive(Debug)]
pub struct SubResourceBatch {
    pub report: FanoutReport<SubResourceKey, SubContent>,
    /// Failure ratio exceeded the configured limit
    pub degraded: bool,
}

impl SubResourceBatch {
    pub fn get(&self, key: &SubResourceKey) -> Option<&Result<SubContent, FetchError>> {
        self.report.get(key)
    }
}

pub struct SubResourceFetcher {
    fanout: Fanout,
    max_failure_ratio: f64,
}

impl SubResourceFetcher {
    pub fn new(workers: usize, max_failure_ratio: f64) -> anyhow::Result<Self> {
        use anyhow::Context;
        let fanout = Fanout::new(workers).context("Failed to create fan-out thread pool")?;
        Ok(Self {
            fanout,
            max_failure_ratio,
        })
    }

    pub fn workers(&self) -> usize {
        self.fanout.max_workers()
    }

    /// Fetch every item; failures stay per item. A batch whose failure
    /// ratio exceeds the limit is still returned, flagged as degraded.
    pub fn fetch_all(&self, api: &QuranApi, items: Vec<SubResource>, pb: &ProgressBar) -> SubResourceBatch {
        let total = items.len();
        let client = api.client();
        let report = self.fanout.fetch_all(
            items,
            client.breaker(),
            client.token(),
            pb,
            SubResource::key,
            |item: &SubResource| item.fetch(api),
        );

        let ratio = report.failure_ratio();
        let degraded = ratio > self.max_failure_ratio;
        if degraded && !client.token().is_cancelled() {
            log::warn!(
                "{} of {total} auxiliary requests failed ({:.0}%), keeping partial results",
                report.failed(),
                ratio * 100.0
            );
        }
        SubResourceBatch { report, degraded }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_distinguish_kinds_and_sources() {
        let a = SubResource::Tafsir {
            verse_key: "1:1".into(),
            tafsir: Resource::new(169, "Ibn Kathir"),
        };
        let b = SubResource::Tafsir {
            verse_key: "1:1".into(),
            tafsir: Resource::new(168, "Ma'arif"),
        };
        let c = SubResource::Footnote {
            verse_key: "1:1".into(),
            translator: "Khattab".into(),
            number: "1".into(),
            id: 77932,
        };
        assert_ne!(a.key(), b.key());
        assert_eq!(
            c.key(),
            SubResourceKey::Footnote {
                verse_key: "1:1".into(),
                footnote_key: "Khattab:1".into()
            }
        );
    }
}
