//! Output records and units of work

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::{Chapter, Verse};

/// Position of a verse within the structural divisions of the text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerseMetadata {
    pub juz: Option<u16>,
    pub page: Option<u16>,
    pub hizb: Option<u16>,
    pub rub_el_hizb: Option<u16>,
    pub ruku: Option<u16>,
    pub manzil: Option<u16>,
    pub sajdah: Option<u16>,
    pub revelation_place: Option<String>,
    pub revelation_order: Option<u16>,
}

/// One line of the output ledger. Written once, never updated.
///
/// `tafsirs` values are `None` when the source has no commentary for the
/// verse. A source whose fetch failed is absent from the map altogether.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerseRecord {
    #[serde(alias = "verse_id")]
    pub verse_key: String,
    pub chapter: u16,
    pub verse: u16,
    #[serde(default)]
    pub chapter_name: String,
    #[serde(default)]
    pub chapter_name_arabic: String,
    #[serde(default)]
    pub arabic_text: String,
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
    #[serde(default)]
    pub tafsirs: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub footnotes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<VerseMetadata>,
}

impl VerseRecord {
    /// Start a record from the primary verse payload. Translations are
    /// named through `resources`; unknown ids fall back to `Translation {id}`.
    pub fn from_verse(chapter: &Chapter, verse: &Verse, resources: &Resources, with_metadata: bool) -> Self {
        let translations = verse
            .translations
            .iter()
            .map(|t| (resources.translation_name(t.resource_id), t.text.clone()))
            .collect();

        let metadata = with_metadata.then(|| VerseMetadata {
            juz: verse.juz_number,
            page: verse.page_number,
            hizb: verse.hizb_number,
            rub_el_hizb: verse.rub_el_hizb_number,
            ruku: verse.ruku_number,
            manzil: verse.manzil_number,
            sajdah: verse.sajdah_number,
            revelation_place: chapter.revelation_place.clone(),
            revelation_order: chapter.revelation_order,
        });

        Self {
            verse_key: verse_key(chapter.id, verse.verse_number),
            chapter: chapter.id,
            verse: verse.verse_number,
            chapter_name: chapter.name_simple.clone(),
            chapter_name_arabic: chapter.name_arabic.clone(),
            arabic_text: verse.text_uthmani.clone().unwrap_or_default(),
            translations,
            tafsirs: BTreeMap::new(),
            footnotes: BTreeMap::new(),
            metadata,
        }
    }
}

pub fn verse_key(chapter: u16, verse: u16) -> String {
    format!("{chapter}:{verse}")
}

/// Split `"{chapter}:{verse}"`
pub fn parse_verse_key(key: &str) -> Option<(u16, u16)> {
    let (c, v) = key.split_once(':')?;
    Some((c.trim().parse().ok()?, v.trim().parse().ok()?))
}

/// A translation or tafsir source, as requested for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub id: u32,
    pub name: String,
}

impl Resource {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Requested sources with their display names resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resources {
    pub translations: Vec<Resource>,
    pub tafsirs: Vec<Resource>,
}

impl Resources {
    pub fn translation_ids(&self) -> Vec<u32> {
        self.translations.iter().map(|r| r.id).collect()
    }

    pub fn translation_name(&self, id: u32) -> String {
        self.translations
            .iter()
            .find(|r| r.id == id)
            .map_or_else(|| format!("Translation {id}"), |r| r.name.clone())
    }

    pub fn translation_names(&self) -> Vec<String> {
        self.translations.iter().map(|r| r.name.clone()).collect()
    }

    pub fn tafsir_names(&self) -> Vec<String> {
        self.tafsirs.iter().map(|r| r.name.clone()).collect()
    }
}

/// One chapter to collect.
#[derive(Debug, Clone)]
pub struct ChapterTask {
    pub chapter: Chapter,
    pub resources: Arc<Resources>,
}

impl ChapterTask {
    pub fn number(&self) -> u16 {
        self.chapter.id
    }

    pub fn expected_verses(&self) -> u16 {
        self.chapter.verses_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::VerseTranslation;

    fn chapter() -> Chapter {
        Chapter {
            id: 2,
            name_simple: "Al-Baqarah".into(),
            name_arabic: "البقرة".into(),
            verses_count: 286,
            revelation_place: Some("madinah".into()),
            revelation_order: Some(87),
        }
    }

    fn verse() -> Verse {
        Verse {
            verse_number: 255,
            verse_key: "2:255".into(),
            text_uthmani: Some("ٱللَّهُ لَآ إِلَـٰهَ".into()),
            juz_number: Some(3),
            page_number: Some(42),
            hizb_number: Some(5),
            rub_el_hizb_number: Some(17),
            ruku_number: Some(35),
            manzil_number: Some(1),
            sajdah_number: None,
            translations: vec![
                VerseTranslation {
                    resource_id: 131,
                    text: "Allah! There is no god except Him".into(),
                },
                VerseTranslation {
                    resource_id: 20,
                    text: "Allah - there is no deity except Him".into(),
                },
            ],
        }
    }

    fn resources() -> Resources {
        Resources {
            translations: vec![Resource::new(131, "Dr. Mustafa Khattab")],
            tafsirs: vec![],
        }
    }

    #[test]
    fn builds_record_from_verse() {
        let r = VerseRecord::from_verse(&chapter(), &verse(), &resources(), true);
        assert_eq!(r.verse_key, "2:255");
        assert_eq!(r.chapter, 2);
        assert_eq!(r.chapter_name, "Al-Baqarah");
        assert_eq!(
            r.translations.get("Dr. Mustafa Khattab").map(String::as_str),
            Some("Allah! There is no god except Him")
        );
        // Unrequested id still gets a stable name
        assert!(r.translations.contains_key("Translation 20"));
        let meta = r.metadata.unwrap();
        assert_eq!(meta.juz, Some(3));
        assert_eq!(meta.revelation_order, Some(87));
    }

    #[test]
    fn metadata_omitted_when_disabled() {
        let r = VerseRecord::from_verse(&chapter(), &verse(), &resources(), false);
        assert!(r.metadata.is_none());
        let json = serde_json::to_string(&r).unwrap();
        assert!(!json.contains("metadata"));
    }

    #[test]
    fn reads_legacy_verse_id() {
        let r: VerseRecord =
            serde_json::from_str(r#"{"verse_id":"1:1","chapter":1,"verse":1}"#).unwrap();
        assert_eq!(r.verse_key, "1:1");
        assert!(r.tafsirs.is_empty());
    }

    #[test]
    fn null_commentary_survives_serialization() {
        let mut r = VerseRecord::from_verse(&chapter(), &verse(), &resources(), false);
        r.tafsirs.insert("Ibn Kathir".into(), None);
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains(r#""Ibn Kathir":null"#));
        let back: VerseRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tafsirs.get("Ibn Kathir"), Some(&None));
    }

    #[test]
    fn verse_keys() {
        assert_eq!(verse_key(2, 150), "2:150");
        assert_eq!(parse_verse_key("2:150"), Some((2, 150)));
        assert_eq!(parse_verse_key("2-150"), None);
        assert_eq!(parse_verse_key("x:1"), None);
    }
}
