//! In-process stand-in for the upstream API, plus run helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ayat_core::{HttpResponse, Ledger, OpenMode, ProgressContext, ShutdownToken, Transport, TransportError};
use ayat_quran::runner::{api_with_transport, prepare};
use ayat_quran::subresource::SubResourceFetcher;
use ayat_quran::{ChapterTask, Collector, CollectorOptions, Config, HttpSettings, VerseRecord};
use serde_json::json;

pub const KHATTAB: &str = "Dr. Mustafa Khattab";
pub const HALEEM: &str = "Abdel Haleem";
pub const IBN_KATHIR: &str = "Ibn Kathir";

type Hook = Box<dyn FnMut(u16) + Send>;

/// Serves chapters, verses, commentary and footnotes generated from a
/// table of verse counts. Individual tafsir lookups can be overridden
/// with a status, and a hook runs whenever a chapter's first verse page
/// is requested.
pub struct FakeApi {
    chapters: Vec<(u16, u16)>,
    tafsir_status: Mutex<HashMap<String, u16>>,
    verse_status: Mutex<HashMap<u16, u16>>,
    /// Remaining tafsir calls to answer with 429
    tafsir_429s: AtomicUsize,
    on_chapter: Mutex<Option<Hook>>,
    pub requests: AtomicUsize,
    pub tafsir_requests: AtomicUsize,
}

impl FakeApi {
    pub fn new(chapters: &[(u16, u16)]) -> Arc<Self> {
        Arc::new(Self {
            chapters: chapters.to_vec(),
            tafsir_status: Mutex::new(HashMap::new()),
            verse_status: Mutex::new(HashMap::new()),
            tafsir_429s: AtomicUsize::new(0),
            on_chapter: Mutex::new(None),
            requests: AtomicUsize::new(0),
            tafsir_requests: AtomicUsize::new(0),
        })
    }

    pub fn tafsir_status(&self, verse_key: &str, status: u16) {
        self.tafsir_status
            .lock()
            .unwrap()
            .insert(verse_key.to_string(), status);
    }

    pub fn verse_status(&self, chapter: u16, status: u16) {
        self.verse_status.lock().unwrap().insert(chapter, status);
    }

    pub fn rate_limit_tafsirs(&self, n: usize) {
        self.tafsir_429s.store(n, Ordering::SeqCst);
    }

    pub fn on_chapter(&self, hook: impl FnMut(u16) + Send + 'static) {
        *self.on_chapter.lock().unwrap() = Some(Box::new(hook));
    }

    fn ok(body: serde_json::Value) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse::new(200, body.to_string()))
    }

    fn verses(&self, chapter: u16, query: &[(&str, String)]) -> Result<HttpResponse, TransportError> {
        let param = |name: &str| {
            query
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };
        let page: u16 = param("page").parse().unwrap_or(1);
        let per_page: u16 = param("per_page").parse().unwrap_or(50);
        let translations: Vec<u32> = param("translations")
            .split(',')
            .filter_map(|s| s.parse().ok())
            .collect();

        if page == 1 {
            if let Some(hook) = self.on_chapter.lock().unwrap().as_mut() {
                hook(chapter);
            }
        }
        if let Some(&status) = self.verse_status.lock().unwrap().get(&chapter) {
            return Ok(HttpResponse::new(status, "upstream failure"));
        }

        let count = self
            .chapters
            .iter()
            .find(|(c, _)| *c == chapter)
            .map_or(0, |(_, n)| *n);
        let first = (page - 1) * per_page + 1;
        let last = (page * per_page).min(count);
        let verses: Vec<_> = (first..=last)
            .map(|v| {
                let translations: Vec<_> = translations
                    .iter()
                    .map(|&id| {
                        // First verse of every chapter carries a footnote in 131
                        let text = if id == 131 && v == 1 {
                            format!("translation {id} {chapter}:{v}<sup foot_note={}>1</sup>", 9000 + chapter)
                        } else {
                            format!("translation {id} {chapter}:{v}")
                        };
                        json!({"resource_id": id, "text": text})
                    })
                    .collect();
                json!({
                    "verse_number": v,
                    "verse_key": format!("{chapter}:{v}"),
                    "text_uthmani": format!("arabic {chapter}:{v}"),
                    "juz_number": 1,
                    "page_number": chapter,
                    "translations": translations,
                })
            })
            .collect();
        let next_page = (last < count).then_some(page + 1);
        Self::ok(json!({"verses": verses, "pagination": {"next_page": next_page}}))
    }

    fn tafsir(&self, verse_key: &str) -> Result<HttpResponse, TransportError> {
        self.tafsir_requests.fetch_add(1, Ordering::SeqCst);
        let limited = self
            .tafsir_429s
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if limited {
            return Ok(HttpResponse::new(429, ""));
        }
        if let Some(&status) = self.tafsir_status.lock().unwrap().get(verse_key) {
            return Ok(HttpResponse::new(status, ""));
        }
        Self::ok(json!({"tafsir": {"resource_id": 169, "text": format!("commentary {verse_key}")}}))
    }
}

impl Transport for FakeApi {
    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpResponse, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let path = url.strip_prefix("http://fake.test").unwrap_or(url);

        if path == "/api/v4/chapters" {
            let chapters: Vec<_> = self
                .chapters
                .iter()
                .map(|&(id, n)| {
                    json!({
                        "id": id,
                        "name_simple": format!("Chapter {id}"),
                        "name_arabic": "سورة",
                        "verses_count": n,
                        "revelation_place": "makkah",
                        "revelation_order": id,
                    })
                })
                .collect();
            return Self::ok(json!({ "chapters": chapters }));
        }
        if path == "/api/v4/resources/translations" {
            return Self::ok(json!({"translations": [
                {"id": 131, "name": KHATTAB},
                {"id": 85, "name": HALEEM},
            ]}));
        }
        if path == "/api/v4/resources/tafsirs" {
            return Self::ok(json!({"tafsirs": [{"id": 169, "name": IBN_KATHIR}]}));
        }
        if let Some(chapter) = path.strip_prefix("/api/v4/verses/by_chapter/") {
            let chapter = chapter.parse().unwrap_or(0);
            return self.verses(chapter, query);
        }
        if let Some(key) = path.strip_prefix("/api/v4/tafsirs/169/by_ayah/") {
            return self.tafsir(key);
        }
        if let Some(id) = path.strip_prefix("/api/v4/foot_notes/") {
            return Self::ok(json!({"foot_note": {"text": format!("note {id}")}}));
        }
        Ok(HttpResponse::new(404, ""))
    }
}

/// Fast settings: no pacing, tiny backoff and breaker pause.
pub fn config(dir: &Path, chapters: Vec<u16>) -> Config {
    Config {
        base_url: "http://fake.test".into(),
        chapters,
        translations: vec![131, 85],
        tafsirs: vec![169],
        workers: 3,
        output: dir.join("quran.jsonl"),
        http: HttpSettings {
            min_delay: Duration::ZERO,
            max_retries: 1,
            backoff_base: Duration::from_millis(1),
            breaker_pause: Duration::from_millis(20),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn hidden_progress() -> Arc<ProgressContext> {
    Arc::new(ProgressContext::hidden())
}

/// Collector over the fake API, plus the tasks for `config.chapters`.
pub fn collector(
    config: &Config,
    fake: &Arc<FakeApi>,
    token: &ShutdownToken,
    mode: OpenMode,
) -> (Collector, Vec<ChapterTask>) {
    let api = api_with_transport(config, fake.clone(), token.clone());
    let (tasks, _) = prepare(&api, config).unwrap();
    let fetcher = SubResourceFetcher::new(config.workers, config.max_failure_ratio).unwrap();
    let ledger = Ledger::open(&config.output, mode, config.flush_threshold).unwrap();
    let options = CollectorOptions {
        include_metadata: config.include_metadata,
        include_footnotes: config.include_footnotes,
        require_tafsir: config.require_tafsir,
    };
    let collector = Collector::new(api, fetcher, ledger, hidden_progress(), options);
    (collector, tasks)
}

pub fn read_ledger(path: &Path) -> Vec<VerseRecord> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

pub fn line_count(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

pub fn output(dir: &Path) -> PathBuf {
    dir.join("quran.jsonl")
}
