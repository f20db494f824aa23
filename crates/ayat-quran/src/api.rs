//! Quran Foundation v4 API endpoints and wire types

use ayat_core::{FetchError, RateClient, requeue_rate_limited};
use serde::Deserialize;
use serde::de::DeserializeOwned;

pub const DEFAULT_BASE_URL: &str = "https://api.quran.com";

/// Largest page the verses endpoint serves
pub const VERSES_PER_PAGE: u32 = 50;

/// Guard against a server that keeps returning `next_page`
const MAX_PAGES: u32 = 64;

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Chapter {
    pub id: u16,
    #[serde(default)]
    pub name_simple: String,
    #[serde(default)]
    pub name_arabic: String,
    pub verses_count: u16,
    #[serde(default)]
    pub revelation_place: Option<String>,
    #[serde(default)]
    pub revelation_order: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct ChaptersResponse {
    chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerseTranslation {
    pub resource_id: u32,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Verse {
    pub verse_number: u16,
    pub verse_key: String,
    #[serde(default)]
    pub text_uthmani: Option<String>,
    #[serde(default)]
    pub juz_number: Option<u16>,
    #[serde(default)]
    pub page_number: Option<u16>,
    #[serde(default)]
    pub hizb_number: Option<u16>,
    #[serde(default)]
    pub rub_el_hizb_number: Option<u16>,
    #[serde(default)]
    pub ruku_number: Option<u16>,
    #[serde(default)]
    pub manzil_number: Option<u16>,
    #[serde(default)]
    pub sajdah_number: Option<u16>,
    #[serde(default)]
    pub translations: Vec<VerseTranslation>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub next_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct VersesPage {
    pub verses: Vec<Verse>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct TafsirResponse {
    tafsir: TafsirBody,
}

#[derive(Debug, Deserialize)]
struct TafsirBody {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FootnoteResponse {
    foot_note: FootnoteBody,
}

#[derive(Debug, Deserialize)]
struct FootnoteBody {
    #[serde(default)]
    text: String,
}

/// Entry of `/resources/translations` or `/resources/tafsirs`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ResourceInfo {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub language_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranslationsList {
    translations: Vec<ResourceInfo>,
}

#[derive(Debug, Deserialize)]
struct TafsirsList {
    tafsirs: Vec<ResourceInfo>,
}

// =============================================================================
// Endpoints
// =============================================================================

/// Endpoint layer over a [`RateClient`].
///
/// Requests that come back rate limited are requeued up to
/// `rate_limit_requeues` times; everything else is surfaced as-is.
pub struct QuranApi {
    client: RateClient,
    language: String,
    rate_limit_requeues: u32,
}

impl QuranApi {
    pub fn new(client: RateClient, language: impl Into<String>, rate_limit_requeues: u32) -> Self {
        Self {
            client,
            language: language.into(),
            rate_limit_requeues,
        }
    }

    pub fn client(&self) -> &RateClient {
        &self.client
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let body = requeue_rate_limited(
            path,
            self.rate_limit_requeues,
            self.client.backoff_base(),
            self.client.token(),
            || self.client.fetch(path, query),
        )?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode(format!("{path}: {e}")))
    }

    /// All chapters with their verse counts
    pub fn chapters(&self) -> Result<Vec<Chapter>, FetchError> {
        let resp: ChaptersResponse =
            self.get_json("/api/v4/chapters", &[("language", self.language.clone())])?;
        Ok(resp.chapters)
    }

    /// One page of a chapter's verses with Arabic text and translations
    pub fn verses_page(
        &self,
        chapter: u16,
        page: u32,
        translations: &[u32],
    ) -> Result<VersesPage, FetchError> {
        let mut query = vec![
            ("language", self.language.clone()),
            ("page", page.to_string()),
            ("per_page", VERSES_PER_PAGE.to_string()),
            ("fields", "text_uthmani".to_string()),
        ];
        if !translations.is_empty() {
            let ids: Vec<String> = translations.iter().map(u32::to_string).collect();
            query.push(("translations", ids.join(",")));
        }
        self.get_json(&format!("/api/v4/verses/by_chapter/{chapter}"), &query)
    }

    /// Every verse of a chapter, following pagination
    pub fn chapter_verses(&self, chapter: u16, translations: &[u32]) -> Result<Vec<Verse>, FetchError> {
        let mut verses = Vec::new();
        let mut page = 1;
        loop {
            let resp = self.verses_page(chapter, page, translations)?;
            verses.extend(resp.verses);
            match resp.pagination.next_page {
                Some(next) if next > page && next <= MAX_PAGES => page = next,
                _ => break,
            }
        }
        log::debug!("chapter {chapter}: {} verses over {page} page(s)", verses.len());
        Ok(verses)
    }

    /// Commentary for one verse. `Ok(None)` when the source has none (404).
    pub fn tafsir_by_ayah(&self, tafsir_id: u32, verse_key: &str) -> Result<Option<String>, FetchError> {
        let path = format!("/api/v4/tafsirs/{tafsir_id}/by_ayah/{verse_key}");
        match self.get_json::<TafsirResponse>(&path, &[]) {
            Ok(resp) => Ok(Some(resp.tafsir.text.unwrap_or_default())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn footnote(&self, id: u64) -> Result<String, FetchError> {
        let resp: FootnoteResponse = self.get_json(&format!("/api/v4/foot_notes/{id}"), &[])?;
        Ok(resp.foot_note.text)
    }

    pub fn translation_resources(&self) -> Result<Vec<ResourceInfo>, FetchError> {
        let resp: TranslationsList = self.get_json(
            "/api/v4/resources/translations",
            &[("language", self.language.clone())],
        )?;
        Ok(resp.translations)
    }

    pub fn tafsir_resources(&self) -> Result<Vec<ResourceInfo>, FetchError> {
        let resp: TafsirsList = self.get_json(
            "/api/v4/resources/tafsirs",
            &[("language", self.language.clone())],
        )?;
        Ok(resp.tafsirs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ayat_core::{BreakerConfig, ClientConfig, HttpResponse, ShutdownToken, Transport, TransportError};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Answers by URL suffix; records every URL and query it saw.
    struct Routes {
        routes: Vec<(&'static str, u16, &'static str)>,
        seen: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    impl Transport for Routes {
        fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpResponse, TransportError> {
            let q = query.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
            self.seen.lock().unwrap().push((url.to_string(), q));
            let page = query
                .iter()
                .find(|(k, _)| *k == "page")
                .map(|(_, v)| v.as_str())
                .unwrap_or("");
            for &(suffix, status, body) in &self.routes {
                let (path, want_page) = suffix.split_once('#').unwrap_or((suffix, ""));
                if url.ends_with(path) && (want_page.is_empty() || want_page == page) {
                    return Ok(HttpResponse::new(status, body));
                }
            }
            Ok(HttpResponse::new(404, ""))
        }
    }

    fn api(routes: Vec<(&'static str, u16, &'static str)>) -> (QuranApi, Arc<Routes>) {
        let transport = Arc::new(Routes {
            routes,
            seen: Mutex::new(Vec::new()),
        });
        let config = ClientConfig {
            base_url: "http://api.test".into(),
            min_delay: Duration::ZERO,
            max_retries: 0,
            backoff_base: Duration::from_millis(1),
            breaker: BreakerConfig::default(),
        };
        let client = RateClient::new(config, transport.clone(), ShutdownToken::new());
        (QuranApi::new(client, "en", 1), transport)
    }

    #[test]
    fn parses_chapters() {
        let (api, _) = api(vec![(
            "/api/v4/chapters",
            200,
            r#"{"chapters":[{"id":1,"name_simple":"Al-Fatihah","name_arabic":"الفاتحة","verses_count":7,"revelation_place":"makkah","revelation_order":5,"pages":[1,1]}]}"#,
        )]);
        let chapters = api.chapters().unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].id, 1);
        assert_eq!(chapters[0].verses_count, 7);
        assert_eq!(chapters[0].revelation_place.as_deref(), Some("makkah"));
    }

    #[test]
    fn follows_pagination() {
        let (api, seen) = api(vec![
            (
                "/api/v4/verses/by_chapter/2#1",
                200,
                r#"{"verses":[{"verse_number":1,"verse_key":"2:1","translations":[{"resource_id":131,"text":"Alif Lam Mim"}]}],"pagination":{"next_page":2}}"#,
            ),
            (
                "/api/v4/verses/by_chapter/2#2",
                200,
                r#"{"verses":[{"verse_number":2,"verse_key":"2:2","sajdah_number":null}],"pagination":{"next_page":null}}"#,
            ),
        ]);
        let verses = api.chapter_verses(2, &[131, 85]).unwrap();
        assert_eq!(verses.len(), 2);
        assert_eq!(verses[0].translations[0].resource_id, 131);
        assert_eq!(verses[1].verse_key, "2:2");

        let seen = seen.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let query = &seen[0].1;
        assert!(query.contains(&("translations".to_string(), "131,85".to_string())));
        assert!(query.contains(&("per_page".to_string(), "50".to_string())));
    }

    #[test]
    fn stops_on_non_advancing_next_page() {
        let (api, seen) = api(vec![(
            "/api/v4/verses/by_chapter/1",
            200,
            r#"{"verses":[{"verse_number":1,"verse_key":"1:1"}],"pagination":{"next_page":1}}"#,
        )]);
        assert_eq!(api.chapter_verses(1, &[]).unwrap().len(), 1);
        assert_eq!(seen.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn missing_tafsir_is_none() {
        let (api, _) = api(vec![(
            "/api/v4/tafsirs/169/by_ayah/1:1",
            200,
            r#"{"tafsir":{"resource_id":169,"text":"<p>In the name</p>"}}"#,
        )]);
        assert_eq!(
            api.tafsir_by_ayah(169, "1:1").unwrap().as_deref(),
            Some("<p>In the name</p>")
        );
        assert_eq!(api.tafsir_by_ayah(169, "1:2").unwrap(), None);
    }

    #[test]
    fn server_error_is_not_swallowed() {
        let (api, _) = api(vec![("/api/v4/tafsirs/169/by_ayah/1:1", 500, "boom")]);
        let err = api.tafsir_by_ayah(169, "1:1").unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 500, .. }));
    }

    #[test]
    fn bad_json_is_decode_error() {
        let (api, _) = api(vec![("/api/v4/foot_notes/7", 200, "<html>")]);
        assert!(matches!(api.footnote(7), Err(FetchError::Decode(_))));
    }

    #[test]
    fn rate_limited_requests_are_requeued() {
        let (api, seen) = api(vec![("/api/v4/foot_notes/7", 429, "")]);
        assert!(matches!(api.footnote(7), Err(FetchError::RateLimited)));
        // One initial attempt plus one requeue
        assert_eq!(seen.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn parses_resource_lists() {
        let (api, _) = api(vec![
            (
                "/api/v4/resources/translations",
                200,
                r#"{"translations":[{"id":131,"name":"Dr. Mustafa Khattab","author_name":"Dr. Mustafa Khattab","language_name":"english"}]}"#,
            ),
            (
                "/api/v4/resources/tafsirs",
                200,
                r#"{"tafsirs":[{"id":169,"name":"Ibn Kathir (Abridged)"}]}"#,
            ),
        ]);
        assert_eq!(api.translation_resources().unwrap()[0].name, "Dr. Mustafa Khattab");
        assert_eq!(api.tafsir_resources().unwrap()[0].id, 169);
    }

    #[test]
    #[ignore = "hits the live API"]
    fn live_chapters() {
        let transport = Arc::new(
            ayat_core::ReqwestTransport::new("ayat-test", ayat_core::DEFAULT_REQUEST_TIMEOUT).unwrap(),
        );
        let config = ClientConfig {
            base_url: DEFAULT_BASE_URL.into(),
            ..Default::default()
        };
        let api = QuranApi::new(RateClient::new(config, transport, ShutdownToken::new()), "en", 3);
        assert_eq!(api.chapters().unwrap().len(), 114);
    }
}
