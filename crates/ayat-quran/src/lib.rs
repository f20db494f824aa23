//! Ayat Quran - resumable harvester for the Quran Foundation API
//!
//! Collects chapters, verses, translations, commentary, and footnotes into
//! an append-only JSON Lines ledger, one chapter at a time, and plans
//! resumption from whatever an interrupted run left behind.

pub mod api;
pub mod collector;
pub mod config;
pub mod footnote;
pub mod planner;
pub mod record;
pub mod runner;
pub mod stats;
pub mod subresource;

// Re-exports
pub use api::QuranApi;
pub use collector::{CollectError, Collector, CollectorOptions, Outcome};
pub use config::{CHAPTER_COUNT, Config, HttpSettings, chapter_range};
pub use planner::{FieldRequirements, ResumePlan, plan};
pub use record::{ChapterTask, Resource, Resources, VerseMetadata, VerseRecord};
pub use runner::{list_resources, plan_only, run};
pub use stats::{CollectStats, FailureRecord, FailureScope};
