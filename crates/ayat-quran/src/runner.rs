//! Run orchestration: resolve metadata, plan, collect, report

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use ayat_core::{
    Ledger, OpenMode, RateClient, ReqwestTransport, SharedProgress, ShutdownToken, Transport,
};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::api::{Chapter, QuranApi, ResourceInfo};
use crate::collector::{CollectError, Collector, CollectorOptions, Outcome};
use crate::config::Config;
use crate::planner::{FieldRequirements, ResumePlan, plan};
use crate::record::{ChapterTask, Resource, Resources};
use crate::stats::write_audit;
use crate::subresource::SubResourceFetcher;

pub const EXIT_FAILED: u8 = 1;
pub const EXIT_INTERRUPTED: u8 = 130;

/// Build the API stack over the real HTTP transport
pub fn connect(config: &Config, token: ShutdownToken) -> anyhow::Result<QuranApi> {
    let transport = ReqwestTransport::new(&config.user_agent, config.http.timeout)
        .context("Failed to build HTTP client")?;
    Ok(api_with_transport(config, Arc::new(transport), token))
}

pub fn api_with_transport(
    config: &Config,
    transport: Arc<dyn Transport>,
    token: ShutdownToken,
) -> QuranApi {
    let client = RateClient::new(config.client_config(), transport, token);
    QuranApi::new(client, config.language.clone(), config.http.rate_limit_requeues)
}

/// Pair each requested id with its display name. Ids missing from the
/// listing keep a generic name so records stay keyed consistently.
fn name_resources(ids: &[u32], listing: &[ResourceInfo], kind: &str) -> Vec<Resource> {
    ids.iter()
        .map(|&id| match listing.iter().find(|r| r.id == id) {
            Some(info) if !info.name.is_empty() => Resource::new(id, info.name.clone()),
            _ => {
                log::warn!("{kind} {id} not found in resource listing");
                Resource::new(id, format!("{kind} {id}"))
            }
        })
        .collect()
}

pub fn resolve_resources(api: &QuranApi, config: &Config) -> anyhow::Result<Resources> {
    let translations = api
        .translation_resources()
        .context("Failed to list translations")?;
    let tafsirs = if config.tafsirs.is_empty() {
        Vec::new()
    } else {
        api.tafsir_resources().context("Failed to list tafsirs")?
    };
    Ok(Resources {
        translations: name_resources(&config.translations, &translations, "Translation"),
        tafsirs: name_resources(&config.tafsirs, &tafsirs, "Tafsir"),
    })
}

/// One task per requested chapter, using the chapter listing for verse counts.
pub fn build_tasks(
    chapters: &[Chapter],
    requested: &[u16],
    resources: Resources,
) -> anyhow::Result<Vec<ChapterTask>> {
    let resources = Arc::new(resources);
    requested
        .iter()
        .map(|&n| {
            let chapter = chapters
                .iter()
                .find(|c| c.id == n)
                .with_context(|| format!("Chapter {n} missing from chapter listing"))?;
            Ok(ChapterTask {
                chapter: chapter.clone(),
                resources: Arc::clone(&resources),
            })
        })
        .collect()
}

pub fn requirements(config: &Config, resources: &Resources) -> FieldRequirements {
    FieldRequirements {
        translations: resources.translation_names(),
        tafsirs: resources.tafsir_names(),
        empty_is_present: config.empty_is_present,
    }
}

/// Fetch metadata and compute the chapter tasks for this run.
pub fn prepare(api: &QuranApi, config: &Config) -> anyhow::Result<(Vec<ChapterTask>, Resources)> {
    let chapters = api.chapters().context("Failed to fetch chapter list")?;
    let resources = resolve_resources(api, config)?;
    log::info!(
        "Translations: {:?}; tafsirs: {:?}",
        resources.translation_names(),
        resources.tafsir_names()
    );
    let tasks = build_tasks(&chapters, &config.chapters, resources.clone())?;
    Ok((tasks, resources))
}

/// Dry run of the resume planner
pub fn plan_only(api: &QuranApi, config: &Config) -> anyhow::Result<ResumePlan> {
    let (tasks, resources) = prepare(api, config)?;
    let plan = plan(&config.output, &tasks, &requirements(config, &resources))
        .context("Failed to read existing output")?;
    Ok(plan)
}

/// Main entry point for the collect command
pub fn run(config: &Config, progress: SharedProgress, token: ShutdownToken) -> anyhow::Result<ExitCode> {
    let api = connect(config, token.clone())?;
    run_with_api(config, api, progress, &token)
}

pub fn run_with_api(
    config: &Config,
    api: QuranApi,
    progress: SharedProgress,
    token: &ShutdownToken,
) -> anyhow::Result<ExitCode> {
    let start = Instant::now();
    log::info!(
        "ayat starting: chapters={}, translations={:?}, tafsirs={:?}, workers={}, output={}",
        config.chapters.len(),
        config.translations,
        config.tafsirs,
        config.workers,
        config.output.display()
    );

    let (mut tasks, resources) = match prepare(&api, config) {
        Ok(prepared) => prepared,
        Err(_) if token.is_cancelled() => {
            log::warn!("Shutdown requested before collection started");
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
        Err(e) => return Err(e),
    };
    let requested = tasks.len();

    let mode = if config.resume {
        let plan = plan(&config.output, &tasks, &requirements(config, &resources))
            .context("Failed to read existing output for resume")?;
        plan.log();
        tasks = plan.tasks;
        OpenMode::Append
    } else {
        OpenMode::Truncate
    };

    let ledger = Ledger::open(&config.output, mode, config.flush_threshold)
        .context("Failed to open output file")?;
    let fetcher = SubResourceFetcher::new(config.workers, config.max_failure_ratio)?;
    let options = CollectorOptions {
        include_metadata: config.include_metadata,
        include_footnotes: config.include_footnotes,
        require_tafsir: config.require_tafsir,
    };

    let mut collector = Collector::new(api, fetcher, ledger, progress.clone(), options);
    let result = collector.collect(&tasks);

    let mut stats = collector.into_stats();
    stats.chapters_requested = requested;
    stats.chapters_skipped = requested - tasks.len();
    stats.elapsed = start.elapsed();
    if progress.is_tty() {
        stats.print();
    } else {
        stats.log();
    }
    write_audit(&config.audit_path(), &stats.failures)?;

    match result {
        Ok(Outcome::Completed) => {
            log::info!("Collection completed: {}", config.output.display());
            Ok(ExitCode::SUCCESS)
        }
        Ok(Outcome::Interrupted) => {
            log::warn!("Interrupted; rerun with --resume to continue");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
        Err(CollectError::Ledger(e)) => {
            log::error!("Output write failed, stopping: {e}");
            Ok(ExitCode::from(EXIT_FAILED))
        }
        Err(e) => {
            log::error!("Stopped: {e}. Already written chapters are kept; rerun with --resume");
            Ok(ExitCode::from(EXIT_FAILED))
        }
    }
}

/// Print the translation and tafsir catalogues
pub fn list_resources(api: &QuranApi, progress: &SharedProgress) -> anyhow::Result<()> {
    let translations = api
        .translation_resources()
        .context("Failed to list translations")?;
    let tafsirs = api.tafsir_resources().context("Failed to list tafsirs")?;
    for (title, list) in [("Translations", &translations), ("Tafsirs", &tafsirs)] {
        progress.println(resource_table(title, list));
    }
    Ok(())
}

fn resource_table(title: &str, list: &[ResourceInfo]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new(title).fg(Color::Cyan),
            Cell::new("Author").fg(Color::Cyan),
            Cell::new("Language").fg(Color::Cyan),
        ]);
    let mut sorted: Vec<&ResourceInfo> = list.iter().collect();
    sorted.sort_by_key(|r| r.id);
    for r in sorted {
        table.add_row(vec![
            Cell::new(r.id),
            Cell::new(&r.name),
            Cell::new(r.author_name.as_deref().unwrap_or("")),
            Cell::new(r.language_name.as_deref().unwrap_or("")),
        ]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(id: u16, verses: u16) -> Chapter {
        Chapter {
            id,
            name_simple: format!("Chapter {id}"),
            name_arabic: String::new(),
            verses_count: verses,
            revelation_place: None,
            revelation_order: None,
        }
    }

    #[test]
    fn names_fall_back_for_unknown_ids() {
        let listing = vec![ResourceInfo {
            id: 131,
            name: "Dr. Mustafa Khattab".into(),
            author_name: None,
            language_name: None,
        }];
        let named = name_resources(&[131, 85], &listing, "Translation");
        assert_eq!(named[0].name, "Dr. Mustafa Khattab");
        assert_eq!(named[1].name, "Translation 85");
    }

    #[test]
    fn tasks_follow_requested_chapters() {
        let chapters = vec![chapter(1, 7), chapter(2, 286), chapter(3, 200)];
        let tasks = build_tasks(&chapters, &[1, 3], Resources::default()).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].expected_verses(), 200);
        assert!(build_tasks(&chapters, &[4], Resources::default()).is_err());
    }

    #[test]
    fn resource_table_sorted_by_id() {
        let list = vec![
            ResourceInfo {
                id: 85,
                name: "Abdel Haleem".into(),
                author_name: None,
                language_name: Some("english".into()),
            },
            ResourceInfo {
                id: 20,
                name: "Saheeh International".into(),
                author_name: None,
                language_name: Some("english".into()),
            },
        ];
        let table = resource_table("Translations", &list);
        let saheeh = table.find("Saheeh").unwrap();
        let haleem = table.find("Abdel").unwrap();
        assert!(saheeh < haleem);
    }
}
