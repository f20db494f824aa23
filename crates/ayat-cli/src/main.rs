//! ayat - resumable Quran dataset harvester
//!
//! Collects verses, translations, commentary, and footnotes from the
//! Quran Foundation API into a JSON Lines file that survives interruption.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use ayat_core::{ProgressContext, ShutdownToken, init_logging};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "ayat")]
#[command(about = "Resumable harvester for the Quran Foundation API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "debug")]
    quiet: bool,

    /// Config file path (default: ./ayat.toml or ~/.config/ayat/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Collect chapters into the output file
    Collect(cmd::collect::CollectArgs),
    /// Show which chapters a resumed run would collect
    Plan(cmd::collect::SelectionArgs),
    /// List available translations and tafsirs
    Resources {
        /// Language of the listing
        #[arg(long)]
        language: Option<String>,
    },
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let progress = Arc::new(ProgressContext::new());
    let multi = if progress.is_tty() {
        Some(progress.multi())
    } else {
        None
    };
    init_logging(cli.quiet, cli.debug, multi);

    let loaded = match &cli.config {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    };
    let file = match loaded {
        Ok(c) => c,
        Err(e) => {
            log::error!("Configuration error: {e:#}");
            return ExitCode::from(2);
        }
    };

    match cli.command {
        Command::Collect(args) => {
            let config = match args.resolve(&file) {
                Ok(c) => c,
                Err(e) => {
                    log::error!("Configuration error: {e:#}");
                    return ExitCode::from(2);
                }
            };
            let token = ShutdownToken::new();
            if let Err(e) = setup_signal_handler(&token) {
                log::error!("Failed to install signal handlers: {e}");
                return ExitCode::from(2);
            }
            cmd::collect::run(&config, progress, token)
        }
        Command::Plan(args) => report(cmd::plan::run(args, &file, &progress)),
        Command::Resources { language } => {
            report(cmd::resources::run(&file, language, &progress))
        }
        Command::Config => {
            show_config(&file);
            ExitCode::SUCCESS
        }
    }
}

fn report(result: anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

/// First signal: request graceful shutdown. Second signal: exit immediately.
fn setup_signal_handler(token: &ShutdownToken) -> std::io::Result<()> {
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        let token = token.clone();
        // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
        unsafe {
            signal_hook::low_level::register(signal, move || {
                if token.cancel() {
                    std::process::exit(130);
                }
            })?;
        }
    }
    Ok(())
}

fn show_config(file: &Config) {
    let engine = file.engine();
    let list = |ids: &[u32]| {
        if ids.is_empty() {
            "none".to_string()
        } else {
            ids.iter().map(u32::to_string).collect::<Vec<_>>().join(", ")
        }
    };
    let rows = [
        ("API base URL", engine.base_url.clone()),
        ("Language", engine.language.clone()),
        ("Output", engine.output.display().to_string()),
        ("Translations", list(&engine.translations)),
        ("Tafsirs", list(&engine.tafsirs)),
        ("Workers", engine.workers.to_string()),
        ("Flush threshold", engine.flush_threshold.to_string()),
        ("Metadata", engine.include_metadata.to_string()),
        ("Footnotes", engine.include_footnotes.to_string()),
        ("Require tafsir", engine.require_tafsir.to_string()),
        ("Empty counts as present", engine.empty_is_present.to_string()),
        ("Min delay", format!("{}ms", engine.http.min_delay.as_millis())),
        ("Max retries", engine.http.max_retries.to_string()),
        (
            "Breaker",
            format!(
                "{}x429 -> pause {}s",
                engine.http.breaker_threshold,
                engine.http.breaker_pause.as_secs()
            ),
        ),
    ];
    cmd::print_summary("Setting", &rows);
}
