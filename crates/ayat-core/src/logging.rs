//! Log output routed around live progress bars

use indicatif::MultiProgress;
use log::{Level, LevelFilter};

/// Fixed-width level tag, optionally wrapped in ANSI color.
fn level_tag(level: Level, color: bool) -> String {
    let label = match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN ",
        Level::Info => "INFO ",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    };
    if !color {
        return label.to_string();
    }
    let ansi = match level {
        Level::Error => "31",
        Level::Warn => "33",
        Level::Info => "32",
        Level::Debug => "36",
        Level::Trace => "35",
    };
    format!("\x1b[{ansi}m{label}\x1b[0m")
}

fn default_filter(quiet: bool, debug: bool) -> &'static str {
    if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    }
}

/// HTTP stack internals are noise even at debug level.
fn builder(quiet: bool, debug: bool) -> env_logger::Builder {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter(quiet, debug)),
    );
    for noisy in ["hyper", "hyper_util", "reqwest", "native_tls"] {
        builder.filter_module(noisy, LevelFilter::Warn);
    }
    builder
}

/// Prints records through [`MultiProgress::suspend`] so bars are redrawn
/// below the message instead of being torn.
pub struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl IndicatifLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.matches(record) {
            return;
        }
        let line = format!("[{}] {}", level_tag(record.level(), true), record.args());
        self.multi.suspend(|| eprintln!("{line}"));
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the global logger.
///
/// With a `MultiProgress` (interactive terminal) records go through
/// [`IndicatifLogger`]; otherwise plain lines with a timestamp are written
/// to stderr. `RUST_LOG` overrides the level chosen by the flags.
/// Calling this twice is a no-op.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    use std::io::Write;

    let mut builder = builder(quiet, debug);

    if let Some(multi) = multi {
        let logger = builder.build();
        let max_level = logger.filter();
        if log::set_boxed_logger(Box::new(IndicatifLogger::new(logger, multi.clone()))).is_ok() {
            log::set_max_level(max_level);
        }
    } else {
        let _ = builder
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{} [{}] {}",
                    buf.timestamp_seconds(),
                    level_tag(record.level(), false),
                    record.args()
                )
            })
            .try_init();
    }
}
