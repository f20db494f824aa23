//! Resources subcommand - list available translations and tafsirs

use anyhow::Result;

use ayat_core::{SharedProgress, ShutdownToken};
use ayat_quran::runner::connect;

use crate::config::Config;

pub fn run(file: &Config, language: Option<String>, progress: &SharedProgress) -> Result<()> {
    let mut config = file.engine();
    if let Some(language) = language {
        config.language = language;
    }
    let api = connect(&config, ShutdownToken::new())?;
    ayat_quran::list_resources(&api, progress)
}
