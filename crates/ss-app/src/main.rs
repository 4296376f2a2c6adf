use anyhow::Result;
use clap::Parser;
use ss_core::AppConfig;

pub mod cli;
pub mod commands;

use cli::Command;

fn main() -> Result<()> {
    // 1. Parser CLI
    let cli = cli::Cli::parse();

    // 2. Initialiser le logging
    env_logger::Builder::new()
        .filter_level(cli.log_level.parse().unwrap_or(log::LevelFilter::Warn))
        .init();

    // 3. Charger la config
    let config = resolve_config(&cli)?;
    log::debug!(
        "stats spectrogram: {}",
        commands::describe_spectrogram(&config.stats.spectrogram)
    );

    // 4. Dispatcher
    match &cli.command {
        Command::Stats(args) => commands::stats(config, args),
        Command::Cache(args) => commands::cache(config, args),
        Command::Split(args) => commands::split(args),
        Command::Preprocess(args) => commands::preprocess(config, args),
    }
}

/// Load `--config` when it exists, defaults otherwise.
fn resolve_config(cli: &cli::Cli) -> Result<AppConfig> {
    if cli.config.exists() {
        ss_core::config::load_config(&cli.config)
    } else {
        log::warn!(
            "Config introuvable : {}. Utilisation des défauts.",
            cli.config.display()
        );
        Ok(AppConfig::default())
    }
}
