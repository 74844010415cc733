use clap::Parser;

use savewatch::Settings;
use savewatch::cli::commands::{games, init, scan, watch};
use savewatch::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        Settings::default()
    });

    savewatch::logging::init_with_config(&config.logging, cli.verbose);

    let result = match &cli.command {
        Commands::Init { force } => init::run_init(*force),
        Commands::Config => init::run_config(&config),
        Commands::Games => games::run_games(&config),
        Commands::Scan {
            directory,
            game,
            json,
        } => scan::run_scan(directory, game, *json, &config).await,
        Commands::Watch { profile } => watch::run_watch(profile, &config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
