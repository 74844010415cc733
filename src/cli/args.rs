//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Savegame discovery and live tracking
#[derive(Parser)]
#[command(
    name = "savewatch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Discover and live-track Creation Engine savegames",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Show progress logs (info level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create .savewatch/settings.toml
    #[command(about = "Set up .savewatch directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings")]
    Config,

    /// List supported games
    #[command(about = "List games with savegame support")]
    Games,

    /// Scan a save directory once
    #[command(
        about = "Decode every savegame in a directory",
        after_help = "Examples:\n  savewatch scan \"~/Documents/My Games/Skyrim Special Edition/Saves\"\n  savewatch scan ./Saves --game fallout4 --json"
    )]
    Scan {
        /// Save directory
        directory: PathBuf,

        /// Game id, decides which extensions count as saves
        #[arg(short, long, default_value = "skyrimse")]
        game: String,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Activate a profile and follow its save directory
    #[command(
        about = "Track a profile's savegames until interrupted",
        after_help = "Profiles are configured in .savewatch/settings.toml:\n\n  [profiles.survival]\n  game = \"skyrimse\"\n  local_saves = true"
    )]
    Watch {
        /// Profile id from the [profiles] table
        profile: String,
    },
}
