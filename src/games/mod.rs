//! Static support table for the games whose saves we understand.

use std::path::{Path, PathBuf};

/// Everything the synchronizer needs to know about one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameSupport {
    pub id: &'static str,
    pub name: &'static str,
    /// Directory below "My Games".
    pub my_games_dir: &'static str,
    /// Main INI holding `[General] SLocalSavePath`.
    pub ini_file: &'static str,
    /// Save extensions, lowercase, without the dot.
    pub save_extensions: &'static [&'static str],
    /// Script extender co-save extension written next to each save.
    pub co_save_extension: Option<&'static str>,
}

impl GameSupport {
    /// Whether `path` looks like a save of this game.
    pub fn is_save_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.save_extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// Files that travel with `save_path` when it is copied or moved.
    pub fn auxiliary_files(&self, save_path: &Path) -> Vec<PathBuf> {
        if !self.is_save_file(save_path) {
            return Vec::new();
        }
        self.co_save_extension
            .map(|ext| vec![save_path.with_extension(ext)])
            .unwrap_or_default()
    }

    /// `<my_games_root>/<game dir>`
    pub fn game_dir(&self, my_games_root: &Path) -> PathBuf {
        my_games_root.join(self.my_games_dir)
    }

    pub fn ini_path(&self, my_games_root: &Path) -> PathBuf {
        self.game_dir(my_games_root).join(self.ini_file)
    }
}

const ESS: &[&str] = &["ess"];
const FOS: &[&str] = &["fos"];

static GAMES: &[GameSupport] = &[
    GameSupport {
        id: "skyrim",
        name: "Skyrim",
        my_games_dir: "Skyrim",
        ini_file: "Skyrim.ini",
        save_extensions: ESS,
        co_save_extension: Some("skse"),
    },
    GameSupport {
        id: "skyrimse",
        name: "Skyrim Special Edition",
        my_games_dir: "Skyrim Special Edition",
        ini_file: "Skyrim.ini",
        save_extensions: ESS,
        co_save_extension: Some("skse"),
    },
    GameSupport {
        id: "skyrimvr",
        name: "Skyrim VR",
        my_games_dir: "Skyrim VR",
        ini_file: "Skyrim.ini",
        save_extensions: ESS,
        co_save_extension: Some("skse"),
    },
    GameSupport {
        id: "enderal",
        name: "Enderal",
        my_games_dir: "Enderal",
        ini_file: "Enderal.ini",
        save_extensions: ESS,
        co_save_extension: Some("skse"),
    },
    GameSupport {
        id: "enderalspecialedition",
        name: "Enderal Special Edition",
        my_games_dir: "Enderal Special Edition",
        ini_file: "Enderal.ini",
        save_extensions: ESS,
        co_save_extension: Some("skse"),
    },
    GameSupport {
        id: "fallout3",
        name: "Fallout 3",
        my_games_dir: "Fallout3",
        ini_file: "Fallout.ini",
        save_extensions: FOS,
        co_save_extension: Some("fose"),
    },
    GameSupport {
        id: "falloutnv",
        name: "Fallout: New Vegas",
        my_games_dir: "FalloutNV",
        ini_file: "Fallout.ini",
        save_extensions: FOS,
        co_save_extension: Some("nvse"),
    },
    GameSupport {
        id: "fallout4",
        name: "Fallout 4",
        my_games_dir: "Fallout4",
        ini_file: "Fallout4.ini",
        save_extensions: FOS,
        co_save_extension: Some("f4se"),
    },
    GameSupport {
        id: "fallout4vr",
        name: "Fallout 4 VR",
        my_games_dir: "Fallout4VR",
        ini_file: "Fallout4Custom.ini",
        save_extensions: FOS,
        co_save_extension: Some("f4se"),
    },
    GameSupport {
        id: "oblivion",
        name: "Oblivion",
        my_games_dir: "Oblivion",
        ini_file: "Oblivion.ini",
        save_extensions: ESS,
        co_save_extension: Some("obse"),
    },
];

/// Lookup table over the supported games.
#[derive(Debug, Clone, Copy, Default)]
pub struct GameTable;

impl GameTable {
    pub fn new() -> Self {
        Self
    }

    /// Support entry for `game_id`; `None` means the game is unsupported.
    pub fn get(&self, game_id: &str) -> Option<&'static GameSupport> {
        GAMES.iter().find(|game| game.id == game_id)
    }

    pub fn is_supported(&self, game_id: &str) -> bool {
        self.get(game_id).is_some()
    }

    pub fn all(&self) -> &'static [GameSupport] {
        GAMES
    }
}

/// Default "My Games" root: `<Documents>/My Games`.
pub fn default_my_games_root() -> Option<PathBuf> {
    dirs::document_dir().map(|docs| docs.join("My Games"))
}
