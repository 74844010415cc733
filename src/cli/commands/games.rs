//! Games command.

use comfy_table::{Table, presets::UTF8_FULL};

use crate::config::Settings;
use crate::games::GameTable;

/// Run games command - list supported games and where their saves live.
pub fn run_games(config: &Settings) -> anyhow::Result<()> {
    let root = config.my_games_root();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Id", "Name", "Saves", "Co-save", "INI"]);

    for game in GameTable::new().all() {
        let ini = match &root {
            Some(root) => game.ini_path(root).display().to_string(),
            None => game.ini_file.to_string(),
        };
        table.add_row(vec![
            game.id.to_string(),
            game.name.to_string(),
            game.save_extensions
                .iter()
                .map(|ext| format!(".{ext}"))
                .collect::<Vec<_>>()
                .join(", "),
            game.co_save_extension
                .map(|ext| format!(".{ext}"))
                .unwrap_or_else(|| "-".to_string()),
            ini,
        ]);
    }

    println!("{table}");
    Ok(())
}
