//! Scan command: a single scan pass over a directory.

use std::path::Path;
use std::sync::Arc;

use comfy_table::{Table, presets::UTF8_FULL};

use crate::config::Settings;
use crate::decoder::GamebryoDecoder;
use crate::games::GameTable;
use crate::scanner::SaveScanner;
use crate::types::SaveRecord;

/// Run scan command - decode every save in `directory` and print the result.
pub async fn run_scan(
    directory: &Path,
    game_id: &str,
    json: bool,
    config: &Settings,
) -> anyhow::Result<()> {
    let Some(game) = GameTable::new().get(game_id) else {
        anyhow::bail!("Unsupported game: {game_id}\nRun `savewatch games` for the list");
    };

    let scanner = SaveScanner::new(Arc::new(GamebryoDecoder::new()), game.save_extensions)
        .with_retry(config.scan.retry_policy());
    let result = scanner.scan(directory, |_| false).await?;

    if json {
        let output = serde_json::json!({
            "directory": directory,
            "game": game.id,
            "saves": result.new_records,
            "failures": result.failures,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if result.new_records.is_empty() && result.failures.is_empty() {
        println!("No {} saves in {}", game.name, directory.display());
        return Ok(());
    }

    if !result.new_records.is_empty() {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Save", "#", "Character", "Level", "Location", "Co-save"]);
        for record in &result.new_records {
            table.add_row(record_row(record, |path| {
                game.auxiliary_files(path).iter().any(|aux| aux.exists())
            }));
        }
        println!("{table}");
    }

    for failure in &result.failures {
        eprintln!("Failed to read {}: {}", failure.file_name, failure.message);
    }

    println!(
        "\n{} saves, {} unreadable",
        result.new_records.len(),
        result.failures.len()
    );
    Ok(())
}

fn record_row(record: &SaveRecord, has_co_save: impl Fn(&Path) -> bool) -> Vec<String> {
    let metadata = &record.attributes.metadata;
    vec![
        record.id.to_string(),
        metadata.save_number.to_string(),
        metadata.character_name.clone(),
        metadata.level.to_string(),
        metadata.location.clone(),
        if has_co_save(&record.file_path) { "yes" } else { "no" }.to_string(),
    ]
}
