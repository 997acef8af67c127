use super::load_config;
use crate::output::{Output, OutputFormat};
use color_eyre::Result;
use comfy_table::{Cell, Table};
use overlay_config::PathManager;
use overlay_core::{LedgerEntry, OverlayLedger};
use overlay_models::RatingKey;
use owo_colors::OwoColorize;
use serde_json::json;

fn season_label(entry: &LedgerEntry) -> String {
    match &entry.season {
        Some(season) => match season.index {
            Some(index) => format!("Season {} ({})", index, season.restore.label()),
            None => format!("{} ({})", season.rating_key, season.restore.label()),
        },
        None => "-".to_string(),
    }
}

fn sorted_entries(ledger: &OverlayLedger) -> Vec<(&RatingKey, &LedgerEntry)> {
    let mut entries: Vec<(&RatingKey, &LedgerEntry)> = ledger.iter().collect();
    entries.sort_by(|a, b| a.1.title.cmp(&b.1.title).then_with(|| a.0.cmp(b.0)));
    entries
}

pub fn run_status(output: &Output) -> Result<()> {
    let paths = PathManager::default();
    let config = load_config(&paths)?;
    let ledger_file = config.ledger_file(&paths);
    let ledger = OverlayLedger::load(&ledger_file);

    match output.format() {
        OutputFormat::Human => {
            if output.is_quiet() {
                return Ok(());
            }
            if ledger.is_empty() {
                output.info(format!("No overlays tracked in {}", ledger_file.display()));
                return Ok(());
            }

            let mut table = Table::new();
            table.set_header(vec![
                Cell::new("Key").add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Title").add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Mode").add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Since").add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Show poster").add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Season poster").add_attribute(comfy_table::Attribute::Bold),
            ]);
            for (key, entry) in sorted_entries(&ledger) {
                let mode = match entry.mode {
                    overlay_core::OverlayMode::Committed => Cell::new(entry.mode.label()).fg(comfy_table::Color::Green),
                    overlay_core::OverlayMode::Preview => Cell::new(entry.mode.label()).fg(comfy_table::Color::Yellow),
                };
                table.add_row(vec![
                    Cell::new(key.as_str()),
                    Cell::new(&entry.title),
                    mode,
                    Cell::new(entry.timestamp.format("%Y-%m-%d %H:%M UTC").to_string()),
                    Cell::new(entry.show.label()),
                    Cell::new(season_label(entry)),
                ]);
            }
            table.load_preset(comfy_table::presets::UTF8_FULL);
            table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);

            println!("{}", "Tracked overlays".bright_cyan().bold());
            println!("{}", table);
            println!("{} entries in {}", ledger.len(), ledger_file.display());
        }
        OutputFormat::Json | OutputFormat::JsonPretty => {
            let entries: Vec<serde_json::Value> = sorted_entries(&ledger)
                .into_iter()
                .map(|(key, entry)| {
                    json!({
                        "rating_key": key,
                        "entry": entry,
                    })
                })
                .collect();
            output.json(&json!({
                "ledger_file": ledger_file.display().to_string(),
                "count": ledger.len(),
                "entries": entries,
            }));
        }
    }
    Ok(())
}
