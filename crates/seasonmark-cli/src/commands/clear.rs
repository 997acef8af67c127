use crate::output::Output;
use color_eyre::Result;
use overlay_config::{Config, PathManager};
use std::fs;
use std::path::Path;

pub fn run_clear(previews: bool, staging: bool, ledger: bool, output: &Output) -> Result<()> {
    if !(previews || staging || ledger) {
        output.warn("No clear option specified. Use --previews, --staging or --ledger");
        output.info("\nExample: seasonmark clear --previews");
        return Ok(());
    }

    let paths = PathManager::default();
    // Directory overrides live in the config; fall back to defaults without one
    let config = Config::load_from_file(&paths.config_file()).unwrap_or_default();

    if previews {
        clear_dir(&config.preview_dir(&paths), "preview images", output)?;
    }
    if staging {
        clear_dir(&config.staging_dir(&paths), "staging files", output)?;
    }
    if ledger {
        let ledger_file = config.ledger_file(&paths);
        if ledger_file.exists() {
            fs::remove_file(&ledger_file).map_err(|e| {
                color_eyre::eyre::eyre!("Failed to remove ledger at {}: {}", ledger_file.display(), e)
            })?;
            output.success(format!("Cleared ledger: {}", ledger_file.display()));
            output.warn("Overlays already on the server are no longer tracked and will not be reverted");
        } else {
            output.info("No ledger found to clear");
        }
    }
    Ok(())
}

fn clear_dir(dir: &Path, what: &str, output: &Output) -> Result<()> {
    if !dir.exists() {
        output.info(format!("No {} found to clear", what));
        return Ok(());
    }
    let removed = remove_files(dir)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to clear {} at {}: {}", what, dir.display(), e))?;
    output.success(format!("Cleared {} {}: {}", removed, what, dir.display()));
    Ok(())
}

/// Remove the regular files in `dir`, leaving the directory itself in place.
fn remove_files(dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}
