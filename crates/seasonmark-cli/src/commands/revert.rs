use super::{build_reverter, connect, load_config};
use crate::output::Output;
use color_eyre::Result;
use overlay_config::PathManager;

pub async fn run_revert(output: &Output) -> Result<()> {
    let paths = PathManager::default();
    let config = load_config(&paths)?;
    let server = connect(&config, &paths).await?;

    let mut reconciler = build_reverter(&config, &paths, server);
    if reconciler.ledger().is_empty() {
        output.info("No overlays are tracked, nothing to revert");
        return Ok(());
    }

    let report = reconciler.revert_all().await;
    output.report("Revert", &report);

    let remaining = reconciler.ledger().len();
    if remaining > 0 {
        output.warn(format!(
            "{} overlay(s) could not be reverted and are still tracked; run 'seasonmark revert' again later",
            remaining
        ));
    } else {
        output.success("All overlays reverted");
    }
    Ok(())
}
