use super::{build_reconciler, connect, load_config};
use crate::output::Output;
use color_eyre::Result;
use overlay_config::PathManager;
use tracing::debug;

/// One reconciliation pass. `preview` overrides `run.preview` when set.
pub async fn run_once(preview: Option<bool>, output: &Output) -> Result<()> {
    debug!("Run command started");

    let paths = PathManager::default();
    let config = load_config(&paths)?;
    let preview = preview.unwrap_or(config.run.preview);

    let server = connect(&config, &paths).await?;
    let mut reconciler = build_reconciler(&config, &paths, server, preview)?;

    if preview {
        output.info(format!(
            "Preview mode: images go to {}, nothing is uploaded",
            config.preview_dir(&paths).display()
        ));
    }

    let report = reconciler
        .run(chrono::Utc::now())
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Reconciliation failed: {:#}", e))?;

    output.report(if preview { "Preview run" } else { "Run" }, &report);
    if !report.errors.is_empty() {
        output.warn(format!("{} show(s) had errors, see the log for details", report.errors.len()));
    }
    Ok(())
}
