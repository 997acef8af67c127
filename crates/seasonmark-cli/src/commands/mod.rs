pub mod clear;
pub mod config;
pub mod daemon;
pub mod revert;
pub mod run;
pub mod status;

use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use overlay_config::{Config, CredentialStore, PathManager};
use overlay_core::{build_strategy, Compositor, OverlayLedger, ReconcileOptions, Reconciler};
use overlay_sources::{MediaServer, PlexServer};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Load and validate `config.toml`, failing if it does not exist yet.
pub fn load_config(paths: &PathManager) -> Result<Config> {
    let config_file = paths.config_file();
    if !config_file.exists() {
        return Err(color_eyre::eyre::eyre!(
            "Configuration file not found at {}. Run 'seasonmark config init' first.",
            config_file.display()
        ));
    }

    let config = Config::load_from_file(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load config from {}: {}", config_file.display(), e))?;
    config
        .validate()
        .map_err(|e| color_eyre::eyre::eyre!("Invalid configuration in {}: {}", config_file.display(), e))?;
    Ok(config)
}

/// Build the Plex client and make sure the server answers before doing anything else.
pub async fn connect(config: &Config, paths: &PathManager) -> Result<Arc<dyn MediaServer>> {
    let credentials_file = paths.credentials_file();
    let mut cred_store = CredentialStore::new(credentials_file.clone());
    cred_store
        .load()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load credentials from {}: {}", credentials_file.display(), e))?;

    let token = cred_store.resolve_plex_token().ok_or_else(|| {
        color_eyre::eyre::eyre!("No Plex token configured. Run 'seasonmark config plex' or set PLEX_TOKEN.")
    })?;

    let server = PlexServer::new(&token, &config.server.url)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create Plex client: {}", e))?;
    server
        .check_connection()
        .await
        .wrap_err_with(|| format!("Could not connect to Plex at {}", config.server.url))?;

    Ok(Arc::new(server))
}

fn reconcile_options(config: &Config, paths: &PathManager, preview: bool) -> ReconcileOptions {
    ReconcileOptions {
        window_days: config.overlay.window_days,
        preview,
        preview_dir: config.preview_dir(paths),
        staging_dir: config.staging_dir(paths),
        purge_attempts: config.purge.attempts,
        purge_backoff: Duration::from_secs(config.purge.backoff_seconds),
    }
}

/// Reconciler without a compositor, for reverting only.
pub fn build_reverter(
    config: &Config,
    paths: &PathManager,
    server: Arc<dyn MediaServer>,
) -> Reconciler {
    let ledger_file = config.ledger_file(paths);
    debug!("Using ledger {}", ledger_file.display());
    Reconciler::new(
        server,
        build_strategy(config.revert.strategy, &config.backup_dir(paths)),
        OverlayLedger::load(ledger_file),
        reconcile_options(config, paths, false),
    )
}

/// Reconciler ready to apply overlays; fails if the overlay image is missing.
pub fn build_reconciler(
    config: &Config,
    paths: &PathManager,
    server: Arc<dyn MediaServer>,
    preview: bool,
) -> Result<Reconciler> {
    let image = config.overlay_image(paths);
    if !image.exists() {
        return Err(color_eyre::eyre::eyre!("Overlay image not found at {}", image.display()));
    }
    let compositor = Compositor::load(&image, config.overlay.scale)
        .map_err(|e| color_eyre::eyre::eyre!("{:#}", e))?;

    let ledger_file = config.ledger_file(paths);
    debug!("Using ledger {}", ledger_file.display());
    Ok(Reconciler::new(
        server,
        build_strategy(config.revert.strategy, &config.backup_dir(paths)),
        OverlayLedger::load(ledger_file),
        reconcile_options(config, paths, preview),
    )
    .with_compositor(compositor))
}
