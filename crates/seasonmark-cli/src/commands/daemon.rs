use super::{build_reconciler, connect, load_config};
use crate::logging;
use crate::output::Output;
use color_eyre::Result;
use overlay_config::{Config, PathManager};
use overlay_core::ReconcileReport;
use overlay_sources::MediaServer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct Scheduler {
    config: Config,
    paths: PathManager,
    server: Arc<dyn MediaServer>,
    interval: Duration,
    run_on_startup: bool,
}

impl Scheduler {
    pub fn new(config: Config, paths: PathManager, server: Arc<dyn MediaServer>) -> Self {
        let interval = Duration::from_secs(config.scheduler.interval_hours.saturating_mul(3600));
        let run_on_startup = config.scheduler.run_on_startup;
        Self {
            config,
            paths,
            server,
            interval,
            run_on_startup,
        }
    }

    /// Loop forever. A failed pass is logged and never ends the loop.
    pub async fn start(&mut self) {
        if self.run_on_startup {
            info!(operation = "scheduler_startup", "Running initial pass on startup");
            self.run_guarded().await;
        }

        info!(
            operation = "scheduler_started",
            interval_hours = self.config.scheduler.interval_hours,
            "Scheduler started"
        );

        loop {
            tokio::time::sleep(self.interval).await;
            info!(operation = "scheduled_run_start", "Starting scheduled pass");
            self.run_guarded().await;
        }
    }

    async fn run_guarded(&self) {
        match self.run_pass().await {
            Ok(report) => info!(
                operation = "scheduled_run_complete",
                applied = report.applied,
                reverted = report.reverted,
                purged = report.purged,
                errors = report.errors.len(),
                duration_ms = report.duration_ms,
                "Scheduled pass completed"
            ),
            Err(e) => error!(
                operation = "scheduled_run_error",
                error = %e,
                "Scheduled pass failed"
            ),
        }
    }

    /// Config and ledger are re-read every pass so edits apply without a restart.
    async fn run_pass(&self) -> Result<ReconcileReport> {
        let config = match load_config(&self.paths) {
            Ok(config) => config,
            Err(e) => {
                warn!("Could not reload configuration, using the one loaded at startup: {}", e);
                self.config.clone()
            }
        };
        let mut reconciler = build_reconciler(&config, &self.paths, self.server.clone(), config.run.preview)?;
        reconciler
            .run(chrono::Utc::now())
            .await
            .map_err(|e| color_eyre::eyre::eyre!("Reconciliation failed in daemon: {:#}", e))
    }
}

pub async fn run_daemon(
    interval_override: Option<u64>,
    no_startup_run: bool,
    verbose: u8,
    quiet: bool,
    output: &Output,
) -> Result<()> {
    let paths = PathManager::default();
    paths
        .ensure_directories()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create directories: {}", e))?;

    let log_file = paths.daemon_log_file();
    logging::init_daemon_logging(verbose, quiet, &log_file).map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let mut config = load_config(&paths)?;
    if let Some(hours) = interval_override {
        if hours == 0 {
            return Err(color_eyre::eyre::eyre!("--interval-hours must be at least 1"));
        }
        config.scheduler.interval_hours = hours;
    }
    if no_startup_run {
        config.scheduler.run_on_startup = false;
    }

    // Fail fast on a missing overlay image before the first sleep
    let image = config.overlay_image(&paths);
    if !image.exists() {
        return Err(color_eyre::eyre::eyre!("Overlay image not found at {}", image.display()));
    }

    let server = connect(&config, &paths).await?;

    output.info(format!(
        "Daemon started: every {} hour(s), logging to {}",
        config.scheduler.interval_hours,
        log_file.display()
    ));

    let mut scheduler = Scheduler::new(config, paths, server);
    tokio::select! {
        _ = scheduler.start() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!(operation = "scheduler_stopped", "Shutdown requested, stopping daemon");
        }
    }
    Ok(())
}
