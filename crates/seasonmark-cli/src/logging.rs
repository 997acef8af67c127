use anyhow::Result;
use std::io;
use std::io::IsTerminal;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, time::ChronoUtc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Filter directives for the given verbosity.
///
/// 0 = info, 1 = debug with hyper's connection chatter suppressed, 2+ = trace.
fn filter_directives(verbose_level: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose_level {
        0 => "info",
        1 => "debug,hyper::proto::h1=warn,hyper::client::pool=warn",
        _ => "trace",
    }
}

fn build_filter(verbose_level: u8, quiet: bool) -> EnvFilter {
    let directives = filter_directives(verbose_level, quiet);
    if quiet {
        // RUST_LOG must not make -q chatty
        return EnvFilter::new(directives);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives))
}

fn json_output() -> bool {
    std::env::var("RUST_LOG_JSON")
        .map(|v| v == "true")
        .unwrap_or_else(|_| !io::stdout().is_terminal())
}

/// Split `seasonmark.log` into the directory and the prefix the daily
/// appender rotates under (`seasonmark.YYYY-MM-DD`).
fn rotation_parts(log_path: &Path) -> Result<(&Path, &str)> {
    let dir = log_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Log file path has no parent directory"))?;
    let file_name = log_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid log filename"))?;
    let prefix = file_name.rsplit_once('.').map_or(file_name, |(stem, _)| stem);
    Ok((dir, prefix))
}

pub fn init_logging(verbose_level: u8, quiet: bool) -> Result<()> {
    let registry = Registry::default().with(build_filter(verbose_level, quiet));

    if json_output() {
        registry
            .with(fmt::layer().json().with_timer(ChronoUtc::rfc_3339()).with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_timer(ChronoUtc::rfc_3339()).with_writer(io::stderr))
            .init();
    }
    Ok(())
}

/// Log to stderr and to a daily-rotated file, for long-running processes.
pub fn init_daemon_logging(verbose_level: u8, quiet: bool, log_path: &Path) -> Result<()> {
    let (dir, prefix) = rotation_parts(log_path)?;
    std::fs::create_dir_all(dir)?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, prefix);

    let registry = Registry::default().with(build_filter(verbose_level, quiet));

    if json_output() {
        registry
            .with(fmt::layer().json().with_timer(ChronoUtc::rfc_3339()).with_writer(io::stderr))
            .with(fmt::layer().json().with_timer(ChronoUtc::rfc_3339()).with_writer(file_appender))
            .init();
    } else {
        registry
            .with(fmt::layer().with_timer(ChronoUtc::rfc_3339()).with_writer(io::stderr))
            .with(
                fmt::layer()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_writer(file_appender),
            )
            .init();
    }
    Ok(())
}
