use clap::{ArgAction, Parser, Subcommand};
use commands::{clear, config, daemon, revert, run, status};

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "seasonmark")]
#[command(about = "Seasonmark - Badge Plex posters while a new season is fresh")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass
    #[command(long_about = "Scan every show library, overlay the posters of shows whose latest season premiered within the configured window, and revert overlays that are no longer current. Preview mode writes images to the preview folder instead of uploading them.")]
    Run {
        /// Only render previews locally, never touch the server
        #[arg(long, action = ArgAction::SetTrue, conflicts_with = "commit")]
        preview: bool,

        /// Upload overlays to the server even if config says preview
        #[arg(long, action = ArgAction::SetTrue)]
        commit: bool,
    },
    /// Run continuously, reconciling on a fixed interval
    #[command(long_about = "Run Seasonmark in the foreground and reconcile every `scheduler.interval_hours` hours. A failed pass is logged and the next one runs on schedule.")]
    Daemon {
        /// Hours between passes (overrides scheduler.interval_hours)
        #[arg(long, value_name = "HOURS")]
        interval_hours: Option<u64>,

        /// Skip the pass on startup
        #[arg(long, action = ArgAction::SetTrue)]
        no_startup_run: bool,
    },
    /// Revert every tracked overlay and exit
    #[command(long_about = "Put back the original poster of every show in the ledger, regardless of whether its season is still new. Entries whose revert fails are kept for a later attempt.")]
    Revert,
    /// List shows that currently carry an overlay
    Status,
    /// Configure the server, token and settings
    #[command(long_about = "Manage configuration and credentials for Seasonmark. Use subcommands to view the configuration, write a default one, or set the Plex connection.")]
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
    /// Remove generated files
    #[command(long_about = "Delete preview images, leftover staging files or the overlay ledger. Clearing the ledger forgets which posters were overlaid without reverting them.")]
    Clear {
        /// Delete rendered preview images
        #[arg(long, action = ArgAction::SetTrue)]
        previews: bool,

        /// Delete leftover staging files
        #[arg(long, action = ArgAction::SetTrue)]
        staging: bool,

        /// Delete the overlay ledger
        #[arg(long, action = ArgAction::SetTrue)]
        ledger: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration (masks the token)
    Show {
        /// Show the token unmasked
        #[arg(long, action = ArgAction::SetTrue)]
        full: bool,
    },

    /// Configure the Plex connection
    #[command(long_about = "Store the Plex token in the credentials file and the server URL in the configuration. The token can also be supplied through the PLEX_TOKEN environment variable.")]
    Plex {
        /// Plex token (if not provided, will prompt)
        #[arg(long)]
        token: Option<String>,

        /// Plex server URL, e.g. http://localhost:32400
        #[arg(long)]
        server_url: Option<String>,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // The daemon sets up file logging itself
    if !matches!(cli.command, Commands::Daemon { .. }) {
        logging::init_logging(cli.verbose, cli.quiet).map_err(|e| color_eyre::eyre::eyre!("{}", e))?;
    }

    let output = output::Output::new(cli.output, cli.quiet);

    match cli.command {
        Commands::Run { preview, commit } => {
            let mode = if preview {
                Some(true)
            } else if commit {
                Some(false)
            } else {
                None
            };
            run::run_once(mode, &output).await
        }
        Commands::Daemon {
            interval_hours,
            no_startup_run,
        } => daemon::run_daemon(interval_hours, no_startup_run, cli.verbose, cli.quiet, &output).await,
        Commands::Revert => revert::run_revert(&output).await,
        Commands::Status => status::run_status(&output),
        Commands::Config { cmd } => config::run_config(cmd, &output).await,
        Commands::Clear { previews, staging, ledger } => clear::run_clear(previews, staging, ledger, &output),
    }
}
