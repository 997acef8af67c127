use crate::output::{Output, OutputFormat};
use crate::ConfigCommands;
use color_eyre::Result;
use comfy_table::{Cell, Table};
use overlay_config::{Config, CredentialStore, PathManager};
use overlay_sources::{MediaServer, PlexServer};
use owo_colors::OwoColorize;
use serde_json::json;

pub async fn run_config(cmd: ConfigCommands, output: &Output) -> Result<()> {
    match cmd {
        ConfigCommands::Show { full } => show_config(full, output),
        ConfigCommands::Plex { token, server_url } => configure_plex(token, server_url, output).await,
        ConfigCommands::Init { force } => init_config(force, output),
    }
}

fn mask_string(s: &str) -> String {
    if s.is_empty() {
        return "<not set>".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}

fn section_table(title: &str, rows: Vec<(&str, String)>) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        Cell::new(title)
            .fg(comfy_table::Color::Cyan)
            .add_attribute(comfy_table::Attribute::Bold),
        Cell::new(""),
    ]);
    for (key, value) in rows {
        table.add_row(vec![Cell::new(key), Cell::new(value)]);
    }
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table
}

fn show_config(full: bool, output: &Output) -> Result<()> {
    let paths = PathManager::default();
    let config_file = paths.config_file();

    if !config_file.exists() {
        output.warn(format!("Configuration file not found at: {}", config_file.display()));
        output.info("Create one with 'seasonmark config init'.");
        return Ok(());
    }

    let config = Config::load_from_file(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load config from {}: {}", config_file.display(), e))?;

    let mut cred_store = CredentialStore::new(paths.credentials_file());
    cred_store
        .load()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load credentials: {}", e))?;
    let token = cred_store.resolve_plex_token().unwrap_or_default();
    let token_display = if full { token.clone() } else { mask_string(&token) };

    let validation = config.validate().err().map(|e| e.to_string());
    let show_path = |p: std::path::PathBuf| p.display().to_string();

    match output.format() {
        OutputFormat::Human => {
            if output.is_quiet() {
                return Ok(());
            }
            println!("\n{}", "Configuration".bright_cyan().bold());
            println!("{}\n", config_file.display().to_string().dimmed());

            let tables = vec![
                section_table(
                    "Server",
                    vec![("URL", config.server.url.clone()), ("Token", token_display)],
                ),
                section_table(
                    "Overlay",
                    vec![
                        ("Image", show_path(config.overlay_image(&paths))),
                        ("Scale", config.overlay.scale.to_string()),
                        ("Window (days)", config.overlay.window_days.to_string()),
                    ],
                ),
                section_table(
                    "Revert",
                    vec![
                        ("Strategy", format!("{:?}", config.revert.strategy)),
                        ("Backup dir", show_path(config.backup_dir(&paths))),
                    ],
                ),
                section_table(
                    "Run",
                    vec![
                        ("Preview", config.run.preview.to_string()),
                        ("Preview dir", show_path(config.preview_dir(&paths))),
                        ("Staging dir", show_path(config.staging_dir(&paths))),
                        ("Ledger", show_path(config.ledger_file(&paths))),
                    ],
                ),
                section_table(
                    "Scheduler",
                    vec![
                        ("Interval (hours)", config.scheduler.interval_hours.to_string()),
                        ("Run on startup", config.scheduler.run_on_startup.to_string()),
                    ],
                ),
                section_table(
                    "Purge",
                    vec![
                        ("Attempts", config.purge.attempts.to_string()),
                        ("Backoff (seconds)", config.purge.backoff_seconds.to_string()),
                    ],
                ),
            ];
            for table in tables {
                println!("{}\n", table);
            }

            match validation {
                Some(problem) => output.error(format!("Configuration is invalid: {}", problem)),
                None => output.success("Configuration is valid"),
            }
        }
        OutputFormat::Json | OutputFormat::JsonPretty => {
            let mut data = serde_json::to_value(&config).unwrap_or_default();
            data["server"]["token"] = json!(token_display);
            output.json(&json!({
                "config_file": config_file.display().to_string(),
                "config": data,
                "valid": validation.is_none(),
                "error": validation,
            }));
        }
    }
    Ok(())
}

fn init_config(force: bool, output: &Output) -> Result<()> {
    let paths = PathManager::default();
    paths
        .ensure_directories()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create configuration directories: {}", e))?;

    let config_file = paths.config_file();
    if config_file.exists() && !force {
        output.warn(format!("Configuration already exists at {}", config_file.display()));
        output.info("Use --force to overwrite it.");
        return Ok(());
    }

    Config::default()
        .save_to_file(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to save config to {}: {}", config_file.display(), e))?;

    output.success(format!("Wrote default configuration to {}", config_file.display()));
    output.info(format!(
        "Place the badge image at {} or set overlay.image",
        Config::default().overlay_image(&paths).display()
    ));
    Ok(())
}

async fn configure_plex(token_arg: Option<String>, server_url_arg: Option<String>, output: &Output) -> Result<()> {
    let paths = PathManager::default();
    paths
        .ensure_directories()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create configuration directories: {}", e))?;

    let config_file = paths.config_file();
    let mut config = if config_file.exists() {
        Config::load_from_file(&config_file)
            .map_err(|e| color_eyre::eyre::eyre!("Failed to load config from {}: {}", config_file.display(), e))?
    } else {
        output.info("Configuration file not found. Creating default configuration...");
        Config::default()
    };

    let token = match token_arg {
        Some(token) => token,
        None => dialoguer::Password::new()
            .with_prompt("Plex token")
            .interact()
            .map_err(|e| color_eyre::eyre::eyre!("Failed to read token: {}", e))?,
    };
    let token = token.trim().to_string();
    if token.is_empty() {
        return Err(color_eyre::eyre::eyre!("Plex token is required"));
    }

    if let Some(url) = server_url_arg {
        let url = url.trim().trim_end_matches('/').to_string();
        if url.is_empty() {
            return Err(color_eyre::eyre::eyre!("Server URL cannot be empty"));
        }
        config.server.url = url;
    }

    output.info(format!("Verifying connection to {}...", config.server.url));
    let verified = match PlexServer::new(&token, &config.server.url) {
        Ok(server) => server.check_connection().await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    match verified {
        Ok(()) => output.success("Connected to Plex"),
        Err(e) => output.warn(format!("Could not verify the connection: {}. Saving anyway.", e)),
    }

    config
        .save_to_file(&config_file)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to save config to {}: {}", config_file.display(), e))?;

    let credentials_file = paths.credentials_file();
    let mut cred_store = CredentialStore::new(credentials_file.clone());
    cred_store
        .load()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to load credentials from {}: {}", credentials_file.display(), e))?;
    cred_store.set_plex_token(token);
    cred_store
        .save()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to save credentials to {}: {}", credentials_file.display(), e))?;

    output.success("Plex configuration saved!");
    output.info(format!("  Server URL: {}", config.server.url));
    Ok(())
}
