// Convodesk
// Main entry point for the convodesk binary

use clap::Parser;
use convodesk_engine::cli::{Cli, Command, ConfigAction};
use convodesk_engine::config::Config;
use convodesk_engine::handlers::{
    handle_chat, handle_config_show, handle_sessions, handle_todo, OutputFormat,
};
use convodesk_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_or_create_at(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log beats config; RUST_LOG beats both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Convodesk v{} ({} - {})", version, commit, timestamp);

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Handle commands
    match cli.command {
        Command::Chat { template, session } => {
            tracing::info!("Starting chat session");
            handle_chat(template, session, &config, format).await
        }

        Command::Sessions { limit } => {
            tracing::info!("Showing last {} sessions", limit);
            handle_sessions(limit, &config, format).await
        }

        Command::Todo { action } => {
            tracing::info!("Todo management: {:?}", action);
            handle_todo(action, &config, format).await
        }

        Command::Config { action } => match action {
            ConfigAction::Show => handle_config_show(&config, format),
        },
    }
}
