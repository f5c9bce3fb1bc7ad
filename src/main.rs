//! RecallAI - terminal client for the note-taking assistant
//!
#![doc = "RecallAI - terminal client for the note-taking assistant"]
#![doc = "Main entry point for the RecallAI CLI."]

use anyhow::Result;

use recallai::cli::{Cli, Commands};
use recallai::commands;
use recallai::config::Config;
use recallai::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Initialize tracing
    init_logging(&config.logging)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat { conversation } => {
            tracing::info!("Starting interactive chat");
            if let Some(id) = &conversation {
                tracing::debug!("Opening conversation: {}", id);
            }
            commands::chat::run_chat(config, conversation).await
        }
        Commands::List { archived } => commands::run_list(&config, archived).await,
        Commands::Archive { id } => commands::run_archive(&config, &id).await,
        Commands::Delete { id } => commands::run_delete(&config, &id).await,
        Commands::Share { id } => commands::run_share(&config, &id).await,
        Commands::Shared { token } => commands::run_shared(&config, &token).await,
        Commands::Export { id, format, output } => {
            commands::run_export(&config, &id, &format, output).await
        }
        Commands::Bookmarks => commands::run_bookmarks(&config).await,
        Commands::Query { text } => commands::run_query(&config, &text.join(" ")).await,
        Commands::Analytics => commands::run_analytics(&config).await,
        Commands::Login { username, password } => {
            commands::run_login(&config, &username, &password, false).await
        }
        Commands::Register { username, password } => {
            commands::run_login(&config, &username, &password, true).await
        }
        Commands::Logout => commands::run_logout(&config).await,
    }
}
