//! Command-line interface definition for RecallAI
//!
//! This module defines the CLI structure using clap's derive API,
//! providing the interactive chat plus one-shot conversation commands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// RecallAI - terminal client for the RecallAI note-taking assistant
///
/// Hold conversations with the assistant, then bookmark, react to, branch,
/// archive, share and export them.
#[derive(Parser, Debug, Clone)]
#[command(name = "recallai")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Override the service base URL from config
    #[arg(long)]
    pub base_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for RecallAI
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive conversation
    Chat {
        /// Open an existing conversation instead of starting a new one
        #[arg(long)]
        conversation: Option<String>,
    },

    /// List conversations
    List {
        /// Show archived conversations instead of active ones
        #[arg(short, long)]
        archived: bool,
    },

    /// Archive or unarchive a conversation
    Archive {
        /// Conversation ID
        id: String,
    },

    /// Delete a conversation
    Delete {
        /// Conversation ID
        id: String,
    },

    /// Create a public share link for a conversation
    Share {
        /// Conversation ID
        id: String,
    },

    /// Read a shared conversation (no login required)
    Shared {
        /// Share token or full share URL
        token: String,
    },

    /// Export a conversation to a file
    Export {
        /// Conversation ID
        id: String,

        /// Export format (json, pdf, markdown)
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Directory to write into (defaults to the download directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List bookmarked messages
    Bookmarks,

    /// Ask a question across all conversation summaries
    Query {
        /// Question text
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },

    /// Show conversation statistics
    Analytics,

    /// Log in to the service
    Login {
        /// User name
        #[arg(short, long)]
        username: String,

        /// Password
        #[arg(short, long, env = "RECALLAI_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account and log in
    Register {
        /// User name
        #[arg(short, long)]
        username: String,

        /// Password
        #[arg(short, long, env = "RECALLAI_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log out and forget the stored session
    Logout,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_chat_with_conversation() {
        let cli = Cli::try_parse_from(["recallai", "chat", "--conversation", "abc"]).unwrap();
        match cli.command {
            Commands::Chat { conversation } => assert_eq!(conversation.as_deref(), Some("abc")),
            _ => panic!("Expected Chat command"),
        }
    }

    #[test]
    fn test_cli_parse_list_archived() {
        let cli = Cli::try_parse_from(["recallai", "list", "--archived"]).unwrap();
        assert!(matches!(cli.command, Commands::List { archived: true }));
    }

    #[test]
    fn test_cli_parse_export_defaults() {
        let cli = Cli::try_parse_from(["recallai", "export", "abc"]).unwrap();
        match cli.command {
            Commands::Export { id, format, output } => {
                assert_eq!(id, "abc");
                assert_eq!(format, "json");
                assert!(output.is_none());
            }
            _ => panic!("Expected Export command"),
        }
    }

    #[test]
    fn test_cli_parse_query_joins_words() {
        let cli = Cli::try_parse_from(["recallai", "query", "what", "did", "I", "plan"]).unwrap();
        match cli.command {
            Commands::Query { text } => assert_eq!(text.join(" "), "what did I plan"),
            _ => panic!("Expected Query command"),
        }
    }

    #[test]
    fn test_cli_global_overrides() {
        let cli = Cli::try_parse_from([
            "recallai",
            "--base-url",
            "http://example.com/api",
            "-v",
            "analytics",
        ])
        .unwrap();
        assert_eq!(cli.base_url.as_deref(), Some("http://example.com/api"));
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["recallai"]).is_err());
    }
}
