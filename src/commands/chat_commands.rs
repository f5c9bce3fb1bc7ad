//! Slash command parser for the interactive chat
//!
//! Anything that is not a command is sent to the assistant as a message.
//! Command names are case-insensitive; message indices are the 1-based
//! numbers shown next to each message in the transcript.

use crate::export::ExportFormat;
use crate::models::ReactionKind;
use thiserror::Error;

/// Errors that can occur when parsing chat commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Commands available inside the chat loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// End and summarize the conversation
    End,
    /// Start a fresh conversation
    New,
    /// Open an existing conversation by id
    Open(String),
    /// Reload the current conversation from the service
    Reload,
    /// Print the whole transcript again
    History,
    /// Toggle the bookmark on message N
    Bookmark(usize),
    /// Toggle a reaction on message N
    React(usize, ReactionKind),
    /// Continue from message N on a side branch
    Branch {
        index: usize,
        content: String,
        name: Option<String>,
    },
    /// Show the branches of message N
    Branches(usize),
    /// Create a public share link
    Share,
    /// Export the conversation
    Export(ExportFormat),
    /// Show follow-up suggestions
    Suggest,
    /// Show help
    Help,
    /// Leave the chat
    Exit,
    /// Not a command; send the input as a message
    None,
}

fn missing(command: &str, usage: &str) -> CommandError {
    CommandError::MissingArgument {
        command: command.to_string(),
        usage: usage.to_string(),
    }
}

fn parse_index(command: &str, arg: &str) -> Result<usize, CommandError> {
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CommandError::UnsupportedArgument {
            command: command.to_string(),
            arg: arg.to_string(),
        }),
    }
}

/// Parse one line of chat input
///
/// # Examples
///
/// ```
/// use recallai::commands::chat_commands::{parse_chat_command, ChatCommand};
/// use recallai::models::ReactionKind;
///
/// assert_eq!(parse_chat_command("/end"), Ok(ChatCommand::End));
/// assert_eq!(
///     parse_chat_command("/react 2 heart"),
///     Ok(ChatCommand::React(2, ReactionKind::Heart))
/// );
/// assert_eq!(parse_chat_command("hello"), Ok(ChatCommand::None));
/// ```
pub fn parse_chat_command(input: &str) -> Result<ChatCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if lower == "exit" || lower == "quit" {
        return Ok(ChatCommand::Exit);
    }
    if !trimmed.starts_with('/') {
        return Ok(ChatCommand::None);
    }

    let (head, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) => (head.to_lowercase(), rest.trim()),
        None => (lower.clone(), ""),
    };

    match head.as_str() {
        "/end" => Ok(ChatCommand::End),
        "/new" => Ok(ChatCommand::New),
        "/reload" => Ok(ChatCommand::Reload),
        "/history" => Ok(ChatCommand::History),
        "/share" => Ok(ChatCommand::Share),
        "/suggest" | "/suggestions" => Ok(ChatCommand::Suggest),
        "/help" | "/?" => Ok(ChatCommand::Help),
        "/exit" | "/quit" => Ok(ChatCommand::Exit),

        "/open" if rest.is_empty() => Err(missing("/open", "/open <conversation_id>")),
        "/open" => Ok(ChatCommand::Open(rest.to_string())),

        "/bookmark" if rest.is_empty() => Err(missing("/bookmark", "/bookmark <n>")),
        "/bookmark" => Ok(ChatCommand::Bookmark(parse_index("/bookmark", rest)?)),

        "/branches" if rest.is_empty() => Err(missing("/branches", "/branches <n>")),
        "/branches" => Ok(ChatCommand::Branches(parse_index("/branches", rest)?)),

        "/react" => {
            let mut parts = rest.split_whitespace();
            let (Some(index), Some(kind)) = (parts.next(), parts.next()) else {
                return Err(missing("/react", "/react <n> <heart|thumbsup|smile>"));
            };
            let index = parse_index("/react", index)?;
            let kind = kind
                .parse::<ReactionKind>()
                .map_err(|_| CommandError::UnsupportedArgument {
                    command: "/react".to_string(),
                    arg: kind.to_string(),
                })?;
            Ok(ChatCommand::React(index, kind))
        }

        "/branch" => {
            let usage = "/branch <n> [--name <label>] <text>";
            let Some((index, tail)) = rest.split_once(char::is_whitespace) else {
                return Err(missing("/branch", usage));
            };
            let index = parse_index("/branch", index)?;
            let tail = tail.trim();
            let (name, content) = match tail.strip_prefix("--name") {
                Some(named) => {
                    let named = named.trim_start();
                    match named.split_once(char::is_whitespace) {
                        Some((name, content)) => (Some(name.to_string()), content.trim()),
                        None => (Some(named.to_string()), ""),
                    }
                }
                None => (None, tail),
            };
            if content.is_empty() {
                return Err(missing("/branch", usage));
            }
            Ok(ChatCommand::Branch {
                index,
                content: content.to_string(),
                name,
            })
        }

        "/export" if rest.is_empty() => Ok(ChatCommand::Export(ExportFormat::default())),
        "/export" => rest
            .parse::<ExportFormat>()
            .map(ChatCommand::Export)
            .map_err(|_| CommandError::UnsupportedArgument {
                command: "/export".to_string(),
                arg: rest.to_string(),
            }),

        other => Err(CommandError::UnknownCommand(other.to_string())),
    }
}

/// Print help for chat commands
pub fn print_help() {
    println!(
        r#"
Chat Commands
=============

CONVERSATION:
  <text>              - Send a message to the assistant
  /end                - End the conversation and generate a summary
  /new                - Start a new conversation
  /open <id>          - Open an existing conversation
  /reload             - Reload the conversation from the server
  /history            - Show the transcript again
  /suggest            - Show follow-up suggestions

MESSAGES (n is the number shown next to a message):
  /bookmark <n>       - Toggle bookmark
  /react <n> <kind>   - Toggle a reaction (heart, thumbsup, smile)
  /branch <n> [--name <label>] <text>
                      - Continue from message n on a side branch
  /branches <n>       - Show branches of message n

SHARING:
  /share              - Create a public share link
  /export [format]    - Export as json (default), pdf or markdown

SESSION CONTROL:
  /help               - Show this help message
  exit                - Leave the chat
  quit                - Same as exit
"#
    );
}
