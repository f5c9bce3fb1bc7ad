/*!
Command handlers for the CLI

This module provides the handlers invoked by the CLI entrypoint:

- `chat`: interactive conversation loop
- one-shot handlers for listing, archiving, deleting, sharing, exporting,
  library views and account commands

Handlers talk to the service through the same controllers a graphical front
end would use, and print the controllers' notices.
*/

use crate::config::Config;
use crate::error::{ErrorKind, RecallError, Result};
use crate::export::{ExportFormat, FsExportSink};
use crate::library::LibraryController;
use crate::list::{ConversationListController, RefreshTrigger};
use crate::models::{Analytics, Conversation, ConversationId, Message, ReactionKind, Sender};
use crate::service::{ConversationService, HttpConversationService};
use crate::session::{Notice, NoticeLevel, SessionController};
use colored::Colorize;
use prettytable::{format, row, Table};
use std::path::PathBuf;
use std::sync::Arc;

// Slash command parser for the chat loop
pub mod chat_commands;

/// Location of the persisted session cookies
///
/// `RECALLAI_SESSION_FILE` overrides the platform data directory.
pub fn session_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("RECALLAI_SESSION_FILE") {
        return Some(PathBuf::from(path));
    }
    directories::ProjectDirs::from("", "", "recallai").map(|dirs| dirs.data_dir().join("session"))
}

fn save_session(service: &HttpConversationService) -> Result<()> {
    let (Some(path), Some(cookies)) = (session_file(), service.session_cookies()) else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, cookies)?;
    tracing::debug!(path = %path.display(), "Saved session cookies");
    Ok(())
}

fn forget_session() -> Result<()> {
    if let Some(path) = session_file() {
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Build the HTTP client, restore the stored session and obtain the
/// anti-forgery cookie
pub async fn connect(config: &Config) -> Result<Arc<HttpConversationService>> {
    let service = HttpConversationService::new(&config.service)?;

    if let Some(path) = session_file() {
        if let Ok(cookies) = std::fs::read_to_string(&path) {
            service.restore_session_cookies(cookies.trim());
            tracing::debug!(path = %path.display(), "Restored session cookies");
        }
    }

    if service.csrf_token().is_none() {
        if let Err(e) = service.handshake().await {
            tracing::warn!("Anti-forgery handshake failed: {:#}", e);
        }
    }

    Ok(Arc::new(service))
}

/// Print controller notices
pub fn print_notices(notices: &[Notice]) {
    for notice in notices {
        match notice.level {
            NoticeLevel::Success => println!("{}", notice.text.green()),
            NoticeLevel::Error => eprintln!("{}", notice.text.red()),
        }
    }
}

/// Turn an error into a user-facing hint where one exists
fn explain(error: anyhow::Error) -> anyhow::Error {
    if ErrorKind::classify(&error) == ErrorKind::Unauthenticated {
        eprintln!(
            "{}",
            format!("Not logged in. Run {} first.", "recallai login").yellow()
        );
    }
    error
}

fn sender_label(sender: Sender) -> colored::ColoredString {
    match sender {
        Sender::User => "You".bold().blue(),
        Sender::Ai => "AI".bold().magenta(),
    }
}

fn reaction_glyph(kind: ReactionKind) -> &'static str {
    match kind {
        ReactionKind::Heart => "♥",
        ReactionKind::Thumbsup => "👍",
        ReactionKind::Smile => "☺",
    }
}

/// Print one message with its transcript number
pub fn print_message(index: usize, message: &Message) {
    let mut markers = String::new();
    if message.is_bookmarked {
        markers.push_str(" ★");
    }
    for kind in &message.reactions {
        markers.push(' ');
        markers.push_str(reaction_glyph(*kind));
    }
    if let Some(name) = &message.branch_name {
        markers.push_str(&format!(" [{}]", name));
    }
    println!(
        "{} {}{}\n{}\n",
        format!("[{}]", index).dimmed(),
        sender_label(message.sender),
        markers.yellow(),
        message.content
    );
}

/// Print a whole transcript
pub fn print_transcript(conversation_title: Option<&str>, messages: &[Message]) {
    if let Some(title) = conversation_title {
        println!("\n{}\n", title.bold());
    }
    if messages.is_empty() {
        println!("{}", "No messages yet.".yellow());
    }
    for (i, message) in messages.iter().enumerate() {
        print_message(i + 1, message);
    }
}

fn print_conversations(conversations: &[Conversation], archived: bool) {
    if conversations.is_empty() {
        let text = if archived {
            "No archived conversations."
        } else {
            "No conversations yet."
        };
        println!("{}", text.yellow());
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row!["ID".bold(), "Title".bold(), "Status".bold(), "Started".bold()]);

    for conversation in conversations {
        let started = conversation
            .start_time
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(row![
            conversation.id.as_str().cyan(),
            crate::models::derive_title(&conversation.title, 40, "..."),
            conversation.status,
            started
        ]);
    }

    println!();
    table.printstd();
    println!();
    println!(
        "Use {} to continue a conversation.",
        "recallai chat --conversation <ID>".cyan()
    );
}

fn print_analytics(analytics: &Analytics) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row!["Metric".bold(), "Value".bold()]);
    table.add_row(row!["Conversations", analytics.total_conversations]);
    table.add_row(row!["  active", analytics.active_conversations]);
    table.add_row(row!["  ended", analytics.ended_conversations]);
    table.add_row(row!["  archived", analytics.archived_conversations]);
    table.add_row(row!["  with summaries", analytics.conversations_with_summaries]);
    table.add_row(row!["  last 7 days", analytics.conversations_last_7_days]);
    table.add_row(row!["  last 30 days", analytics.conversations_last_30_days]);
    table.add_row(row!["Messages", analytics.total_messages]);
    table.add_row(row!["  from you", analytics.user_message_count]);
    table.add_row(row!["  from AI", analytics.ai_message_count]);
    table.add_row(row!["  last 7 days", analytics.messages_last_7_days]);
    table.add_row(row!["  bookmarked", analytics.bookmarked_messages_count]);
    table.add_row(row![
        "Avg messages / conversation",
        format!("{:.1}", analytics.avg_messages_per_conversation)
    ]);

    println!();
    table.printstd();

    if !analytics.conversations_by_date.is_empty() {
        println!("\n{}", "Conversations per day (last 30 days):".bold());
        for day in &analytics.conversations_by_date {
            println!("  {}  {}", day.date, "#".repeat(day.count as usize).green());
        }
    }
    println!();
}

/// `recallai list`
pub async fn run_list(config: &Config, archived: bool) -> Result<()> {
    let service = connect(config).await?;
    let list = ConversationListController::new(service, RefreshTrigger::new());
    list.set_show_archived(archived).await.map_err(explain)?;
    if !archived {
        list.reload().await.map_err(explain)?;
    }
    print_notices(&list.take_notices());
    print_conversations(&list.conversations(), archived);
    Ok(())
}

/// `recallai archive ID`
pub async fn run_archive(config: &Config, id: &str) -> Result<()> {
    let service = connect(config).await?;
    let list = ConversationListController::new(service, RefreshTrigger::new());
    let result = list.archive_toggle(&ConversationId::from(id)).await;
    print_notices(&list.take_notices());
    result.map(|_| ()).map_err(explain)
}

/// `recallai delete ID`
pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let service = connect(config).await?;
    let list = ConversationListController::new(service, RefreshTrigger::new());
    let result = list.delete(&ConversationId::from(id), None).await;
    print_notices(&list.take_notices());
    result.map_err(explain)
}

/// `recallai share ID`
pub async fn run_share(config: &Config, id: &str) -> Result<()> {
    let service = connect(config).await?;
    let session = SessionController::new(service, RefreshTrigger::new(), config);
    session.load(&ConversationId::from(id)).await.map_err(explain)?;
    let url = session.share().await.map_err(explain)?;
    print_notices(&session.take_notices());
    println!("{}", url.cyan());
    Ok(())
}

/// `recallai shared TOKEN`
pub async fn run_shared(config: &Config, token: &str) -> Result<()> {
    let service = Arc::new(HttpConversationService::new(&config.service)?);
    let library = LibraryController::new(service);
    match library.shared(token).await {
        Ok(conversation) => {
            print_transcript(Some(&conversation.title), &conversation.messages);
            if let Some(summary) = &conversation.summary {
                println!("{}\n{}\n", "Summary".bold(), summary);
            }
            Ok(())
        }
        Err(e) => {
            if ErrorKind::classify(&e) == ErrorKind::NotFound {
                eprintln!("{}", "This share link is invalid or has expired.".red());
            }
            Err(e)
        }
    }
}

/// `recallai export ID`
pub async fn run_export(
    config: &Config,
    id: &str,
    format: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let sink = match output {
        Some(dir) => FsExportSink::new(dir),
        None => FsExportSink::downloads(),
    };

    let service = connect(config).await?;
    let session = SessionController::new(service, RefreshTrigger::new(), config);
    session.load(&ConversationId::from(id)).await.map_err(explain)?;
    let result = session.export(format, &sink).await;
    print_notices(&session.take_notices());
    let path = result.map_err(explain)?;
    println!("Saved to {}", path.display().to_string().cyan());
    Ok(())
}

/// `recallai bookmarks`
pub async fn run_bookmarks(config: &Config) -> Result<()> {
    let service = connect(config).await?;
    let library = LibraryController::new(service);
    let messages = library.bookmarks().await.map_err(explain)?;
    if messages.is_empty() {
        println!("{}", "No bookmarked messages.".yellow());
        return Ok(());
    }
    for (i, message) in messages.iter().enumerate() {
        print_message(i + 1, message);
    }
    Ok(())
}

/// `recallai query TEXT`
pub async fn run_query(config: &Config, text: &str) -> Result<()> {
    let service = connect(config).await?;
    let library = LibraryController::new(service);
    let answer = library.query(text).await.map_err(explain)?;
    println!("\n{}\n", answer);
    Ok(())
}

/// `recallai analytics`
pub async fn run_analytics(config: &Config) -> Result<()> {
    let service = connect(config).await?;
    let library = LibraryController::new(service);
    let analytics = library.analytics().await.map_err(explain)?;
    print_analytics(&analytics);
    Ok(())
}

/// `recallai login` / `recallai register`
pub async fn run_login(
    config: &Config,
    username: &str,
    password: &str,
    register: bool,
) -> Result<()> {
    let service = connect(config).await?;
    let response = if register {
        service.register(username, password).await?
    } else {
        service.login(username, password).await?
    };
    save_session(&service)?;
    let who = response.username.as_deref().unwrap_or(username);
    println!("{} {}", response.message.green(), who.bold());
    Ok(())
}

/// `recallai logout`
pub async fn run_logout(config: &Config) -> Result<()> {
    let service = connect(config).await?;
    if let Err(e) = service.logout().await {
        tracing::warn!("Server logout failed: {:#}", e);
    }
    forget_session()?;
    println!("{}", "Logged out.".green());
    Ok(())
}

// Interactive chat handler
pub mod chat {
    //! Interactive conversation loop.
    //!
    //! Runs a readline-based loop over a [`SessionController`]. Plain input is
    //! sent as a message; slash commands drive the other session operations.

    use super::chat_commands::{parse_chat_command, print_help, ChatCommand};
    use super::*;
    use crate::models::MessageId;
    use crate::session::{EndDialog, SendOutcome, SessionPhase};
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    fn prompt(phase: &SessionPhase) -> String {
        let tag = match phase {
            SessionPhase::NoConversation => "new".cyan(),
            SessionPhase::Active(_) => "active".green(),
            SessionPhase::Ended(_) => "ended".yellow(),
        };
        format!("[{}] >> ", tag)
    }

    /// Map a transcript number to a confirmed message id
    ///
    /// Messages appended locally carry no id until the next load, so an
    /// unconfirmed target triggers one reload before giving up.
    async fn resolve(session: &SessionController, index: usize) -> Result<MessageId> {
        let lookup = |session: &SessionController| {
            session
                .with_store(|store| store.messages().get(index - 1).map(|m| m.id))
        };

        match lookup(session) {
            None => Err(RecallError::InvalidInput(format!("No message {}", index)).into()),
            Some(Some(id)) => Ok(id),
            Some(None) => {
                session.reload().await?;
                lookup(session).flatten().ok_or_else(|| {
                    RecallError::InvalidInput(format!("Message {} is not saved yet", index)).into()
                })
            }
        }
    }

    async fn handle(
        session: &SessionController,
        sink: &FsExportSink,
        command: ChatCommand,
    ) -> Result<()> {
        match command {
            ChatCommand::End => {
                println!("{}", "Ending conversation and generating summary...".dimmed());
                let response = match session.end().await {
                    Ok(response) => response,
                    Err(e) => {
                        if let EndDialog::Failed(text) = session.end_dialog() {
                            eprintln!("{}", text.red());
                        }
                        return Err(e);
                    }
                };
                println!("\n{}\n{}\n", "Summary".bold(), response.summary);
                if !response.key_points.is_empty() {
                    println!("{}", "Key points".bold());
                    for point in &response.key_points {
                        println!("  • {}", point);
                    }
                    println!();
                }
                if !response.insights.is_empty() {
                    println!("{}\n{}\n", "Insights".bold(), response.insights);
                }
                if session.end_dialog() == EndDialog::Completed {
                    println!("{}", "Conversation ended.".green());
                    session.new_conversation();
                }
            }
            ChatCommand::New => {
                session.new_conversation();
                println!("{}", "Started a new conversation.".green());
            }
            ChatCommand::Open(id) => {
                session.load(&ConversationId::new(id)).await?;
                let title = session.with_store(|s| s.title().map(str::to_string));
                print_transcript(title.as_deref(), &session.messages());
            }
            ChatCommand::Reload => {
                session.reload().await?;
                print_transcript(None, &session.messages());
            }
            ChatCommand::History => print_transcript(None, &session.messages()),
            ChatCommand::Bookmark(index) => {
                let id = resolve(session, index).await?;
                let bookmarked = session.toggle_bookmark(id).await?;
                let text = if bookmarked {
                    "Bookmarked."
                } else {
                    "Bookmark removed."
                };
                println!("{}", text.green());
            }
            ChatCommand::React(index, kind) => {
                let id = resolve(session, index).await?;
                let reactions = session.toggle_reaction(id, kind).await?;
                let glyphs: Vec<&str> = reactions.iter().map(|k| reaction_glyph(*k)).collect();
                println!("Reactions: {}", glyphs.join(" "));
            }
            ChatCommand::Branch {
                index,
                content,
                name,
            } => {
                let id = resolve(session, index).await?;
                let child = session.branch(id, &content, name.as_deref()).await?;
                println!("{}", "Branch created.".green());
                print_message(1, &child);
            }
            ChatCommand::Branches(index) => {
                let id = resolve(session, index).await?;
                let children = session.branches(id).await?;
                if children.is_empty() {
                    println!("{}", "No branches.".yellow());
                }
                for (i, child) in children.iter().enumerate() {
                    print_message(i + 1, child);
                }
            }
            ChatCommand::Share => {
                let url = session.share().await?;
                println!("{}", url.cyan());
            }
            ChatCommand::Export(format) => {
                let path = session.export(format, sink).await?;
                println!("Saved to {}", path.display().to_string().cyan());
            }
            ChatCommand::Suggest => {
                for suggestion in session.suggestions().await? {
                    println!("  • {}", suggestion.cyan());
                }
            }
            ChatCommand::Help => print_help(),
            ChatCommand::Exit | ChatCommand::None => {}
        }
        Ok(())
    }

    /// Start the interactive chat
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration
    /// * `conversation` - Optional conversation id to open first
    pub async fn run_chat(config: Config, conversation: Option<String>) -> Result<()> {
        let service = connect(&config).await?;
        run_chat_with(service, &config, conversation).await
    }

    /// Chat loop over any service implementation
    pub async fn run_chat_with(
        service: Arc<dyn ConversationService>,
        config: &Config,
        conversation: Option<String>,
    ) -> Result<()> {
        let session = SessionController::new(service, RefreshTrigger::new(), config);
        let sink = FsExportSink::downloads();

        if let Some(id) = conversation {
            if session.load(&ConversationId::new(id)).await.is_ok() {
                let title = session.with_store(|s| s.title().map(str::to_string));
                print_transcript(title.as_deref(), &session.messages());
            }
            print_notices(&session.take_notices());
        }

        let mut rl = DefaultEditor::new()?;
        println!(
            "{}  Type {} for commands, {} to leave.\n",
            "RecallAI".bold().magenta(),
            "/help".cyan(),
            "exit".cyan()
        );

        loop {
            match rl.readline(&prompt(&session.phase())) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(trimmed);

                    match parse_chat_command(trimmed) {
                        Ok(ChatCommand::Exit) => break,
                        Ok(ChatCommand::None) => {
                            println!("{}", "Thinking...".dimmed());
                            let outcome = session.send(trimmed).await;
                            let messages = session.messages();
                            match (outcome, messages.last()) {
                                (SendOutcome::Replied | SendOutcome::Fallback, Some(reply)) => {
                                    print_message(messages.len(), reply)
                                }
                                _ => tracing::debug!(?outcome, "No reply to show"),
                            }
                        }
                        Ok(command) => {
                            if let Err(e) = handle(&session, &sink, command).await {
                                tracing::debug!("Chat command failed: {:#}", e);
                                // Remote failures already queued a notice.
                                if ErrorKind::classify(&e) == ErrorKind::Other {
                                    eprintln!("{}", e.to_string().red());
                                }
                                explain(e);
                            }
                        }
                        Err(e) => eprintln!("{}", e.to_string().red()),
                    }

                    print_notices(&session.take_notices());
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }

        println!("Goodbye!");
        Ok(())
    }

}
