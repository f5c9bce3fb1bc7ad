//! RecallAI - conversation session client library
//!
//! This library provides the client side of the RecallAI note-taking
//! assistant: a session controller that keeps a local view of one
//! conversation consistent with the remote service, a list controller for
//! the user's conversations, and the service clients they talk to.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: Session store, mutation strategies and the session controller
//! - `list`: Conversation list controller and its refresh trigger
//! - `library`: Bookmarks, cross-conversation queries, analytics, shared reads
//! - `service`: Remote service contract with HTTP and in-memory implementations
//! - `models`: Conversation and message types
//! - `export`: Export payloads and the file-save collaborator
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `logging`: Tracing subscriber setup
//! - `cli`, `commands`: Terminal front end
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use recallai::{Config, HttpConversationService, RefreshTrigger, SessionController};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let service = HttpConversationService::new(&config.service)?;
//!     service.handshake().await?;
//!
//!     let session = SessionController::new(Arc::new(service), RefreshTrigger::new(), &config);
//!     session.send("What did I note about the trip?").await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod library;
pub mod list;
pub mod logging;
pub mod models;
pub mod service;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use error::{ErrorKind, RecallError, Result};
pub use library::LibraryController;
pub use list::{ConversationListController, RefreshTrigger};
pub use service::{ConversationService, FakeConversationService, HttpConversationService};
pub use session::{SendOutcome, SessionController, SessionPhase};
