//! Remote conversation service contract
//!
//! This module contains the [`ConversationService`] abstraction the
//! controllers talk to, plus two implementations: an HTTP client for the
//! real service and an in-memory fake with the same authoritative semantics.

pub mod fake;
pub mod http;

pub use fake::{FailureKind, FakeConversationService, FakeGate, Operation};
pub use http::HttpConversationService;

use crate::error::Result;
use crate::export::{ExportFormat, ExportPayload};
use crate::models::{
    Analytics, ArchiveResponse, BookmarkResponse, Conversation, ConversationId,
    EndConversationResponse, Message, MessageId, QueryResponse, ReactionKind, ReactionResponse,
    SendMessageResponse, ShareResponse,
};
use async_trait::async_trait;

/// Authoritative store of conversations and messages
///
/// Every mutating call is decided by the service; callers apply the returned
/// canonical values and never predict them. Failures are reported through
/// [`crate::error::RecallError`] (`NotFound`, `Remote`, `Unauthenticated`,
/// `Expired`).
#[async_trait]
pub trait ConversationService: Send + Sync {
    /// List conversations in exactly one archive view
    ///
    /// `archived = true` returns only archived conversations, `false` only
    /// non-archived ones. Listings carry no messages.
    async fn list_conversations(&self, archived: bool) -> Result<Vec<Conversation>>;

    /// Fetch a conversation with its messages in authoritative order
    async fn get_conversation(&self, id: &ConversationId) -> Result<Conversation>;

    /// Create an active conversation with no messages
    async fn create_conversation(&self, title: &str) -> Result<Conversation>;

    /// Persist a user message and obtain the assistant reply
    async fn send_message(
        &self,
        id: &ConversationId,
        content: &str,
    ) -> Result<SendMessageResponse>;

    /// End a conversation; the service appends a terminal summary message
    async fn end_conversation(&self, id: &ConversationId) -> Result<EndConversationResponse>;

    /// Flip the archive flag; the service decides the new value
    async fn archive_conversation(&self, id: &ConversationId) -> Result<ArchiveResponse>;

    /// Delete a conversation and its messages
    async fn delete_conversation(&self, id: &ConversationId) -> Result<()>;

    /// Obtain a share token and server-relative share URL
    async fn share_conversation(&self, id: &ConversationId) -> Result<ShareResponse>;

    /// Read a shared snapshot without any session credential
    async fn get_shared_conversation(&self, token: &str) -> Result<Conversation>;

    /// Export a conversation in the requested format
    async fn export_conversation(
        &self,
        id: &ConversationId,
        format: ExportFormat,
    ) -> Result<ExportPayload>;

    /// Follow-up prompts based on the recent transcript
    async fn get_suggestions(&self, id: &ConversationId) -> Result<Vec<String>>;

    /// Flip a message's bookmark flag
    async fn bookmark_message(&self, message_id: MessageId) -> Result<BookmarkResponse>;

    /// Toggle one reaction kind on a message
    async fn react_to_message(
        &self,
        message_id: MessageId,
        kind: ReactionKind,
    ) -> Result<ReactionResponse>;

    /// Create a child message of `message_id`
    async fn branch_message(
        &self,
        message_id: MessageId,
        content: &str,
        branch_name: Option<&str>,
    ) -> Result<Message>;

    /// Children of `message_id`
    async fn get_branches(&self, message_id: MessageId) -> Result<Vec<Message>>;

    /// Every bookmarked message of the user, newest first
    async fn get_bookmarked_messages(&self) -> Result<Vec<Message>>;

    /// Free-text question answered over all conversation summaries
    async fn query_conversations(&self, query: &str) -> Result<QueryResponse>;

    /// Aggregate counters over the user's conversations
    async fn get_analytics(&self) -> Result<Analytics>;
}
