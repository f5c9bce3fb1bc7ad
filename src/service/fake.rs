//! In-memory conversation service for tests and offline demos
//!
//! [`FakeConversationService`] implements [`ConversationService`] with the
//! same authoritative semantics as the real service: toggles flip, reaction
//! kinds are independent, branches live beside the trunk, and ending a
//! conversation appends a terminal summary message.
//!
//! Tests steer it through three hooks:
//!
//! - failure injection per [`Operation`] ([`FakeConversationService::fail_next`],
//!   [`FakeConversationService::fail_always`])
//! - call counters ([`FakeConversationService::call_count`])
//! - gates that hold a call for one conversation until released
//!   ([`FakeConversationService::hold`])
//!
//! # Example
//!
//! ```
//! use recallai::models::Sender;
//! use recallai::service::{ConversationService, FakeConversationService, Operation};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let service = FakeConversationService::new();
//! let id = service.seed_conversation("Groceries", &[(Sender::User, "milk")]);
//!
//! let conversation = service.get_conversation(&id).await.unwrap();
//! assert_eq!(conversation.messages.len(), 1);
//! assert_eq!(service.call_count(Operation::GetConversation), 1);
//! # }
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use tokio::sync::Notify;

use crate::error::{RecallError, Result};
use crate::export::{ExportFormat, ExportPayload};
use crate::models::{
    Analytics, ArchiveResponse, BookmarkResponse, Conversation, ConversationId,
    ConversationStatus, DateCount, EndConversationResponse, Message, MessageId, QueryResponse,
    ReactionKind, ReactionResponse, SendMessageResponse, Sender, ShareResponse,
};
use crate::service::ConversationService;

/// Service operations, used to target failure injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListConversations,
    GetConversation,
    CreateConversation,
    SendMessage,
    EndConversation,
    ArchiveConversation,
    DeleteConversation,
    ShareConversation,
    GetSharedConversation,
    ExportConversation,
    GetSuggestions,
    BookmarkMessage,
    ReactToMessage,
    BranchMessage,
    GetBranches,
    GetBookmarkedMessages,
    QueryConversations,
    GetAnalytics,
}

/// Error class produced by an injected failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    Remote,
    Unauthenticated,
}

impl FailureKind {
    fn into_error(self, op: Operation) -> anyhow::Error {
        match self {
            Self::NotFound => RecallError::NotFound(format!("{:?} (injected)", op)),
            Self::Remote => RecallError::Remote {
                status: Some(500),
                message: format!("{:?} failed (injected)", op),
            },
            Self::Unauthenticated => {
                RecallError::Unauthenticated(format!("{:?} (injected)", op))
            }
        }
        .into()
    }
}

#[derive(Debug, Clone, Copy)]
struct Failure {
    kind: FailureKind,
    /// `None` fails every call until cleared
    remaining: Option<u32>,
}

/// Handle that releases a held call
#[derive(Debug, Clone)]
pub struct FakeGate {
    notify: Arc<Notify>,
}

impl FakeGate {
    /// Let the held call proceed
    pub fn release(&self) {
        self.notify.notify_one();
    }
}

#[derive(Debug, Clone)]
struct StoredConversation {
    conversation: Conversation,
    /// Every message of the conversation, trunk and branches, in creation order
    messages: Vec<Message>,
    share_token: Option<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    conversations: Vec<StoredConversation>,
    next_message_id: i64,
    expired_tokens: HashSet<String>,
    failures: HashMap<Operation, Failure>,
    calls: HashMap<Operation, usize>,
    gates: HashMap<(Operation, ConversationId), Arc<Notify>>,
    reply: Option<String>,
}

impl FakeState {
    fn find(&self, id: &ConversationId) -> Result<&StoredConversation> {
        self.conversations
            .iter()
            .find(|c| &c.conversation.id == id)
            .ok_or_else(|| RecallError::NotFound(format!("conversation {}", id)).into())
    }

    fn find_mut(&mut self, id: &ConversationId) -> Result<&mut StoredConversation> {
        self.conversations
            .iter_mut()
            .find(|c| &c.conversation.id == id)
            .ok_or_else(|| RecallError::NotFound(format!("conversation {}", id)).into())
    }

    fn find_message_mut(&mut self, message_id: MessageId) -> Result<&mut Message> {
        self.conversations
            .iter_mut()
            .flat_map(|c| c.messages.iter_mut())
            .find(|m| m.id == Some(message_id))
            .ok_or_else(|| RecallError::NotFound(format!("message {}", message_id)).into())
    }

    fn owner_of(&self, message_id: MessageId) -> Option<ConversationId> {
        self.conversations
            .iter()
            .find(|c| c.messages.iter().any(|m| m.id == Some(message_id)))
            .map(|c| c.conversation.id.clone())
    }

    fn new_message(&mut self, sender: Sender, content: &str) -> Message {
        self.next_message_id += 1;
        let mut message = match sender {
            Sender::User => Message::user(content),
            Sender::Ai => Message::ai(content),
        };
        message.id = Some(MessageId(self.next_message_id));
        message.timestamp = Some(Utc::now());
        message
    }

    /// Conversation with trunk messages only
    fn detail(stored: &StoredConversation) -> Conversation {
        let mut conversation = stored.conversation.clone();
        conversation.messages = stored
            .messages
            .iter()
            .filter(|m| m.is_trunk())
            .cloned()
            .collect();
        conversation
    }
}

/// In-memory authoritative conversation service
#[derive(Debug, Clone, Default)]
pub struct FakeConversationService {
    state: Arc<Mutex<FakeState>>,
}

impl FakeConversationService {
    /// Create an empty service
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a conversation with the given trunk messages
    pub fn seed_conversation(&self, title: &str, messages: &[(Sender, &str)]) -> ConversationId {
        let mut state = self.state();
        let id = ConversationId::new(uuid::Uuid::new_v4().to_string());
        let stored_messages = messages
            .iter()
            .map(|(sender, content)| state.new_message(*sender, content))
            .collect();
        state.conversations.push(StoredConversation {
            conversation: Conversation {
                id: id.clone(),
                title: title.to_string(),
                start_time: Some(Utc::now()),
                end_time: None,
                status: ConversationStatus::Active,
                summary: None,
                messages: Vec::new(),
                is_archived: false,
            },
            messages: stored_messages,
            share_token: None,
        });
        id
    }

    /// Flag a seeded conversation as archived
    pub fn set_archived(&self, id: &ConversationId, archived: bool) {
        if let Ok(stored) = self.state().find_mut(id) {
            stored.conversation.is_archived = archived;
        }
    }

    /// Snapshot of a conversation including branch messages
    pub fn snapshot(&self, id: &ConversationId) -> Option<Conversation> {
        let state = self.state();
        let stored = state.find(id).ok()?;
        let mut conversation = stored.conversation.clone();
        conversation.messages = stored.messages.clone();
        Some(conversation)
    }

    /// Ids of every stored conversation, archived or not
    pub fn conversation_ids(&self) -> Vec<ConversationId> {
        self.state()
            .conversations
            .iter()
            .map(|c| c.conversation.id.clone())
            .collect()
    }

    /// Fixed assistant reply used instead of the echo reply
    pub fn set_reply(&self, reply: impl Into<String>) {
        self.state().reply = Some(reply.into());
    }

    /// Make a share token resolve as expired
    pub fn expire_share_token(&self, token: &str) {
        self.state().expired_tokens.insert(token.to_string());
    }

    /// Fail the next call of `op`
    pub fn fail_next(&self, op: Operation, kind: FailureKind) {
        self.state().failures.insert(
            op,
            Failure {
                kind,
                remaining: Some(1),
            },
        );
    }

    /// Fail every call of `op` until [`Self::clear_failures`]
    pub fn fail_always(&self, op: Operation, kind: FailureKind) {
        self.state().failures.insert(
            op,
            Failure {
                kind,
                remaining: None,
            },
        );
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Number of times `op` was called, including failed calls
    pub fn call_count(&self, op: Operation) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    /// Hold the next call of `op` for conversation `id` until released
    ///
    /// Message operations are matched by the conversation owning the message.
    pub fn hold(&self, op: Operation, id: &ConversationId) -> FakeGate {
        let notify = Arc::new(Notify::new());
        self.state()
            .gates
            .insert((op, id.clone()), Arc::clone(&notify));
        FakeGate { notify }
    }

    /// Count the call, wait on a gate if one is set, then apply injected failures
    async fn enter(&self, op: Operation, id: Option<&ConversationId>) -> Result<()> {
        let gate = {
            let mut state = self.state();
            *state.calls.entry(op).or_insert(0) += 1;
            id.and_then(|id| state.gates.remove(&(op, id.clone())))
        };

        if let Some(notify) = gate {
            tracing::debug!(?op, "Fake call held at gate");
            notify.notified().await;
        }

        let mut state = self.state();
        let Some(failure) = state.failures.get(&op).copied() else {
            return Ok(());
        };
        match failure.remaining {
            Some(n) if n <= 1 => {
                state.failures.remove(&op);
            }
            Some(n) => {
                state.failures.insert(
                    op,
                    Failure {
                        remaining: Some(n - 1),
                        ..failure
                    },
                );
            }
            None => {}
        }
        Err(failure.kind.into_error(op))
    }
}

fn summarize(stored: &StoredConversation) -> EndConversationResponse {
    let user_lines: Vec<&str> = stored
        .messages
        .iter()
        .filter(|m| m.is_trunk() && m.sender == Sender::User)
        .map(|m| m.content.as_str())
        .collect();

    let summary = match user_lines.first() {
        Some(first) => format!(
            "{} user message(s) about \"{}\".",
            user_lines.len(),
            first
        ),
        None => "An empty conversation.".to_string(),
    };

    EndConversationResponse {
        message: Some("Conversation ended successfully".to_string()),
        summary,
        key_points: user_lines.iter().take(3).map(|s| s.to_string()).collect(),
        insights: format!("{} exchange(s) recorded.", user_lines.len()),
    }
}

fn render_markdown(conversation: &Conversation) -> String {
    let mut out = format!("# {}\n\n", conversation.title);
    if let Some(summary) = &conversation.summary {
        out.push_str(&format!("## Summary\n\n{}\n\n", summary));
    }
    out.push_str("## Messages\n\n");
    for message in &conversation.messages {
        let who = match message.sender {
            Sender::User => "You",
            Sender::Ai => "AI",
        };
        out.push_str(&format!("**{}:** {}\n\n", who, message.content));
    }
    out
}

#[async_trait]
impl ConversationService for FakeConversationService {
    async fn list_conversations(&self, archived: bool) -> Result<Vec<Conversation>> {
        self.enter(Operation::ListConversations, None).await?;
        let state = self.state();
        Ok(state
            .conversations
            .iter()
            .rev()
            .filter(|c| c.conversation.is_archived == archived)
            .map(|c| c.conversation.clone())
            .collect())
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<Conversation> {
        self.enter(Operation::GetConversation, Some(id)).await?;
        let state = self.state();
        Ok(FakeState::detail(state.find(id)?))
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation> {
        self.enter(Operation::CreateConversation, None).await?;
        let id = self.seed_conversation(title, &[]);
        let state = self.state();
        Ok(FakeState::detail(state.find(&id)?))
    }

    async fn send_message(
        &self,
        id: &ConversationId,
        content: &str,
    ) -> Result<SendMessageResponse> {
        self.enter(Operation::SendMessage, Some(id)).await?;
        let mut state = self.state();
        if state.find(id)?.conversation.status == ConversationStatus::Ended {
            return Err(RecallError::Remote {
                status: Some(400),
                message: "Conversation has ended".to_string(),
            }
            .into());
        }

        let reply = state
            .reply
            .clone()
            .unwrap_or_else(|| format!("You said: {}", content));
        let user = state.new_message(Sender::User, content);
        let ai = state.new_message(Sender::Ai, &reply);
        let stored = state.find_mut(id)?;
        stored.messages.push(user);
        stored.messages.push(ai);

        Ok(SendMessageResponse {
            user_message: content.to_string(),
            ai_response: reply,
        })
    }

    async fn end_conversation(&self, id: &ConversationId) -> Result<EndConversationResponse> {
        self.enter(Operation::EndConversation, Some(id)).await?;
        let mut state = self.state();
        let stored = state.find(id)?;
        if stored.conversation.status == ConversationStatus::Ended {
            return Err(RecallError::Remote {
                status: Some(400),
                message: "Conversation already ended".to_string(),
            }
            .into());
        }

        let response = summarize(stored);
        let terminal = state.new_message(
            Sender::Ai,
            &format!("**Conversation Summary**\n\n{}", response.summary),
        );
        let stored = state.find_mut(id)?;
        stored.conversation.status = ConversationStatus::Ended;
        stored.conversation.end_time = Some(Utc::now());
        stored.conversation.summary = Some(response.summary.clone());
        stored.messages.push(terminal);
        Ok(response)
    }

    async fn archive_conversation(&self, id: &ConversationId) -> Result<ArchiveResponse> {
        self.enter(Operation::ArchiveConversation, Some(id)).await?;
        let mut state = self.state();
        let stored = state.find_mut(id)?;
        stored.conversation.is_archived = !stored.conversation.is_archived;
        Ok(ArchiveResponse {
            is_archived: stored.conversation.is_archived,
        })
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<()> {
        self.enter(Operation::DeleteConversation, Some(id)).await?;
        let mut state = self.state();
        state.find(id)?;
        state.conversations.retain(|c| &c.conversation.id != id);
        Ok(())
    }

    async fn share_conversation(&self, id: &ConversationId) -> Result<ShareResponse> {
        self.enter(Operation::ShareConversation, Some(id)).await?;
        let mut state = self.state();
        let stored = state.find_mut(id)?;
        let token = stored
            .share_token
            .get_or_insert_with(|| uuid::Uuid::new_v4().simple().to_string())
            .clone();
        Ok(ShareResponse {
            share_url: format!("/shared/{}", token),
            share_token: token,
        })
    }

    async fn get_shared_conversation(&self, token: &str) -> Result<Conversation> {
        self.enter(Operation::GetSharedConversation, None).await?;
        let state = self.state();
        if state.expired_tokens.contains(token) {
            return Err(RecallError::Expired(format!("share token {}", token)).into());
        }
        state
            .conversations
            .iter()
            .find(|c| c.share_token.as_deref() == Some(token))
            .map(FakeState::detail)
            .ok_or_else(|| RecallError::NotFound(format!("share token {}", token)).into())
    }

    async fn export_conversation(
        &self,
        id: &ConversationId,
        format: ExportFormat,
    ) -> Result<ExportPayload> {
        self.enter(Operation::ExportConversation, Some(id)).await?;
        let conversation = {
            let state = self.state();
            FakeState::detail(state.find(id)?)
        };

        let (content_type, data) = match format {
            ExportFormat::Json => (
                "application/json",
                Bytes::from(serde_json::to_vec_pretty(&conversation)?),
            ),
            ExportFormat::Markdown => (
                "text/markdown",
                Bytes::from(render_markdown(&conversation)),
            ),
            ExportFormat::Pdf => (
                "application/pdf",
                Bytes::from(format!("%PDF-1.4\n% {}\n", conversation.title)),
            ),
        };

        Ok(ExportPayload {
            format,
            file_name: format.file_name(id),
            content_type: Some(content_type.to_string()),
            data,
        })
    }

    async fn get_suggestions(&self, id: &ConversationId) -> Result<Vec<String>> {
        self.enter(Operation::GetSuggestions, Some(id)).await?;
        let state = self.state();
        let stored = state.find(id)?;
        let topic = stored
            .messages
            .iter()
            .rev()
            .find(|m| m.sender == Sender::User)
            .map(|m| m.content.clone())
            .unwrap_or_else(|| stored.conversation.title.clone());
        Ok(vec![
            format!("Tell me more about {}", topic),
            "What are the key takeaways so far?".to_string(),
            "Can you give me an example?".to_string(),
        ])
    }

    async fn bookmark_message(&self, message_id: MessageId) -> Result<BookmarkResponse> {
        let owner = self.state().owner_of(message_id);
        self.enter(Operation::BookmarkMessage, owner.as_ref()).await?;
        let mut state = self.state();
        let message = state.find_message_mut(message_id)?;
        message.is_bookmarked = !message.is_bookmarked;
        Ok(BookmarkResponse {
            is_bookmarked: message.is_bookmarked,
        })
    }

    async fn react_to_message(
        &self,
        message_id: MessageId,
        kind: ReactionKind,
    ) -> Result<ReactionResponse> {
        let owner = self.state().owner_of(message_id);
        self.enter(Operation::ReactToMessage, owner.as_ref()).await?;
        let mut state = self.state();
        let message = state.find_message_mut(message_id)?;
        if !message.reactions.remove(&kind) {
            message.reactions.insert(kind);
        }
        Ok(ReactionResponse {
            reactions: message.reactions.clone(),
        })
    }

    async fn branch_message(
        &self,
        message_id: MessageId,
        content: &str,
        branch_name: Option<&str>,
    ) -> Result<Message> {
        let owner = self.state().owner_of(message_id);
        self.enter(Operation::BranchMessage, owner.as_ref()).await?;
        let mut state = self.state();
        let owner = state
            .owner_of(message_id)
            .ok_or_else(|| RecallError::NotFound(format!("message {}", message_id)))?;
        let mut child = state.new_message(Sender::User, content);
        child.parent = Some(message_id);
        child.branch_name = branch_name.map(str::to_string);
        state.find_mut(&owner)?.messages.push(child.clone());
        Ok(child)
    }

    async fn get_branches(&self, message_id: MessageId) -> Result<Vec<Message>> {
        let owner = self.state().owner_of(message_id);
        self.enter(Operation::GetBranches, owner.as_ref()).await?;
        let state = self.state();
        let owner = state
            .owner_of(message_id)
            .ok_or_else(|| RecallError::NotFound(format!("message {}", message_id)))?;
        Ok(state
            .find(&owner)?
            .messages
            .iter()
            .filter(|m| m.parent == Some(message_id))
            .cloned()
            .collect())
    }

    async fn get_bookmarked_messages(&self) -> Result<Vec<Message>> {
        self.enter(Operation::GetBookmarkedMessages, None).await?;
        let state = self.state();
        let mut bookmarked: Vec<Message> = state
            .conversations
            .iter()
            .flat_map(|c| c.messages.iter())
            .filter(|m| m.is_bookmarked)
            .cloned()
            .collect();
        bookmarked.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(bookmarked)
    }

    async fn query_conversations(&self, query: &str) -> Result<QueryResponse> {
        self.enter(Operation::QueryConversations, None).await?;
        let state = self.state();
        let summaries: Vec<&str> = state
            .conversations
            .iter()
            .filter_map(|c| c.conversation.summary.as_deref())
            .collect();

        let response = if summaries.is_empty() {
            "No conversation summaries available yet. End some conversations first!".to_string()
        } else {
            let needle = query.to_lowercase();
            let matching = summaries
                .iter()
                .filter(|s| {
                    needle
                        .split_whitespace()
                        .any(|word| s.to_lowercase().contains(word))
                })
                .count();
            format!(
                "{} of {} summarized conversation(s) mention \"{}\".",
                matching,
                summaries.len(),
                query
            )
        };

        Ok(QueryResponse {
            query: query.to_string(),
            response,
        })
    }

    async fn get_analytics(&self) -> Result<Analytics> {
        self.enter(Operation::GetAnalytics, None).await?;
        let state = self.state();
        let now = Utc::now();
        let week_ago = now - Duration::days(7);
        let month_ago = now - Duration::days(30);

        let mut analytics = Analytics::default();
        let mut by_date: BTreeMap<chrono::NaiveDate, u64> = BTreeMap::new();

        for stored in &state.conversations {
            let conversation = &stored.conversation;
            analytics.total_conversations += 1;
            match conversation.status {
                ConversationStatus::Active => analytics.active_conversations += 1,
                ConversationStatus::Ended => analytics.ended_conversations += 1,
            }
            if conversation.is_archived {
                analytics.archived_conversations += 1;
            }
            if conversation.summary.is_some() {
                analytics.conversations_with_summaries += 1;
            }
            if let Some(start) = conversation.start_time {
                if start >= week_ago {
                    analytics.conversations_last_7_days += 1;
                }
                if start >= month_ago {
                    analytics.conversations_last_30_days += 1;
                    *by_date.entry(start.date_naive()).or_insert(0) += 1;
                }
            }

            for message in &stored.messages {
                analytics.total_messages += 1;
                match message.sender {
                    Sender::User => analytics.user_message_count += 1,
                    Sender::Ai => analytics.ai_message_count += 1,
                }
                if message.is_bookmarked {
                    analytics.bookmarked_messages_count += 1;
                }
                if message.timestamp.is_some_and(|t| t >= week_ago) {
                    analytics.messages_last_7_days += 1;
                }
            }
        }

        if analytics.total_conversations > 0 {
            analytics.avg_messages_per_conversation =
                analytics.total_messages as f64 / analytics.total_conversations as f64;
        }
        analytics.conversations_by_date = by_date
            .into_iter()
            .map(|(date, count)| DateCount { date, count })
            .collect();
        Ok(analytics)
    }
}
