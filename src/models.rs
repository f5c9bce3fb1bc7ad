//! Conversation and message types exchanged with the remote service
//!
//! These mirror the JSON payloads of the conversation service. The remote
//! service is the single owner of every value here; the client only holds
//! cached copies of them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::RecallError;

/// Opaque conversation identifier, always assigned by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wrap an identifier received from the service or typed by the user
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Server-assigned message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = RecallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(MessageId)
            .map_err(|_| RecallError::InvalidInput(format!("Invalid message id: {}", s)))
    }
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The human participant
    User,
    /// The assistant
    Ai,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Ai => write!(f, "ai"),
        }
    }
}

/// Lifecycle status of a conversation
///
/// `Active -> Ended` is one-way and only ever observed from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    /// Conversation accepts new messages
    #[default]
    Active,
    /// Conversation was ended and summarized
    Ended,
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// Fixed reaction vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    /// Heart reaction
    Heart,
    /// Thumbs-up reaction
    Thumbsup,
    /// Smile reaction
    Smile,
}

impl ReactionKind {
    /// All reaction kinds in display order
    pub const ALL: [ReactionKind; 3] = [Self::Heart, Self::Thumbsup, Self::Smile];

    /// Wire token for this reaction
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heart => "heart",
            Self::Thumbsup => "thumbsup",
            Self::Smile => "smile",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReactionKind {
    type Err = RecallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "heart" => Ok(Self::Heart),
            "thumbsup" | "thumbs_up" | "+1" => Ok(Self::Thumbsup),
            "smile" => Ok(Self::Smile),
            other => Err(RecallError::InvalidInput(format!(
                "Unknown reaction: {}. Must be one of: heart, thumbsup, smile",
                other
            ))),
        }
    }
}

/// A single message in a conversation transcript or branch group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Absent while the message is optimistic and not yet confirmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Author of the message
    pub sender: Sender,
    /// Message text, unbounded when returned by the server
    pub content: String,
    /// Server-assigned creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Whether the message is bookmarked
    #[serde(default)]
    pub is_bookmarked: bool,
    /// Reactions currently attached to the message
    #[serde(default, deserialize_with = "deserialize_reactions")]
    pub reactions: BTreeSet<ReactionKind>,
    /// Parent message for branch continuations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<MessageId>,
    /// Optional label of the branch group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
}

impl Message {
    /// Creates an unconfirmed user message
    ///
    /// # Examples
    ///
    /// ```
    /// use recallai::models::{Message, Sender};
    ///
    /// let msg = Message::user("Summarize my notes");
    /// assert_eq!(msg.sender, Sender::User);
    /// assert!(msg.id.is_none());
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self::unconfirmed(Sender::User, content)
    }

    /// Creates an unconfirmed assistant message
    pub fn ai(content: impl Into<String>) -> Self {
        Self::unconfirmed(Sender::Ai, content)
    }

    fn unconfirmed(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: None,
            sender,
            content: content.into(),
            timestamp: None,
            is_bookmarked: false,
            reactions: BTreeSet::new(),
            parent: None,
            branch_name: None,
        }
    }

    /// True while the message has no server-assigned id
    pub fn is_optimistic(&self) -> bool {
        self.id.is_none()
    }

    /// True for trunk messages (no parent edge)
    pub fn is_trunk(&self) -> bool {
        self.parent.is_none()
    }
}

/// Reactions arrive as a JSON list that may be `null`; unknown tokens are dropped.
fn deserialize_reactions<'de, D>(deserializer: D) -> Result<BTreeSet<ReactionKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<String>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .iter()
        .filter_map(|token| match token.parse::<ReactionKind>() {
            Ok(kind) => Some(kind),
            Err(_) => {
                tracing::warn!(token = %token, "Ignoring unknown reaction token");
                None
            }
        })
        .collect())
}

/// A conversation as returned by the service
///
/// Listings omit `messages`; detail reads include them in authoritative order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Server-assigned identifier
    pub id: ConversationId,
    /// Display title
    pub title: String,
    /// Creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Time the conversation was ended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Lifecycle status
    #[serde(default)]
    pub status: ConversationStatus,
    /// Summary, present once the conversation has ended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Messages in authoritative order
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Archive flag, orthogonal to status
    #[serde(default)]
    pub is_archived: bool,
}

/// Response of the send-message action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageResponse {
    /// Echo of the submitted text
    pub user_message: String,
    /// Assistant reply text
    pub ai_response: String,
}

/// Response of the end action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndConversationResponse {
    /// Human-readable status line
    #[serde(default)]
    pub message: Option<String>,
    /// Generated summary
    pub summary: String,
    /// Key points extracted from the transcript
    #[serde(default)]
    pub key_points: Vec<String>,
    /// Free-form analysis
    #[serde(default)]
    pub insights: String,
}

/// Response of the archive toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveResponse {
    /// Archive flag after the server flipped it
    pub is_archived: bool,
}

/// Response of the share action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareResponse {
    /// Opaque share token
    pub share_token: String,
    /// Server-relative path of the public view (e.g. `/shared/<token>`)
    pub share_url: String,
}

/// Response of the bookmark toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkResponse {
    /// Canonical bookmark flag
    pub is_bookmarked: bool,
}

/// Response of the react toggle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionResponse {
    /// Canonical reaction set
    #[serde(default, deserialize_with = "deserialize_reactions")]
    pub reactions: BTreeSet<ReactionKind>,
}

/// Response of the cross-conversation query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Echo of the query
    #[serde(default)]
    pub query: String,
    /// Answer text
    pub response: String,
}

/// Response of the follow-up suggestion action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionsResponse {
    /// Suggested follow-up prompts
    pub suggestions: Vec<String>,
}

/// Per-day conversation count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateCount {
    /// Calendar day
    pub date: NaiveDate,
    /// Conversations started that day
    pub count: u64,
}

/// Aggregate counters over a user's conversations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Analytics {
    pub total_conversations: u64,
    pub total_messages: u64,
    pub active_conversations: u64,
    pub ended_conversations: u64,
    pub archived_conversations: u64,
    pub avg_messages_per_conversation: f64,
    pub conversations_last_7_days: u64,
    pub conversations_last_30_days: u64,
    pub messages_last_7_days: u64,
    pub bookmarked_messages_count: u64,
    pub user_message_count: u64,
    pub ai_message_count: u64,
    pub conversations_with_summaries: u64,
    #[serde(default)]
    pub conversations_by_date: Vec<DateCount>,
}

/// Derive a conversation title from the first message
///
/// Keeps the first `max_chars` characters and appends `suffix` when truncated.
///
/// # Examples
///
/// ```
/// use recallai::models::derive_title;
///
/// assert_eq!(derive_title("short", 50, "..."), "short");
/// assert_eq!(derive_title("abcdef", 3, "..."), "abc...");
/// assert_eq!(derive_title("abcdef", 3, "…"), "abc…");
/// ```
pub fn derive_title(text: &str, max_chars: usize, suffix: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}{}", head, suffix)
    } else {
        head
    }
}
