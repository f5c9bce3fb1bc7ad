//! Mutation strategies for session state
//!
//! Each kind of change the session makes declares how it touches the local
//! cache relative to its remote call. Optimistic mutations change the store
//! before the call and reconcile afterwards; confirm-only mutations leave the
//! store alone until the service returns the canonical value.
//!
//! [`begin`] and [`settle`] are the only entry points. The controller calls
//! `begin` before the remote call and `settle` once it resolves, each under
//! the store lock and never across a suspension point.

use crate::error::{ErrorKind, Result};
use crate::models::{
    BookmarkResponse, Message, MessageId, ReactionKind, ReactionResponse, SendMessageResponse,
};
use crate::session::store::{Notice, SessionStore};

/// When a mutation is allowed to change the local cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStrategy {
    /// Apply locally first, reconcile on resolution
    Optimistic,
    /// Apply only the canonical value returned by the service
    ConfirmOnly,
}

/// A change to session state driven by one remote call
pub trait Mutation {
    /// Successful response of the remote call
    type Output;

    fn strategy(&self) -> MutationStrategy;

    /// Short label used in logs
    fn label(&self) -> &'static str;

    /// Local change made before the remote call; only invoked for
    /// [`MutationStrategy::Optimistic`]
    fn apply_optimistic(&self, _store: &mut SessionStore) {}

    fn apply_on_confirm(&self, store: &mut SessionStore, output: &Self::Output);

    fn apply_on_failure(&self, store: &mut SessionStore, error: &anyhow::Error);
}

/// Prepare the store for `mutation`, returning the session generation the
/// result must be settled against
pub fn begin<M: Mutation>(store: &mut SessionStore, mutation: &M) -> u64 {
    if mutation.strategy() == MutationStrategy::Optimistic {
        mutation.apply_optimistic(store);
    }
    store.generation()
}

/// Apply the resolution of `mutation` unless the session has moved on
///
/// Returns `false` when the result was discarded as stale.
pub fn settle<M: Mutation>(
    store: &mut SessionStore,
    mutation: &M,
    generation: u64,
    result: &Result<M::Output>,
) -> bool {
    if store.generation() != generation {
        tracing::debug!(
            mutation = mutation.label(),
            generation,
            current = store.generation(),
            "Discarding stale mutation result"
        );
        return false;
    }
    match result {
        Ok(output) => mutation.apply_on_confirm(store, output),
        Err(error) => mutation.apply_on_failure(store, error),
    }
    true
}

/// Notice for a failed action; session expiry gets its own wording
pub fn failure_notice(action: &str, error: &anyhow::Error) -> Notice {
    match ErrorKind::classify(error) {
        ErrorKind::Unauthenticated => Notice::error("Session expired. Please log in again."),
        _ => Notice::error(format!("Failed to {}", action)),
    }
}

/// Send a user message and append the assistant reply
///
/// The user's message is never rolled back; a failure places the fallback
/// reply next to it instead. Each reply lands right after its own user
/// message, so overlapping sends keep their pairing.
#[derive(Debug, Clone)]
pub struct SendMessage {
    /// From [`SessionStore::issue_send_ticket`]
    pub ticket: u64,
    pub text: String,
    pub fallback_reply: String,
}

impl Mutation for SendMessage {
    type Output = SendMessageResponse;

    fn strategy(&self) -> MutationStrategy {
        MutationStrategy::Optimistic
    }

    fn label(&self) -> &'static str {
        "send_message"
    }

    fn apply_optimistic(&self, store: &mut SessionStore) {
        store.begin_send(self.ticket, Message::user(self.text.clone()));
    }

    fn apply_on_confirm(&self, store: &mut SessionStore, output: &Self::Output) {
        store.finish_send(self.ticket, Message::ai(output.ai_response.clone()));
    }

    fn apply_on_failure(&self, store: &mut SessionStore, error: &anyhow::Error) {
        tracing::warn!("Send failed, appending fallback reply: {:#}", error);
        store.finish_send(self.ticket, Message::ai(self.fallback_reply.clone()));
    }
}

/// Flip a message's bookmark flag
#[derive(Debug, Clone, Copy)]
pub struct ToggleBookmark {
    pub message_id: MessageId,
}

impl Mutation for ToggleBookmark {
    type Output = BookmarkResponse;

    fn strategy(&self) -> MutationStrategy {
        MutationStrategy::ConfirmOnly
    }

    fn label(&self) -> &'static str {
        "toggle_bookmark"
    }

    fn apply_on_confirm(&self, store: &mut SessionStore, output: &Self::Output) {
        if let Some(message) = store.message_mut(self.message_id) {
            message.is_bookmarked = output.is_bookmarked;
        }
    }

    fn apply_on_failure(&self, store: &mut SessionStore, error: &anyhow::Error) {
        store.push_notice(failure_notice("bookmark message", error));
    }
}

/// Toggle one reaction kind on a message
#[derive(Debug, Clone, Copy)]
pub struct ToggleReaction {
    pub message_id: MessageId,
    pub kind: ReactionKind,
}

impl Mutation for ToggleReaction {
    type Output = ReactionResponse;

    fn strategy(&self) -> MutationStrategy {
        MutationStrategy::ConfirmOnly
    }

    fn label(&self) -> &'static str {
        "toggle_reaction"
    }

    fn apply_on_confirm(&self, store: &mut SessionStore, output: &Self::Output) {
        if let Some(message) = store.message_mut(self.message_id) {
            message.reactions = output.reactions.clone();
        }
    }

    fn apply_on_failure(&self, store: &mut SessionStore, error: &anyhow::Error) {
        store.push_notice(failure_notice("react to message", error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecallError;
    use crate::models::{Conversation, ConversationId, ConversationStatus};
    use crate::session::store::NoticeLevel;

    fn store_with(messages: Vec<Message>) -> SessionStore {
        let mut store = SessionStore::new();
        let id = ConversationId::new("c");
        let epoch = store.begin_load(&id);
        store.commit_load(
            epoch,
            Conversation {
                id,
                title: "t".into(),
                start_time: None,
                end_time: None,
                status: ConversationStatus::Active,
                summary: None,
                messages,
                is_archived: false,
            },
        );
        store
    }

    fn confirmed(id: i64, content: &str) -> Message {
        let mut message = Message::ai(content);
        message.id = Some(MessageId(id));
        message
    }

    fn remote_error() -> anyhow::Error {
        RecallError::Remote {
            status: Some(500),
            message: "boom".into(),
        }
        .into()
    }

    #[test]
    fn test_send_is_optimistic() {
        let mut store = store_with(vec![]);
        let mutation = SendMessage {
            ticket: store.issue_send_ticket(),
            text: "hi".into(),
            fallback_reply: "sorry".into(),
        };
        begin(&mut store, &mutation);
        assert_eq!(store.messages().len(), 1);
        assert!(store.messages()[0].is_optimistic());
        assert!(store.send_in_flight());
    }

    #[test]
    fn test_send_failure_keeps_user_message() {
        let mut store = store_with(vec![]);
        let mutation = SendMessage {
            ticket: store.issue_send_ticket(),
            text: "hi".into(),
            fallback_reply: "sorry".into(),
        };
        let generation = begin(&mut store, &mutation);
        assert!(settle(&mut store, &mutation, generation, &Err(remote_error())));
        let contents: Vec<&str> = store.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "sorry"]);
        assert!(!store.send_in_flight());
    }

    #[test]
    fn test_overlapping_sends_keep_flag_and_pairing() {
        let mut store = store_with(vec![]);
        let first = SendMessage {
            ticket: store.issue_send_ticket(),
            text: "first".into(),
            fallback_reply: "sorry".into(),
        };
        let second = SendMessage {
            ticket: store.issue_send_ticket(),
            text: "second".into(),
            fallback_reply: "sorry".into(),
        };
        let generation = begin(&mut store, &first);
        begin(&mut store, &second);
        assert_eq!(store.sends_outstanding(), 2);

        let reply = |text: &str| SendMessageResponse {
            user_message: text.into(),
            ai_response: format!("re: {}", text),
        };
        settle(&mut store, &second, generation, &Ok(reply("second")));
        assert!(store.send_in_flight());

        settle(&mut store, &first, generation, &Err(remote_error()));
        assert!(!store.send_in_flight());
        let contents: Vec<&str> = store.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "sorry", "second", "re: second"]);
    }

    #[test]
    fn test_confirm_only_leaves_store_until_resolved() {
        let mut store = store_with(vec![confirmed(7, "x")]);
        let mutation = ToggleBookmark {
            message_id: MessageId(7),
        };
        begin(&mut store, &mutation);
        assert!(!store.messages()[0].is_bookmarked);

        let generation = store.generation();
        settle(
            &mut store,
            &mutation,
            generation,
            &Ok(BookmarkResponse {
                is_bookmarked: true,
            }),
        );
        assert!(store.messages()[0].is_bookmarked);
    }

    #[test]
    fn test_reaction_applies_canonical_set() {
        let mut store = store_with(vec![confirmed(3, "x")]);
        let mutation = ToggleReaction {
            message_id: MessageId(3),
            kind: ReactionKind::Heart,
        };
        let generation = begin(&mut store, &mutation);
        let output = ReactionResponse {
            reactions: [ReactionKind::Smile, ReactionKind::Heart].into_iter().collect(),
        };
        settle(&mut store, &mutation, generation, &Ok(output.clone()));
        assert_eq!(store.messages()[0].reactions, output.reactions);
    }

    #[test]
    fn test_toggle_failure_pushes_notice_only() {
        let mut store = store_with(vec![confirmed(3, "x")]);
        let before = store.messages().to_vec();
        let mutation = ToggleReaction {
            message_id: MessageId(3),
            kind: ReactionKind::Heart,
        };
        let generation = begin(&mut store, &mutation);
        settle(&mut store, &mutation, generation, &Err(remote_error()));
        assert_eq!(store.messages(), before.as_slice());
        let notices = store.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(notices[0].text, "Failed to react to message");
    }

    #[test]
    fn test_stale_result_is_discarded() {
        let mut store = store_with(vec![]);
        let mutation = SendMessage {
            ticket: store.issue_send_ticket(),
            text: "hi".into(),
            fallback_reply: "sorry".into(),
        };
        let generation = begin(&mut store, &mutation);
        store.reset();
        let applied = settle(
            &mut store,
            &mutation,
            generation,
            &Ok(SendMessageResponse {
                user_message: "hi".into(),
                ai_response: "hello".into(),
            }),
        );
        assert!(!applied);
        assert!(store.messages().is_empty());
    }

    #[test]
    fn test_failure_notice_for_expired_session() {
        let error: anyhow::Error = RecallError::Unauthenticated("401".into()).into();
        let notice = failure_notice("share conversation", &error);
        assert_eq!(notice.text, "Session expired. Please log in again.");
        let notice = failure_notice("share conversation", &remote_error());
        assert_eq!(notice.text, "Failed to share conversation");
    }
}
