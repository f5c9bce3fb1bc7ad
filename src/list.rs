//! Conversation list controller
//!
//! Keeps the user's conversations for exactly one archive view. The list
//! reloads when the view flips or when the shared [`RefreshTrigger`] moves
//! past the value the list last loaded at.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::models::{Conversation, ConversationId};
use crate::service::ConversationService;
use crate::session::mutation::failure_notice;
use crate::session::{Notice, SessionController};

/// Monotonic counter signalling that the conversation list is out of date
///
/// Cloned handles share one counter.
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for RefreshTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshTrigger {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Increment the counter
    pub fn bump(&self) {
        self.tx.send_modify(|value| *value += 1);
        tracing::debug!(value = self.value(), "Refresh trigger bumped");
    }

    /// Current counter value
    pub fn value(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Receiver notified on every bump
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

#[derive(Debug, Default)]
struct ListState {
    show_archived: bool,
    conversations: Vec<Conversation>,
    loading: bool,
    error: Option<String>,
    notices: VecDeque<Notice>,
    seen_trigger: u64,
    load_epoch: u64,
}

/// Controller for the list of a user's conversations
pub struct ConversationListController {
    service: Arc<dyn ConversationService>,
    refresh: RefreshTrigger,
    state: Mutex<ListState>,
}

impl ConversationListController {
    /// Create a controller showing the non-archived view
    pub fn new(service: Arc<dyn ConversationService>, refresh: RefreshTrigger) -> Self {
        Self {
            service,
            refresh,
            state: Mutex::new(ListState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.state().conversations.clone()
    }

    pub fn show_archived(&self) -> bool {
        self.state().show_archived
    }

    pub fn loading(&self) -> bool {
        self.state().loading
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn refresh_trigger(&self) -> &RefreshTrigger {
        &self.refresh
    }

    /// Drain queued notifications in arrival order
    pub fn take_notices(&self) -> Vec<Notice> {
        self.state().notices.drain(..).collect()
    }

    /// Fetch the current view, replacing the cached list
    ///
    /// A reload overtaken by a later one (for example after a view flip)
    /// does not commit.
    pub async fn reload(&self) -> Result<()> {
        let (archived, epoch) = {
            let mut state = self.state();
            state.load_epoch += 1;
            state.loading = true;
            state.seen_trigger = self.refresh.value();
            (state.show_archived, state.load_epoch)
        };

        tracing::debug!(archived, epoch, "Loading conversation list");
        let result = self.service.list_conversations(archived).await;

        let mut state = self.state();
        if state.load_epoch != epoch {
            tracing::debug!(epoch, "Discarding stale conversation list");
            return result.map(|_| ());
        }
        state.loading = false;
        match result {
            Ok(conversations) => {
                // The service owns the filter; keep the view exclusive regardless.
                state.conversations = conversations
                    .into_iter()
                    .filter(|c| c.is_archived == archived)
                    .collect();
                state.error = None;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to load conversations: {:#}", e);
                state.error = Some(e.to_string());
                state.notices.push_back(failure_notice("load conversations", &e));
                Err(e)
            }
        }
    }

    /// Switch the archive view, reloading if it changed
    pub async fn set_show_archived(&self, archived: bool) -> Result<()> {
        let changed = {
            let mut state = self.state();
            let changed = state.show_archived != archived;
            state.show_archived = archived;
            changed
        };
        if changed {
            tracing::info!(archived, "Conversation list view changed");
            self.reload().await?;
        }
        Ok(())
    }

    /// Reload if the refresh trigger moved since the last load
    pub async fn refresh_if_triggered(&self) -> Result<bool> {
        let stale = self.state().seen_trigger != self.refresh.value();
        if stale {
            self.reload().await?;
        }
        Ok(stale)
    }

    /// Flip a conversation's archive flag
    ///
    /// The service decides the new value; the list reloads afterwards.
    pub async fn archive_toggle(&self, id: &ConversationId) -> Result<bool> {
        match self.service.archive_conversation(id).await {
            Ok(response) => {
                let text = if response.is_archived {
                    "Chat archived"
                } else {
                    "Chat unarchived"
                };
                tracing::info!(conversation_id = %id, archived = response.is_archived, "{}", text);
                self.state().notices.push_back(Notice::success(text));
                self.refresh.bump();
                if let Err(e) = self.reload().await {
                    tracing::warn!("List reload after archive failed: {:#}", e);
                }
                Ok(response.is_archived)
            }
            Err(e) => {
                tracing::error!(conversation_id = %id, "Failed to archive chat: {:#}", e);
                self.state()
                    .notices
                    .push_back(failure_notice("archive chat", &e));
                Err(e)
            }
        }
    }

    /// Delete a conversation
    ///
    /// If `session` currently shows the conversation it is cleared before the
    /// remote delete, so nothing keeps referring to the deleted id.
    pub async fn delete(
        &self,
        id: &ConversationId,
        session: Option<&SessionController>,
    ) -> Result<()> {
        if let Some(session) = session {
            if session.clear_if_active(id) {
                tracing::info!(conversation_id = %id, "Cleared active session before delete");
            }
        }

        match self.service.delete_conversation(id).await {
            Ok(()) => {
                tracing::info!(conversation_id = %id, "Chat deleted");
                self.state().notices.push_back(Notice::success("Chat deleted"));
                self.refresh.bump();
                if let Err(e) = self.reload().await {
                    tracing::warn!("List reload after delete failed: {:#}", e);
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(conversation_id = %id, "Failed to delete chat: {:#}", e);
                self.state()
                    .notices
                    .push_back(failure_notice("delete chat", &e));
                Err(e)
            }
        }
    }

    /// Reload on every trigger bump until the trigger is dropped
    pub fn spawn_auto_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        let mut rx = self.refresh.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                if let Err(e) = controller.refresh_if_triggered().await {
                    tracing::warn!("Automatic list refresh failed: {:#}", e);
                }
            }
            tracing::debug!("Refresh trigger closed; auto refresh stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sender;
    use crate::service::{FailureKind, FakeConversationService, Operation};

    fn setup() -> (Arc<FakeConversationService>, ConversationListController) {
        let fake = Arc::new(FakeConversationService::new());
        let list = ConversationListController::new(fake.clone(), RefreshTrigger::new());
        (fake, list)
    }

    #[test]
    fn test_trigger_clones_share_counter() {
        let trigger = RefreshTrigger::new();
        let other = trigger.clone();
        other.bump();
        other.bump();
        assert_eq!(trigger.value(), 2);
    }

    #[tokio::test]
    async fn test_flip_reloads_only_on_change() {
        let (fake, list) = setup();
        let a = fake.seed_conversation("a", &[(Sender::User, "x")]);
        fake.set_archived(&a, true);

        list.set_show_archived(false).await.unwrap();
        assert_eq!(fake.call_count(Operation::ListConversations), 0);

        list.set_show_archived(true).await.unwrap();
        assert_eq!(fake.call_count(Operation::ListConversations), 1);
        assert_eq!(list.conversations().len(), 1);
        assert!(list.conversations().iter().all(|c| c.is_archived));
    }

    #[tokio::test]
    async fn test_refresh_if_triggered() {
        let (fake, list) = setup();
        list.reload().await.unwrap();
        assert!(!list.refresh_if_triggered().await.unwrap());

        fake.seed_conversation("new", &[(Sender::User, "x")]);
        list.refresh_trigger().bump();
        assert!(list.refresh_if_triggered().await.unwrap());
        assert_eq!(list.conversations().len(), 1);
        assert_eq!(fake.call_count(Operation::ListConversations), 2);
    }

    #[tokio::test]
    async fn test_archive_toggle_moves_between_views() {
        let (fake, list) = setup();
        let a = fake.seed_conversation("a", &[(Sender::User, "x")]);
        list.reload().await.unwrap();
        assert_eq!(list.conversations().len(), 1);

        assert!(list.archive_toggle(&a).await.unwrap());
        assert!(list.conversations().is_empty());
        assert_eq!(list.take_notices(), vec![Notice::success("Chat archived")]);

        list.set_show_archived(true).await.unwrap();
        assert!(!list.archive_toggle(&a).await.unwrap());
        assert!(list.conversations().is_empty());
        assert_eq!(list.take_notices(), vec![Notice::success("Chat unarchived")]);
    }

    #[tokio::test]
    async fn test_archive_failure_notice() {
        let (fake, list) = setup();
        let a = fake.seed_conversation("a", &[(Sender::User, "x")]);
        fake.fail_next(Operation::ArchiveConversation, FailureKind::Remote);
        assert!(list.archive_toggle(&a).await.is_err());
        assert_eq!(list.take_notices(), vec![Notice::error("Failed to archive chat")]);
    }

    #[tokio::test]
    async fn test_reload_failure_keeps_previous_list() {
        let (fake, list) = setup();
        fake.seed_conversation("a", &[(Sender::User, "x")]);
        list.reload().await.unwrap();
        fake.fail_next(Operation::ListConversations, FailureKind::Remote);
        assert!(list.reload().await.is_err());
        assert_eq!(list.conversations().len(), 1);
        assert!(list.error().is_some());
        assert_eq!(
            list.take_notices(),
            vec![Notice::error("Failed to load conversations")]
        );
    }

    #[tokio::test]
    async fn test_auto_refresh_follows_trigger() {
        let (fake, list) = setup();
        let list = Arc::new(list);
        let handle = list.spawn_auto_refresh();

        fake.seed_conversation("a", &[(Sender::User, "x")]);
        list.refresh_trigger().bump();

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while list.conversations().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        handle.abort();
    }
}
