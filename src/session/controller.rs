//! Conversation session controller
//!
//! The controller turns user intents into remote calls and keeps the
//! [`SessionStore`] consistent with the service's answers. It holds the store
//! behind a mutex that is only taken between suspension points, so every
//! operation takes `&self` and overlapping calls see a consistent store.
//!
//! Results that resolve after the session moved to another conversation are
//! discarded: loads compare a per-request epoch, everything else compares the
//! session generation captured when the call started.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::Config;
use crate::error::{RecallError, Result};
use crate::export::{ExportFormat, ExportSink};
use crate::list::RefreshTrigger;
use crate::models::{
    derive_title, ConversationId, EndConversationResponse, Message, MessageId, ReactionKind,
    SendMessageResponse,
};
use crate::service::ConversationService;
use crate::session::mutation::{
    self, failure_notice, SendMessage, ToggleBookmark, ToggleReaction,
};
use crate::session::store::{EndDialog, Notice, SessionPhase, SessionStore};

/// How a [`SessionController::send`] call resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The assistant reply was appended
    Replied,
    /// The send failed and the fallback reply was appended
    Fallback,
    /// The text was blank; nothing changed
    Ignored,
    /// The session switched conversations before the reply arrived
    Stale,
}

/// Mediates between user intents and the conversation service
pub struct SessionController {
    service: Arc<dyn ConversationService>,
    refresh: RefreshTrigger,
    store: Mutex<SessionStore>,
    end_display_delay: Duration,
    title_max_chars: usize,
    title_ellipsis: String,
    fallback_reply: String,
    public_origin: String,
}

impl SessionController {
    /// Create a controller with an empty session
    pub fn new(
        service: Arc<dyn ConversationService>,
        refresh: RefreshTrigger,
        config: &Config,
    ) -> Self {
        Self {
            service,
            refresh,
            store: Mutex::new(SessionStore::new()),
            end_display_delay: Duration::from_millis(config.session.end_display_delay_ms),
            title_max_chars: config.session.title_max_chars,
            title_ellipsis: config.session.title_ellipsis.clone(),
            fallback_reply: config.session.fallback_reply.clone(),
            public_origin: config.service.public_origin.trim_end_matches('/').to_string(),
        }
    }

    fn store(&self) -> MutexGuard<'_, SessionStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the store without holding the lock past `f`
    pub fn with_store<R>(&self, f: impl FnOnce(&SessionStore) -> R) -> R {
        f(&self.store())
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SessionPhase {
        self.store().phase().clone()
    }

    /// Id of the conversation shown, active or ended
    pub fn active_conversation_id(&self) -> Option<ConversationId> {
        self.store().active_conversation_id().cloned()
    }

    /// Snapshot of the trunk transcript
    pub fn messages(&self) -> Vec<Message> {
        self.store().messages().to_vec()
    }

    /// True while any send awaits its reply
    pub fn send_in_flight(&self) -> bool {
        self.store().send_in_flight()
    }

    /// State of the end flow
    pub fn end_dialog(&self) -> EndDialog {
        self.store().end_dialog().clone()
    }

    /// Drain queued notifications in arrival order
    pub fn take_notices(&self) -> Vec<Notice> {
        self.store().take_notices()
    }

    /// Shared refresh trigger bumped after creation and ending
    pub fn refresh_trigger(&self) -> &RefreshTrigger {
        &self.refresh
    }

    fn require_active(&self) -> Result<ConversationId> {
        self.active_conversation_id()
            .ok_or_else(|| RecallError::NoActiveConversation.into())
    }

    /// Start over with no conversation selected
    pub fn new_conversation(&self) {
        tracing::info!("Starting a new conversation");
        self.store().reset();
    }

    /// Clear the session if it currently shows `id`
    pub fn clear_if_active(&self, id: &ConversationId) -> bool {
        let mut store = self.store();
        if store.active_conversation_id() == Some(id) {
            store.reset();
            true
        } else {
            false
        }
    }

    /// Fetch a conversation and replace the local messages wholesale
    ///
    /// On failure the session reverts to empty and a notice is queued. A
    /// load overtaken by a later load neither commits nor reverts.
    pub async fn load(&self, id: &ConversationId) -> Result<()> {
        let epoch = self.store().begin_load(id);
        tracing::debug!(conversation_id = %id, epoch, "Loading conversation");

        let result = self.service.get_conversation(id).await;

        let mut store = self.store();
        match result {
            Ok(conversation) => {
                let count = conversation.messages.len();
                if store.commit_load(epoch, conversation) {
                    tracing::info!(conversation_id = %id, messages = count, "Conversation loaded");
                } else {
                    tracing::debug!(conversation_id = %id, epoch, "Discarding stale load");
                }
                Ok(())
            }
            Err(e) => {
                if store.fail_load(epoch, e.to_string()) {
                    tracing::error!(conversation_id = %id, "Failed to load conversation: {:#}", e);
                    store.push_notice(failure_notice("load conversation", &e));
                } else {
                    tracing::debug!(conversation_id = %id, epoch, "Discarding stale load failure");
                }
                Err(e)
            }
        }
    }

    /// Reload the current conversation
    pub async fn reload(&self) -> Result<()> {
        let id = self.require_active()?;
        self.load(&id).await
    }

    /// Send a user message
    ///
    /// The user message is appended immediately and never removed. Without a
    /// conversation one is created first, titled from the text. The reply, or
    /// the fallback reply on any failure, is appended when the call resolves.
    /// This never returns an error.
    pub async fn send(&self, text: &str) -> SendOutcome {
        if text.trim().is_empty() {
            return SendOutcome::Ignored;
        }

        let (mutation, generation, target, in_flight) = {
            let mut store = self.store();
            let in_flight = store.send_in_flight();
            let mutation = SendMessage {
                ticket: store.issue_send_ticket(),
                text: text.to_string(),
                fallback_reply: self.fallback_reply.clone(),
            };
            let generation = mutation::begin(&mut store, &mutation);
            let target = store.active_conversation_id().cloned();
            (mutation, generation, target, in_flight)
        };
        if in_flight {
            tracing::warn!("Send issued while another send is outstanding");
        }

        let result = match target {
            Some(id) => self.service.send_message(&id, text).await,
            None => self.create_then_send(generation, text).await,
        };

        let replied = result.is_ok();
        let applied = mutation::settle(&mut self.store(), &mutation, generation, &result);
        match (applied, replied) {
            (false, _) => SendOutcome::Stale,
            (true, true) => SendOutcome::Replied,
            (true, false) => SendOutcome::Fallback,
        }
    }

    async fn create_then_send(
        &self,
        generation: u64,
        text: &str,
    ) -> Result<SendMessageResponse> {
        let title = derive_title(text, self.title_max_chars, &self.title_ellipsis);
        let conversation = self.service.create_conversation(&title).await?;

        if self.store().adopt_created(generation, &conversation) {
            tracing::info!(conversation_id = %conversation.id, "Created conversation");
        } else {
            tracing::debug!(conversation_id = %conversation.id, "Created conversation for a stale session");
        }
        self.refresh.bump();

        self.service.send_message(&conversation.id, text).await
    }

    /// End the active conversation
    ///
    /// The status flips only after the service confirms: the conversation is
    /// reloaded, the success state is held for the display delay, the list
    /// is signalled, and the dialog moves to [`EndDialog::Completed`]. On
    /// failure the dialog shows the error and local state is left as it was.
    ///
    /// If the session switched conversations while the call was outstanding,
    /// the confirmation only signals the list; the session is not touched.
    pub async fn end(&self) -> Result<EndConversationResponse> {
        let (id, generation) = {
            let mut store = self.store();
            let id = store
                .active_conversation_id()
                .cloned()
                .ok_or(RecallError::NoActiveConversation)?;
            store.set_end_dialog(EndDialog::Ending);
            (id, store.generation())
        };

        tracing::debug!(conversation_id = %id, "Ending conversation");
        let response = match self.service.end_conversation(&id).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(conversation_id = %id, "Failed to end conversation: {:#}", e);
                let mut store = self.store();
                if store.generation() == generation {
                    store.set_end_dialog(EndDialog::Failed(
                        "Failed to end conversation. Please try again.".to_string(),
                    ));
                }
                return Err(e);
            }
        };

        let current = {
            let mut store = self.store();
            let current = store.generation() == generation;
            if current {
                store.set_end_dialog(EndDialog::Succeeded(response.clone()));
            }
            current
        };
        tracing::info!(conversation_id = %id, "Conversation ended");

        if !current {
            tracing::debug!(conversation_id = %id, "Session moved on; skipping reload after end");
            self.refresh.bump();
            return Ok(response);
        }

        if let Err(e) = self.load(&id).await {
            tracing::warn!(conversation_id = %id, "Reload after end failed: {:#}", e);
        }

        tokio::time::sleep(self.end_display_delay).await;
        self.refresh.bump();

        let mut store = self.store();
        if store.generation() == generation {
            store.set_end_dialog(EndDialog::Completed);
        }
        Ok(response)
    }

    /// Toggle a message's bookmark, applying the service's canonical value
    pub async fn toggle_bookmark(&self, message_id: MessageId) -> Result<bool> {
        let mutation = ToggleBookmark { message_id };
        let generation = mutation::begin(&mut self.store(), &mutation);

        let result = self.service.bookmark_message(message_id).await;
        mutation::settle(&mut self.store(), &mutation, generation, &result);

        let response = result?;
        tracing::debug!(message_id = %message_id, bookmarked = response.is_bookmarked, "Bookmark toggled");
        Ok(response.is_bookmarked)
    }

    /// Toggle one reaction kind, applying the service's canonical set
    pub async fn toggle_reaction(
        &self,
        message_id: MessageId,
        kind: ReactionKind,
    ) -> Result<BTreeSet<ReactionKind>> {
        let mutation = ToggleReaction { message_id, kind };
        let generation = mutation::begin(&mut self.store(), &mutation);

        let result = self.service.react_to_message(message_id, kind).await;
        mutation::settle(&mut self.store(), &mutation, generation, &result);

        let response = result?;
        tracing::debug!(message_id = %message_id, reaction = %kind, "Reaction toggled");
        Ok(response.reactions)
    }

    /// Create a child message of `message_id`
    ///
    /// The trunk is never touched. The child joins the cached branch group
    /// only if that group was already fetched.
    pub async fn branch(
        &self,
        message_id: MessageId,
        content: &str,
        branch_name: Option<&str>,
    ) -> Result<Message> {
        let generation = self.store().generation();
        match self
            .service
            .branch_message(message_id, content, branch_name)
            .await
        {
            Ok(child) => {
                let mut store = self.store();
                if store.generation() == generation {
                    store.append_branch(message_id, child.clone());
                }
                tracing::info!(parent = %message_id, "Branch created");
                Ok(child)
            }
            Err(e) => {
                tracing::error!(parent = %message_id, "Failed to create branch: {:#}", e);
                let mut store = self.store();
                if store.generation() == generation {
                    store.push_notice(failure_notice("create branch", &e));
                }
                Err(e)
            }
        }
    }

    /// Fetch the branch group of `parent` and cache it beside the trunk
    pub async fn branches(&self, parent: MessageId) -> Result<Vec<Message>> {
        let generation = self.store().generation();
        match self.service.get_branches(parent).await {
            Ok(children) => {
                let mut store = self.store();
                if store.generation() == generation {
                    store.set_branches(parent, children.clone());
                }
                Ok(children)
            }
            Err(e) => {
                tracing::error!(parent = %parent, "Failed to load branches: {:#}", e);
                let mut store = self.store();
                if store.generation() == generation {
                    store.push_notice(failure_notice("load branches", &e));
                }
                Err(e)
            }
        }
    }

    /// Share the active conversation, returning the public URL
    pub async fn share(&self) -> Result<String> {
        let id = self.require_active()?;
        match self.service.share_conversation(&id).await {
            Ok(share) => {
                let url = format!("{}{}", self.public_origin, share.share_url);
                tracing::info!(conversation_id = %id, "Conversation shared");
                self.store().push_notice(Notice::success("Share link created"));
                Ok(url)
            }
            Err(e) => {
                tracing::error!(conversation_id = %id, "Failed to share conversation: {:#}", e);
                self.store()
                    .push_notice(failure_notice("share conversation", &e));
                Err(e)
            }
        }
    }

    /// Export the active conversation and hand the payload to `sink`
    pub async fn export(&self, format: ExportFormat, sink: &dyn ExportSink) -> Result<PathBuf> {
        let id = self.require_active()?;
        let saved = match self.service.export_conversation(&id, format).await {
            Ok(payload) => sink.save(&payload),
            Err(e) => Err(e),
        };
        match saved {
            Ok(path) => {
                self.store().push_notice(Notice::success(format!(
                    "Conversation exported as {}",
                    format.as_query().to_uppercase()
                )));
                Ok(path)
            }
            Err(e) => {
                tracing::error!(conversation_id = %id, "Failed to export conversation: {:#}", e);
                self.store()
                    .push_notice(failure_notice("export conversation", &e));
                Err(e)
            }
        }
    }

    /// Follow-up prompts for the active conversation
    pub async fn suggestions(&self) -> Result<Vec<String>> {
        let id = self.require_active()?;
        self.service.get_suggestions(&id).await.map_err(|e| {
            tracing::warn!(conversation_id = %id, "Failed to load suggestions: {:#}", e);
            self.store()
                .push_notice(failure_notice("load suggestions", &e));
            e
        })
    }
}
