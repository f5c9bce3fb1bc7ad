//! Local state of one open conversation view
//!
//! The store is a cache subordinate to the remote service. It is mutated
//! only by the session controller, never across a suspension point, and is
//! always left renderable after a failure.

use std::collections::{HashMap, VecDeque};

use crate::models::{
    Conversation, ConversationId, ConversationStatus, EndConversationResponse, Message, MessageId,
};

/// Lifecycle of the session's conversation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Nothing selected; the next send creates a conversation
    #[default]
    NoConversation,
    /// A conversation that accepts messages
    Active(ConversationId),
    /// A conversation the service has confirmed as ended
    Ended(ConversationId),
}

impl SessionPhase {
    /// Conversation id for the active or ended phase
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        match self {
            Self::NoConversation => None,
            Self::Active(id) | Self::Ended(id) => Some(id),
        }
    }

    /// Local view of the conversation status
    pub fn status(&self) -> Option<ConversationStatus> {
        match self {
            Self::NoConversation => None,
            Self::Active(_) => Some(ConversationStatus::Active),
            Self::Ended(_) => Some(ConversationStatus::Ended),
        }
    }

    fn for_conversation(conversation: &Conversation) -> Self {
        match conversation.status {
            ConversationStatus::Active => Self::Active(conversation.id.clone()),
            ConversationStatus::Ended => Self::Ended(conversation.id.clone()),
        }
    }
}

/// Severity of a transient notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Transient notification for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

/// Dialog-level state of the end flow
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EndDialog {
    /// No end in progress
    #[default]
    Closed,
    /// End request outstanding
    Ending,
    /// Service confirmed the end; shown for the display delay
    Succeeded(EndConversationResponse),
    /// Display delay elapsed; the view may navigate away
    Completed,
    /// End failed; status left untouched
    Failed(String),
}

/// A send awaiting its reply
#[derive(Debug, Clone, Copy)]
struct PendingSend {
    ticket: u64,
    /// Position of the optimistic user message; `None` once a reload has
    /// replaced the transcript
    user_index: Option<usize>,
}

/// Cached state of the open conversation
#[derive(Debug, Default)]
pub struct SessionStore {
    phase: SessionPhase,
    title: Option<String>,
    summary: Option<String>,
    messages: Vec<Message>,
    branches: HashMap<MessageId, Vec<Message>>,
    pending_sends: Vec<PendingSend>,
    next_send_ticket: u64,
    loading: bool,
    error: Option<String>,
    end_dialog: EndDialog,
    notices: VecDeque<Notice>,
    /// Bumped by every load; a load commits only with the current epoch
    load_epoch: u64,
    /// Bumped whenever the session switches conversations
    generation: u64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn active_conversation_id(&self) -> Option<&ConversationId> {
        self.phase.conversation_id()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn branches(&self, parent: MessageId) -> Option<&[Message]> {
        self.branches.get(&parent).map(Vec::as_slice)
    }

    /// True while any send is awaiting its reply
    pub fn send_in_flight(&self) -> bool {
        !self.pending_sends.is_empty()
    }

    /// Number of sends awaiting their reply
    pub fn sends_outstanding(&self) -> usize {
        self.pending_sends.len()
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn end_dialog(&self) -> &EndDialog {
        &self.end_dialog
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn load_epoch(&self) -> u64 {
        self.load_epoch
    }

    pub fn push_notice(&mut self, notice: Notice) {
        self.notices.push_back(notice);
    }

    /// Drain queued notifications in arrival order
    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    /// Drop everything and return to the no-conversation phase
    pub fn reset(&mut self) {
        self.generation += 1;
        self.load_epoch += 1;
        self.phase = SessionPhase::NoConversation;
        self.title = None;
        self.summary = None;
        self.messages.clear();
        self.branches.clear();
        self.pending_sends.clear();
        self.loading = false;
        self.error = None;
        self.end_dialog = EndDialog::Closed;
    }

    /// Start a load of `id`, returning the epoch the result must match
    pub fn begin_load(&mut self, id: &ConversationId) -> u64 {
        if self.phase.conversation_id() != Some(id) {
            self.switch_to(SessionPhase::NoConversation);
        }
        self.load_epoch += 1;
        self.loading = true;
        self.load_epoch
    }

    /// Replace the cache wholesale if `epoch` is still current
    pub fn commit_load(&mut self, epoch: u64, conversation: Conversation) -> bool {
        if epoch != self.load_epoch {
            return false;
        }
        let phase = SessionPhase::for_conversation(&conversation);
        if self.phase.conversation_id() != phase.conversation_id() {
            self.switch_to(SessionPhase::NoConversation);
        }
        self.phase = phase;
        self.title = Some(conversation.title);
        self.summary = conversation.summary;
        self.messages = conversation.messages;
        self.branches.clear();
        for pending in &mut self.pending_sends {
            pending.user_index = None;
        }
        self.loading = false;
        self.error = None;
        true
    }

    /// Revert to empty after a failed load if `epoch` is still current
    pub fn fail_load(&mut self, epoch: u64, error: String) -> bool {
        if epoch != self.load_epoch {
            return false;
        }
        self.switch_to(SessionPhase::NoConversation);
        self.title = None;
        self.summary = None;
        self.messages.clear();
        self.branches.clear();
        self.loading = false;
        self.error = Some(error);
        true
    }

    fn switch_to(&mut self, phase: SessionPhase) {
        self.generation += 1;
        self.phase = phase;
        self.pending_sends.clear();
        self.end_dialog = EndDialog::Closed;
    }

    /// Adopt a lazily created conversation for the session at `generation`
    pub fn adopt_created(&mut self, generation: u64, conversation: &Conversation) -> bool {
        if generation != self.generation || self.phase != SessionPhase::NoConversation {
            return false;
        }
        self.phase = SessionPhase::Active(conversation.id.clone());
        self.title = Some(conversation.title.clone());
        true
    }

    /// Ticket identifying the next send
    pub(crate) fn issue_send_ticket(&mut self) -> u64 {
        self.next_send_ticket += 1;
        self.next_send_ticket
    }

    /// Append the optimistic user message of send `ticket`
    pub(crate) fn begin_send(&mut self, ticket: u64, user: Message) {
        self.pending_sends.push(PendingSend {
            ticket,
            user_index: Some(self.messages.len()),
        });
        self.messages.push(user);
    }

    /// Place the reply of send `ticket` directly after its user message
    ///
    /// Replies whose user message was replaced by a reload go to the end.
    pub(crate) fn finish_send(&mut self, ticket: u64, reply: Message) {
        let Some(pos) = self.pending_sends.iter().position(|p| p.ticket == ticket) else {
            self.messages.push(reply);
            return;
        };
        let pending = self.pending_sends.remove(pos);
        let at = match pending.user_index {
            Some(index) if index < self.messages.len() => index + 1,
            _ => self.messages.len(),
        };
        self.messages.insert(at, reply);
        for other in &mut self.pending_sends {
            if let Some(index) = other.user_index.as_mut() {
                if *index >= at {
                    *index += 1;
                }
            }
        }
    }

    pub(crate) fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .chain(self.branches.values_mut().flatten())
            .find(|m| m.id == Some(id))
    }

    pub(crate) fn set_end_dialog(&mut self, dialog: EndDialog) {
        self.end_dialog = dialog;
    }

    pub(crate) fn set_branches(&mut self, parent: MessageId, children: Vec<Message>) {
        self.branches.insert(parent, children);
    }

    /// Append to a branch group only if it is already cached
    pub(crate) fn append_branch(&mut self, parent: MessageId, child: Message) -> bool {
        match self.branches.get_mut(&parent) {
            Some(group) => {
                group.push(child);
                true
            }
            None => false,
        }
    }
}
