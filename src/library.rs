//! Cross-conversation views: bookmarks, free-text queries, analytics and
//! shared snapshots

use std::sync::Arc;

use crate::error::{RecallError, Result};
use crate::models::{Analytics, Conversation, Message};
use crate::service::ConversationService;

/// Read-only views over all of a user's conversations
pub struct LibraryController {
    service: Arc<dyn ConversationService>,
}

impl LibraryController {
    pub fn new(service: Arc<dyn ConversationService>) -> Self {
        Self { service }
    }

    /// Every bookmarked message, newest first
    pub async fn bookmarks(&self) -> Result<Vec<Message>> {
        let messages = self.service.get_bookmarked_messages().await?;
        tracing::debug!(count = messages.len(), "Loaded bookmarked messages");
        Ok(messages)
    }

    /// Ask a question answered over the summaries of ended conversations
    pub async fn query(&self, text: &str) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RecallError::InvalidInput("Query cannot be empty".to_string()).into());
        }
        let response = self.service.query_conversations(text).await?;
        Ok(response.response)
    }

    pub async fn analytics(&self) -> Result<Analytics> {
        self.service.get_analytics().await
    }

    /// Read a shared snapshot; works without a logged-in session
    pub async fn shared(&self, token: &str) -> Result<Conversation> {
        let token = token.trim().trim_matches('/');
        // Accept a full share URL as well as a bare token.
        let token = token.rsplit('/').next().unwrap_or(token);
        if token.is_empty() {
            return Err(RecallError::InvalidInput("Share token cannot be empty".to_string()).into());
        }
        self.service.get_shared_conversation(token).await
    }
}
