//! HTTP client for the RecallAI conversation service
//!
//! Talks to the REST API of the conversation service. Session and
//! anti-forgery cookies live in a shared cookie jar; every mutating request
//! copies the `csrftoken` cookie into the `X-CSRFToken` header. Shared
//! snapshots are read through a second client that carries no cookies.

use crate::config::ServiceConfig;
use crate::error::{RecallError, Result};
use crate::export::{ExportFormat, ExportPayload};
use crate::models::{
    Analytics, ArchiveResponse, BookmarkResponse, Conversation, ConversationId,
    EndConversationResponse, Message, MessageId, QueryResponse, ReactionKind, ReactionResponse,
    SendMessageResponse, ShareResponse, SuggestionsResponse,
};
use crate::service::ConversationService;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const CSRF_COOKIE: &str = "csrftoken";
const CSRF_HEADER: &str = "X-CSRFToken";

/// Response of the login/register/logout endpoints
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthResponse {
    /// Status line from the service
    pub message: String,
    /// Authenticated user name, when applicable
    #[serde(default)]
    pub username: Option<String>,
}

/// Response of the current-user endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CurrentUser {
    /// User name when authenticated
    #[serde(default)]
    pub username: Option<String>,
    /// Whether the session cookie belongs to a logged-in user
    pub is_authenticated: bool,
}

#[derive(Debug, Serialize)]
struct CreateConversationRequest<'a> {
    title: &'a str,
    status: &'a str,
}

#[derive(Debug, Serialize)]
struct ContentRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ReactRequest {
    reaction: ReactionKind,
}

#[derive(Debug, Serialize)]
struct BranchRequest<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Serialize)]
struct CredentialsRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Error body shape used by the auth endpoints
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// REST client for the conversation service
///
/// # Examples
///
/// ```no_run
/// use recallai::config::ServiceConfig;
/// use recallai::service::{ConversationService, HttpConversationService};
///
/// # async fn example() -> recallai::error::Result<()> {
/// let service = HttpConversationService::new(&ServiceConfig::default())?;
/// service.handshake().await?;
/// let conversations = service.list_conversations(false).await?;
/// # Ok(())
/// # }
/// ```
pub struct HttpConversationService {
    client: Client,
    public_client: Client,
    jar: Arc<Jar>,
    base_url: String,
}

impl HttpConversationService {
    /// Create a new client for the configured service
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is invalid or HTTP client
    /// initialization fails
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| {
            RecallError::Config(format!("Invalid service base URL {}: {}", base_url, e))
        })?;

        let jar = Arc::new(Jar::default());
        let timeout = Duration::from_secs(config.timeout_seconds);

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone())
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| RecallError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let public_client = Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RecallError::Config(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!("Initialized conversation service client: base_url={}", base_url);

        Ok(Self {
            client,
            public_client,
            jar,
            base_url,
        })
    }

    /// Base URL all API paths are appended to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn cookie_url(&self) -> Option<Url> {
        Url::parse(&format!("{}/", self.base_url)).ok()
    }

    /// Cookies the jar would send to the service, as a `Cookie` header value
    pub fn session_cookies(&self) -> Option<String> {
        let header = self.jar.cookies(&self.cookie_url()?)?;
        header.to_str().ok().map(str::to_string)
    }

    /// Seed the jar from a value previously returned by [`Self::session_cookies`]
    pub fn restore_session_cookies(&self, cookies: &str) {
        let Some(url) = self.cookie_url() else {
            return;
        };
        for pair in cookies.split(';').map(str::trim).filter(|p| p.contains('=')) {
            self.jar.add_cookie_str(&format!("{}; Path=/", pair), &url);
        }
    }

    /// Current anti-forgery token from the cookie jar, if the handshake ran
    pub fn csrf_token(&self) -> Option<String> {
        let cookies = self.session_cookies()?;
        cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == CSRF_COOKIE)
            .map(|(_, value)| value.to_string())
    }

    /// Start a mutating request carrying the anti-forgery header
    fn mutating(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.csrf_token() {
            Some(token) => builder.header(CSRF_HEADER, token),
            None => {
                tracing::debug!("No {} cookie present; sending without {}", CSRF_COOKIE, CSRF_HEADER);
                builder
            }
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.mutating(self.client.post(self.url(path)))
    }

    async fn execute(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let response = builder.send().await.map_err(|e| {
            tracing::warn!("Request failed ({}): {}", what, e);
            RecallError::Remote {
                status: None,
                message: format!("Failed to {}: {}", what, e),
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::error!("Service returned error {} ({}): {}", status, what, body);
        Err(status_error(status, what, body).into())
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T> {
        let response = self.execute(builder, what).await?;
        response.json::<T>().await.map_err(|e| {
            tracing::error!("Failed to parse response ({}): {}", what, e);
            RecallError::Remote {
                status: None,
                message: format!("Failed to parse response to {}: {}", what, e),
            }
            .into()
        })
    }

    /// Obtain the anti-forgery cookie (unauthenticated)
    pub async fn handshake(&self) -> Result<()> {
        tracing::debug!("Fetching anti-forgery cookie");
        self.execute(self.get("/auth/csrf/"), "fetch CSRF token")
            .await?;
        if self.csrf_token().is_none() {
            tracing::warn!("Handshake succeeded but no {} cookie was set", CSRF_COOKIE);
        }
        Ok(())
    }

    /// Log in with user name and password
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse> {
        self.credentials("/auth/login/", username, password, "log in")
            .await
    }

    /// Register a new account and log in
    pub async fn register(&self, username: &str, password: &str) -> Result<AuthResponse> {
        self.credentials("/auth/register/", username, password, "register")
            .await
    }

    async fn credentials(
        &self,
        path: &str,
        username: &str,
        password: &str,
        what: &str,
    ) -> Result<AuthResponse> {
        let response = self
            .post(path)
            .json(&CredentialsRequest { username, password })
            .send()
            .await
            .map_err(|e| RecallError::Remote {
                status: None,
                message: format!("Failed to {}: {}", what, e),
            })?;

        let status = response.status();
        if status.is_success() {
            return response.json::<AuthResponse>().await.map_err(|e| {
                RecallError::Remote {
                    status: None,
                    message: format!("Failed to parse response to {}: {}", what, e),
                }
                .into()
            });
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                RecallError::Unauthenticated(message)
            }
            StatusCode::BAD_REQUEST => RecallError::InvalidInput(message),
            _ => RecallError::Remote {
                status: Some(status.as_u16()),
                message,
            },
        }
        .into())
    }

    /// End the server session
    pub async fn logout(&self) -> Result<AuthResponse> {
        self.execute_json(self.post("/auth/logout/"), "log out")
            .await
    }

    /// Who the session cookie belongs to
    ///
    /// An unauthenticated session is reported as `is_authenticated = false`
    /// rather than an error.
    pub async fn current_user(&self) -> Result<CurrentUser> {
        match self
            .execute_json::<CurrentUser>(self.get("/auth/user/"), "get current user")
            .await
        {
            Ok(user) => Ok(user),
            Err(e) if matches!(e.downcast_ref(), Some(RecallError::Unauthenticated(_))) => {
                Ok(CurrentUser {
                    username: None,
                    is_authenticated: false,
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// Map a non-success status to the error taxonomy
fn status_error(status: StatusCode, what: &str, body: String) -> RecallError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RecallError::Unauthenticated(format!("{} ({})", what, status))
        }
        StatusCode::NOT_FOUND => RecallError::NotFound(what.to_string()),
        StatusCode::GONE => RecallError::Expired(what.to_string()),
        _ => RecallError::Remote {
            status: Some(status.as_u16()),
            message: if body.is_empty() {
                format!("Failed to {}", what)
            } else {
                format!("Failed to {}: {}", what, body)
            },
        },
    }
}

/// Extract `filename="..."` from a Content-Disposition header
fn disposition_file_name(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

#[async_trait]
impl ConversationService for HttpConversationService {
    async fn list_conversations(&self, archived: bool) -> Result<Vec<Conversation>> {
        tracing::debug!(archived, "Listing conversations");
        let mut builder = self.get("/conversations/");
        if archived {
            builder = builder.query(&[("show_archived", "true")]);
        }
        let conversations: Vec<Conversation> =
            self.execute_json(builder, "list conversations").await?;

        // `show_archived=true` returns every conversation; keep only one view.
        Ok(conversations
            .into_iter()
            .filter(|c| c.is_archived == archived)
            .collect())
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<Conversation> {
        tracing::debug!(conversation_id = %id, "Fetching conversation");
        self.execute_json(
            self.get(&format!("/conversations/{}/", id)),
            &format!("fetch conversation {}", id),
        )
        .await
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation> {
        tracing::debug!("Creating conversation");
        self.execute_json(
            self.post("/conversations/").json(&CreateConversationRequest {
                title,
                status: "active",
            }),
            "create conversation",
        )
        .await
    }

    async fn send_message(
        &self,
        id: &ConversationId,
        content: &str,
    ) -> Result<SendMessageResponse> {
        tracing::debug!(conversation_id = %id, len = content.len(), "Sending message");
        self.execute_json(
            self.post(&format!("/conversations/{}/send_message/", id))
                .json(&ContentRequest { content }),
            "send message",
        )
        .await
    }

    async fn end_conversation(&self, id: &ConversationId) -> Result<EndConversationResponse> {
        tracing::debug!(conversation_id = %id, "Ending conversation");
        self.execute_json(
            self.post(&format!("/conversations/{}/end/", id)),
            "end conversation",
        )
        .await
    }

    async fn archive_conversation(&self, id: &ConversationId) -> Result<ArchiveResponse> {
        self.execute_json(
            self.post(&format!("/conversations/{}/archive/", id)),
            &format!("archive conversation {}", id),
        )
        .await
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<()> {
        let builder = self.mutating(self.client.delete(self.url(&format!("/conversations/{}/", id))));
        self.execute(builder, &format!("delete conversation {}", id))
            .await?;
        Ok(())
    }

    async fn share_conversation(&self, id: &ConversationId) -> Result<ShareResponse> {
        self.execute_json(
            self.post(&format!("/conversations/{}/share/", id)),
            &format!("share conversation {}", id),
        )
        .await
    }

    async fn get_shared_conversation(&self, token: &str) -> Result<Conversation> {
        let builder = self
            .public_client
            .get(self.url(&format!("/conversations/shared/{}/", token)));
        self.execute_json(builder, "get shared conversation").await
    }

    async fn export_conversation(
        &self,
        id: &ConversationId,
        format: ExportFormat,
    ) -> Result<ExportPayload> {
        let builder = self
            .get(&format!("/conversations/{}/export/", id))
            .query(&[("format", format.as_query())]);
        let response = self
            .execute(builder, &format!("export conversation {}", id))
            .await?;

        let headers = response.headers();
        let content_type = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let file_name = headers
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_file_name)
            .unwrap_or_else(|| format.file_name(id));

        let data = response.bytes().await.map_err(|e| RecallError::Remote {
            status: None,
            message: format!("Failed to read export body: {}", e),
        })?;

        Ok(ExportPayload {
            format,
            file_name,
            content_type,
            data,
        })
    }

    async fn get_suggestions(&self, id: &ConversationId) -> Result<Vec<String>> {
        let response: SuggestionsResponse = self
            .execute_json(
                self.get(&format!("/conversations/{}/suggestions/", id)),
                "get suggestions",
            )
            .await?;
        Ok(response.suggestions)
    }

    async fn bookmark_message(&self, message_id: MessageId) -> Result<BookmarkResponse> {
        tracing::debug!(message_id = %message_id, "Toggling bookmark");
        self.execute_json(
            self.post(&format!("/messages/{}/bookmark/", message_id)),
            &format!("bookmark message {}", message_id),
        )
        .await
    }

    async fn react_to_message(
        &self,
        message_id: MessageId,
        kind: ReactionKind,
    ) -> Result<ReactionResponse> {
        tracing::debug!(message_id = %message_id, reaction = %kind, "Toggling reaction");
        self.execute_json(
            self.post(&format!("/messages/{}/react/", message_id))
                .json(&ReactRequest { reaction: kind }),
            &format!("react to message {}", message_id),
        )
        .await
    }

    async fn branch_message(
        &self,
        message_id: MessageId,
        content: &str,
        branch_name: Option<&str>,
    ) -> Result<Message> {
        self.execute_json(
            self.post(&format!("/messages/{}/branch/", message_id))
                .json(&BranchRequest {
                    content,
                    branch_name,
                }),
            &format!("branch message {}", message_id),
        )
        .await
    }

    async fn get_branches(&self, message_id: MessageId) -> Result<Vec<Message>> {
        self.execute_json(
            self.get(&format!("/messages/{}/get_branches/", message_id)),
            &format!("get branches of message {}", message_id),
        )
        .await
    }

    async fn get_bookmarked_messages(&self) -> Result<Vec<Message>> {
        self.execute_json(self.get("/messages/bookmarked/"), "get bookmarked messages")
            .await
    }

    async fn query_conversations(&self, query: &str) -> Result<QueryResponse> {
        self.execute_json(
            self.post("/conversations/query/")
                .json(&QueryRequest { query }),
            "query conversations",
        )
        .await
    }

    async fn get_analytics(&self) -> Result<Analytics> {
        self.execute_json(self.get("/conversations/analytics/"), "get analytics")
            .await
    }
}
