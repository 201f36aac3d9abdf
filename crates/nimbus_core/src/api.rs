//! Backend REST API.
//!
//! `ConsoleApi` is the seam every component talks through. `HttpApi` is the
//! production implementation over `reqwest`; `MockApi` (see `mock`) records
//! calls for tests.

use std::fmt;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::ConsoleConfig;
use crate::error::{CoreError, CoreResult};
use crate::types::{
    AgentInfo, ConversationReply, ConversationRequest, Identity, LoginRequest, LoginResponse,
    PlatformStatus,
};

/// Stage of the agent pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStage {
    Analyze,
    Generate,
    Execute,
}

impl AgentStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Generate => "generate",
            Self::Execute => "execute",
        }
    }
}

impl fmt::Display for AgentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calls the console makes against the backend.
#[async_trait]
pub trait ConsoleApi: Send + Sync {
    /// Set or clear the Bearer token sent with every request.
    fn set_auth_token(&self, token: Option<String>);

    /// `GET /auth/me`
    async fn current_user(&self) -> CoreResult<Identity>;

    /// `POST /auth/login`
    async fn login(&self, request: &LoginRequest) -> CoreResult<LoginResponse>;

    /// `GET /platform/status`
    async fn platform_status(&self) -> CoreResult<PlatformStatus>;

    /// `GET /agents/`
    async fn list_agents(&self) -> CoreResult<Vec<AgentInfo>>;

    /// `GET /agents/{type}/capabilities`
    async fn agent_capabilities(&self, agent_type: &str) -> CoreResult<Value>;

    /// `POST /agents/{type}/{analyze|generate|execute}`
    async fn run_stage(&self, agent_type: &str, stage: AgentStage, body: &Value) -> CoreResult<Value>;

    /// `POST /agents/conversation`
    async fn conversation(&self, request: &ConversationRequest) -> CoreResult<ConversationReply>;

    /// `POST /api/initialize`
    async fn initialize(&self) -> CoreResult<Value>;

    /// `POST /api/chat`
    async fn chat(&self, request: &ConversationRequest) -> CoreResult<ConversationReply>;

    /// `GET /api/status`
    async fn api_status(&self) -> CoreResult<Value>;
}

/// `GET /agents/` answers either a bare list or `{"agents": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum AgentList {
    Bare(Vec<AgentInfo>),
    Wrapped { agents: Vec<AgentInfo> },
}

/// HTTP implementation of [`ConsoleApi`].
pub struct HttpApi {
    base_url: String,
    client: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl HttpApi {
    pub fn new(config: &ConsoleConfig) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CoreError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            client,
            token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        let builder = self.client.request(method, url);
        match self.token.read().as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> CoreResult<T> {
        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_body(status.as_u16(), &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ConsoleApi for HttpApi {
    fn set_auth_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    async fn current_user(&self) -> CoreResult<Identity> {
        self.send(self.request(Method::GET, "/auth/me")).await
    }

    async fn login(&self, request: &LoginRequest) -> CoreResult<LoginResponse> {
        self.send(self.request(Method::POST, "/auth/login").json(request)).await
    }

    async fn platform_status(&self) -> CoreResult<PlatformStatus> {
        self.send(self.request(Method::GET, "/platform/status")).await
    }

    async fn list_agents(&self) -> CoreResult<Vec<AgentInfo>> {
        let list: AgentList = self.send(self.request(Method::GET, "/agents/")).await?;
        Ok(match list {
            AgentList::Bare(agents) | AgentList::Wrapped { agents } => agents,
        })
    }

    async fn agent_capabilities(&self, agent_type: &str) -> CoreResult<Value> {
        let path = format!("/agents/{}/capabilities", agent_type);
        self.send(self.request(Method::GET, &path)).await
    }

    async fn run_stage(&self, agent_type: &str, stage: AgentStage, body: &Value) -> CoreResult<Value> {
        let path = format!("/agents/{}/{}", agent_type, stage);
        self.send(self.request(Method::POST, &path).json(body)).await
    }

    async fn conversation(&self, request: &ConversationRequest) -> CoreResult<ConversationReply> {
        self.send(self.request(Method::POST, "/agents/conversation").json(request))
            .await
    }

    async fn initialize(&self) -> CoreResult<Value> {
        self.send(self.request(Method::POST, "/api/initialize").json(&serde_json::json!({})))
            .await
    }

    async fn chat(&self, request: &ConversationRequest) -> CoreResult<ConversationReply> {
        self.send(self.request(Method::POST, "/api/chat").json(request)).await
    }

    async fn api_status(&self) -> CoreResult<Value> {
        self.send(self.request(Method::GET, "/api/status")).await
    }
}

/// Map a non-success response to an error, keeping the backend's message verbatim.
pub fn error_from_body(status: u16, body: &str) -> CoreError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            ["detail", "error", "message"].iter().find_map(|key| match json.get(*key) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            })
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                format!("HTTP {}", status)
            } else {
                trimmed.to_string()
            }
        });

    match status {
        401 | 403 => CoreError::Unauthorized(message),
        _ => CoreError::Backend { status, message },
    }
}
