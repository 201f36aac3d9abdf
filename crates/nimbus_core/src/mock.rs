//! Mock backend API for testing.
//!
//! Provides a scriptable implementation of [`ConsoleApi`] that captures every
//! call, so tests can assert exactly which requests a component issued (or
//! that it issued none).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::api::{error_from_body, AgentStage, ConsoleApi};
use crate::error::{CoreError, CoreResult};
use crate::types::{
    AgentInfo, ConversationReply, ConversationRequest, Identity, LoginRequest, LoginResponse,
    PlatformStatus,
};

/// Predefined reply for a route.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// 2xx with a JSON body
    Ok(Value),
    /// Non-success status with a raw body
    Status { status: u16, body: String },
    /// The request never reached the backend
    Transport(String),
}

impl MockReply {
    pub fn ok(body: Value) -> Self {
        Self::Ok(body)
    }

    pub fn error(status: u16, detail: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: json!({ "detail": detail.into() }).to_string(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    /// Route, e.g. `POST /agents/aws/generate`
    pub route: String,
    pub body: Option<Value>,
    /// Bearer token in effect when the call was made
    pub token: Option<String>,
}

/// Mock backend for testing.
#[derive(Clone, Default)]
pub struct MockApi {
    token: Arc<RwLock<Option<String>>>,
    /// Scripted replies per route; the last reply for a route is sticky.
    responses: Arc<RwLock<HashMap<String, VecDeque<MockReply>>>>,
    /// Tokens `GET /auth/me` accepts when no reply is scripted.
    accepted_tokens: Arc<RwLock<HashMap<String, Identity>>>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for a route.
    pub fn respond(self, route: impl Into<String>, reply: MockReply) -> Self {
        self.responses
            .write()
            .entry(route.into())
            .or_default()
            .push_back(reply);
        self
    }

    /// Make `GET /auth/me` succeed for `token`.
    pub fn accept_token(self, token: impl Into<String>, identity: Identity) -> Self {
        self.accepted_tokens.write().insert(token.into(), identity);
        self
    }

    /// Stop accepting `token`, as if it expired server-side.
    pub fn revoke_token(&self, token: &str) {
        self.accepted_tokens.write().remove(token);
    }

    pub fn current_token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    pub fn was_called(&self, route: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.route == route)
    }

    pub fn calls_to(&self, route: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.route == route)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    fn record_call(&self, route: &str, body: Option<Value>) {
        self.captured_calls.write().push(CapturedCall {
            route: route.to_string(),
            body,
            token: self.token.read().clone(),
        });
    }

    fn next_reply(&self, route: &str) -> Option<MockReply> {
        let mut responses = self.responses.write();
        let queue = responses.get_mut(route)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn reply<T: DeserializeOwned>(&self, route: &str, body: Option<Value>) -> CoreResult<T> {
        self.record_call(route, body);
        match self.next_reply(route) {
            Some(MockReply::Ok(value)) => {
                serde_json::from_value(value).map_err(|e| CoreError::Decode(e.to_string()))
            }
            Some(MockReply::Status { status, body }) => Err(error_from_body(status, &body)),
            Some(MockReply::Transport(message)) => Err(CoreError::Transport(message)),
            None => Err(CoreError::Transport(format!("no mock reply for {}", route))),
        }
    }
}

#[async_trait]
impl ConsoleApi for MockApi {
    fn set_auth_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    async fn current_user(&self) -> CoreResult<Identity> {
        let route = "GET /auth/me";
        if self.responses.read().contains_key(route) {
            return self.reply(route, None);
        }

        self.record_call(route, None);
        let token = self.token.read().clone();
        token
            .and_then(|t| self.accepted_tokens.read().get(&t).cloned())
            .ok_or_else(|| CoreError::Unauthorized("Could not validate credentials".to_string()))
    }

    async fn login(&self, request: &LoginRequest) -> CoreResult<LoginResponse> {
        let body = json!({ "username": request.username });
        self.reply("POST /auth/login", Some(body))
    }

    async fn platform_status(&self) -> CoreResult<PlatformStatus> {
        self.reply("GET /platform/status", None)
    }

    async fn list_agents(&self) -> CoreResult<Vec<AgentInfo>> {
        self.reply("GET /agents/", None)
    }

    async fn agent_capabilities(&self, agent_type: &str) -> CoreResult<Value> {
        self.reply(&format!("GET /agents/{}/capabilities", agent_type), None)
    }

    async fn run_stage(&self, agent_type: &str, stage: AgentStage, body: &Value) -> CoreResult<Value> {
        let route = format!("POST /agents/{}/{}", agent_type, stage);
        self.reply(&route, Some(body.clone()))
    }

    async fn conversation(&self, request: &ConversationRequest) -> CoreResult<ConversationReply> {
        let body = serde_json::to_value(request)?;
        self.reply("POST /agents/conversation", Some(body))
    }

    async fn initialize(&self) -> CoreResult<Value> {
        self.reply("POST /api/initialize", None)
    }

    async fn chat(&self, request: &ConversationRequest) -> CoreResult<ConversationReply> {
        let body = serde_json::to_value(request)?;
        self.reply("POST /api/chat", Some(body))
    }

    async fn api_status(&self) -> CoreResult<Value> {
        self.reply("GET /api/status", None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies_are_consumed_then_sticky() {
        let api = MockApi::new()
            .respond("GET /api/status", MockReply::ok(json!({"n": 1})))
            .respond("GET /api/status", MockReply::ok(json!({"n": 2})));

        assert_eq!(api.api_status().await.unwrap()["n"], 1);
        assert_eq!(api.api_status().await.unwrap()["n"], 2);
        assert_eq!(api.api_status().await.unwrap()["n"], 2);
        assert_eq!(api.call_count(), 3);
    }

    #[tokio::test]
    async fn test_accepted_token() {
        let identity = Identity {
            id: None,
            username: "ops".to_string(),
            email: None,
            full_name: None,
            roles: vec![],
        };
        let api = MockApi::new().accept_token("good", identity);

        api.set_auth_token(Some("bad".to_string()));
        assert!(api.current_user().await.unwrap_err().is_auth());

        api.set_auth_token(Some("good".to_string()));
        assert_eq!(api.current_user().await.unwrap().username, "ops");
        assert_eq!(api.calls_to("GET /auth/me")[1].token.as_deref(), Some("good"));
    }

    #[tokio::test]
    async fn test_unscripted_route_is_transport_error() {
        let api = MockApi::new();
        let err = api.initialize().await.unwrap_err();
        assert!(err.is_transient());
        assert!(api.was_called("POST /api/initialize"));
    }
}
