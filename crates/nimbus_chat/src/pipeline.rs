//! Chat pipeline.
//!
//! Two paths share the chat transcript:
//!
//! - **Conversation**: free-text turns sent to the conversational endpoint.
//! - **Agent pipeline**: `analyze → generate → execute` against one agent
//!   panel (a domain such as `aws` or `terraform`). Each panel keeps only the
//!   last rendered [`ResultCard`]; `execute` runs the plan in that card and is
//!   refused client-side when the card has no correlation id.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nimbus_core::{AgentStage, ChatTurn, ConsoleApi, ConversationRequest, CoreError, SessionStore, UiHandle};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::error::{ChatError, ChatResult};

/// Shown when `execute` is attempted without a plan to execute.
pub const GENERATE_FIRST: &str = "Please generate a plan first";

/// Which backend endpoint conversational turns go to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChatEndpoint {
    /// `POST /agents/conversation`
    #[default]
    Agents,
    /// `POST /api/chat`, after `POST /api/initialize`
    Legacy,
}

/// The id kinds that chain pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationKind {
    Plan,
    Config,
    Deployment,
    Assessment,
}

impl CorrelationKind {
    /// Lookup order when a payload carries more than one id.
    pub const ALL: [CorrelationKind; 4] = [
        CorrelationKind::Plan,
        CorrelationKind::Config,
        CorrelationKind::Deployment,
        CorrelationKind::Assessment,
    ];

    /// Payload field holding this id.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Plan => "plan_id",
            Self::Config => "config_id",
            Self::Deployment => "deployment_id",
            Self::Assessment => "assessment_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrelationId {
    pub kind: CorrelationKind,
    pub value: String,
}

impl CorrelationId {
    /// Find a correlation id at the top level of `payload` or under its
    /// `result` object.
    pub fn extract(payload: &Value) -> Option<Self> {
        let scopes = [Some(payload), payload.get("result")];
        scopes.into_iter().flatten().find_map(|scope| {
            CorrelationKind::ALL.iter().find_map(|kind| {
                let value = match scope.get(kind.field())? {
                    Value::String(s) if !s.is_empty() => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some(Self { kind: *kind, value })
            })
        })
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.field(), self.value)
    }
}

/// Output of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultCard {
    pub stage: AgentStage,
    pub domain: String,
    pub payload: Value,
    pub correlation_id: Option<CorrelationId>,
    pub created_at: DateTime<Utc>,
}

impl ResultCard {
    fn new(stage: AgentStage, domain: &str, payload: Value) -> Self {
        Self {
            stage,
            domain: domain.to_string(),
            correlation_id: CorrelationId::extract(&payload),
            payload,
            created_at: Utc::now(),
        }
    }

    /// One-line text for the transcript.
    pub fn summary(&self) -> String {
        if let Some(message) = self.payload.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
        match &self.correlation_id {
            Some(id) => format!("{} {} complete ({})", self.domain, self.stage, id),
            None => format!("{} {} complete", self.domain, self.stage),
        }
    }
}

/// Output of `analyze`. Only the pipeline can construct one, so `generate`
/// can only be fed a real analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    card: ResultCard,
}

impl Analysis {
    pub fn domain(&self) -> &str {
        &self.card.domain
    }

    pub fn payload(&self) -> &Value {
        &self.card.payload
    }

    pub fn card(&self) -> &ResultCard {
        &self.card
    }
}

/// Submits chat turns and drives agent pipelines.
pub struct ChatPipeline {
    api: Arc<dyn ConsoleApi>,
    session: Arc<SessionStore>,
    ui: UiHandle,
    endpoint: ChatEndpoint,
    /// Last rendered card per panel
    panels: Mutex<HashMap<String, ResultCard>>,
}

impl ChatPipeline {
    pub fn new(api: Arc<dyn ConsoleApi>, session: Arc<SessionStore>, ui: UiHandle) -> Self {
        Self {
            api,
            session,
            ui,
            endpoint: ChatEndpoint::default(),
            panels: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_endpoint(mut self, endpoint: ChatEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn endpoint(&self) -> ChatEndpoint {
        self.endpoint
    }

    /// Submit one conversational turn.
    ///
    /// Blank text is ignored: no turn, no request, `None`. Otherwise the user
    /// turn is appended, the reply (or a system error turn) follows it, and
    /// that reply turn is returned.
    pub async fn submit(&self, text: &str) -> Option<ChatTurn> {
        let message = text.trim();
        if message.is_empty() {
            debug!("Ignoring blank chat submission");
            return None;
        }

        self.ui.push_turn(ChatTurn::user(message));
        self.ui.update(|ui| {
            ui.chat_input.clear();
            ui.loading = true;
        });

        let request = ConversationRequest {
            message: message.to_string(),
            session_id: self.session.session_id(),
        };
        let result = match self.endpoint {
            ChatEndpoint::Agents => self.api.conversation(&request).await,
            ChatEndpoint::Legacy => self.api.chat(&request).await,
        };
        self.ui.set_loading(false);

        let turn = match result {
            Ok(reply) => {
                debug!("Conversation reply from {:?}", reply.agent_type);
                let turn = ChatTurn::assistant(reply.response);
                match reply.data {
                    Some(data) => turn.with_result(data),
                    None => turn,
                }
            }
            Err(e) => {
                warn!("Chat submission failed: {}", e);
                self.downgrade_if_unauthorized(&e);
                ChatTurn::system(format!("Error: {}", e))
            }
        };
        self.ui.push_turn(turn.clone());
        Some(turn)
    }

    /// Replace the input buffer.
    pub fn set_input(&self, text: impl Into<String>) {
        let text = text.into();
        self.ui.update(|ui| ui.chat_input = text);
    }

    /// Submit whatever is in the input buffer. Refused while input is
    /// disabled by the requirements wizard.
    pub async fn submit_input(&self) -> ChatResult<Option<ChatTurn>> {
        let input = self.ui.read(|ui| ui.input_enabled.then(|| ui.chat_input.clone()));
        match input {
            Some(text) => Ok(self.submit(&text).await),
            None => Err(ChatError::InputDisabled),
        }
    }

    /// First pipeline stage: `POST /agents/{domain}/analyze`.
    pub async fn analyze(&self, domain: &str, requirements: Value) -> ChatResult<Analysis> {
        let card = self
            .run_stage(domain, AgentStage::Analyze, json!({ "requirements": requirements }))
            .await?;
        Ok(Analysis { card })
    }

    /// Second stage: `POST /agents/{domain}/generate` with an analysis
    /// produced by [`analyze`](Self::analyze) for the same panel.
    pub async fn generate(&self, domain: &str, analysis: &Analysis) -> ChatResult<ResultCard> {
        if analysis.domain() != domain {
            return Err(ChatError::Validation(format!(
                "Analysis for '{}' cannot be used in the '{}' panel",
                analysis.domain(),
                domain
            )));
        }
        self.run_stage(domain, AgentStage::Generate, json!({ "analysis": analysis.payload() }))
            .await
    }

    /// Final stage: execute the plan in the panel's last card.
    ///
    /// Issues no request unless that card carries a correlation id.
    pub async fn execute(&self, domain: &str) -> ChatResult<ResultCard> {
        let Some((plan, correlation)) = self.executable_plan(domain) else {
            warn!("Refusing to execute in '{}': no plan with a correlation id", domain);
            self.ui.push_turn(ChatTurn::system(GENERATE_FIRST));
            return Err(ChatError::Validation(GENERATE_FIRST.to_string()));
        };

        let mut body = Map::new();
        body.insert("plan".to_string(), plan);
        body.insert(correlation.kind.field().to_string(), Value::String(correlation.value));
        self.run_stage(domain, AgentStage::Execute, Value::Object(body)).await
    }

    /// `GET /agents/{domain}/capabilities`.
    pub async fn capabilities(&self, domain: &str) -> ChatResult<Value> {
        Ok(self.api.agent_capabilities(domain).await?)
    }

    /// The panel's last rendered card.
    pub fn panel(&self, domain: &str) -> Option<ResultCard> {
        self.panels.lock().get(domain).cloned()
    }

    fn executable_plan(&self, domain: &str) -> Option<(Value, CorrelationId)> {
        let panels = self.panels.lock();
        let card = panels.get(domain)?;
        // An analysis can carry an assessment id, but it is not a plan
        if card.stage == AgentStage::Analyze {
            return None;
        }
        let correlation = card.correlation_id.clone()?;
        Some((card.payload.clone(), correlation))
    }

    async fn run_stage(&self, domain: &str, stage: AgentStage, body: Value) -> ChatResult<ResultCard> {
        self.ui.set_loading(true);
        let result = self.api.run_stage(domain, stage, &body).await;
        self.ui.set_loading(false);

        match result {
            Ok(payload) => {
                let card = ResultCard::new(stage, domain, payload);
                info!("{} {} complete", domain, stage);
                self.panels.lock().insert(domain.to_string(), card.clone());
                self.ui
                    .push_turn(ChatTurn::assistant(card.summary()).with_result(card.payload.clone()));
                Ok(card)
            }
            Err(e) => {
                warn!("{} {} failed: {}", domain, stage, e);
                self.downgrade_if_unauthorized(&e);
                self.ui.push_turn(ChatTurn::system(format!("Error: {}", e)));
                Err(e.into())
            }
        }
    }

    fn downgrade_if_unauthorized(&self, error: &CoreError) {
        if !error.is_auth() || !self.session.is_authenticated() {
            return;
        }
        info!("Credentials rejected, continuing anonymously");
        if let Err(e) = self.session.logout() {
            warn!("Failed to clear rejected credentials: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_lookup() {
        let id = CorrelationId::extract(&json!({"plan_id": "p-1", "steps": []})).unwrap();
        assert_eq!(id.kind, CorrelationKind::Plan);
        assert_eq!(id.value, "p-1");

        let id = CorrelationId::extract(&json!({"result": {"deployment_id": 42}})).unwrap();
        assert_eq!(id.kind, CorrelationKind::Deployment);
        assert_eq!(id.value, "42");

        assert!(CorrelationId::extract(&json!({"plan_id": ""})).is_none());
        assert!(CorrelationId::extract(&json!({"summary": "no ids"})).is_none());
        assert!(CorrelationId::extract(&json!("plan_id")).is_none());
    }

    #[test]
    fn test_top_level_id_wins_over_nested() {
        let id = CorrelationId::extract(&json!({
            "assessment_id": "a-1",
            "result": {"plan_id": "p-9"}
        }))
        .unwrap();
        assert_eq!(id.to_string(), "assessment_id: a-1");
    }

    #[test]
    fn test_card_summary() {
        let card = ResultCard::new(AgentStage::Generate, "aws", json!({"plan_id": "p-1"}));
        assert_eq!(card.summary(), "aws generate complete (plan_id: p-1)");

        let card = ResultCard::new(AgentStage::Analyze, "aws", json!({"message": "Looks feasible"}));
        assert_eq!(card.summary(), "Looks feasible");
        assert!(card.correlation_id.is_none());
    }
}
