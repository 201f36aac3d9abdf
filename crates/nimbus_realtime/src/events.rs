//! Inbound event routing.
//!
//! Frames arrive as `{"message_type": ..., "data": {...}}`. The router
//! classifies each one, applies its built-in effect on the UI state and then
//! calls any extra handlers registered for that kind. Bad frames are logged
//! and dropped; `dispatch` never fails, so the receive loop keeps going.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use nimbus_core::{NotificationLevel, UiHandle};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::dashboard::DashboardRefresher;

/// Discriminant of an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AgentUpdate,
    TaskUpdate,
    Notification,
    Welcome,
    Pong,
    Error,
    Unknown,
}

impl EventKind {
    pub fn parse(message_type: &str) -> Self {
        match message_type {
            "agent_update" => Self::AgentUpdate,
            "task_update" => Self::TaskUpdate,
            "notification" => Self::Notification,
            "welcome" => Self::Welcome,
            "pong" => Self::Pong,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentUpdate => "agent_update",
            Self::TaskUpdate => "task_update",
            Self::Notification => "notification",
            Self::Welcome => "welcome",
            Self::Pong => "pong",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub kind: EventKind,
    /// The raw discriminant, kept for `Unknown` events
    pub message_type: String,
    pub data: Value,
}

impl InboundEvent {
    /// Parse a raw frame. `None` when the frame is not a JSON object with a
    /// string `message_type`.
    pub fn parse(raw: &str) -> Option<Self> {
        #[derive(Deserialize)]
        struct Frame {
            message_type: String,
            #[serde(default)]
            data: Value,
        }

        let frame: Frame = serde_json::from_str(raw).ok()?;
        Some(Self {
            kind: EventKind::parse(&frame.message_type),
            message_type: frame.message_type,
            data: frame.data,
        })
    }

    fn str_field(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| match self.data.get(*key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }
}

pub type EventHandler = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

/// Dispatches inbound frames to UI updates and registered handlers.
pub struct EventRouter {
    ui: UiHandle,
    refresher: Arc<dyn DashboardRefresher>,
    handlers: RwLock<HashMap<EventKind, Vec<EventHandler>>>,
}

impl EventRouter {
    pub fn new(ui: UiHandle, refresher: Arc<dyn DashboardRefresher>) -> Self {
        Self {
            ui,
            refresher,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register an extra handler, called after the built-in effect.
    pub fn on(&self, kind: EventKind, handler: impl Fn(&InboundEvent) + Send + Sync + 'static) {
        self.handlers.write().entry(kind).or_default().push(Arc::new(handler));
    }

    /// Route one raw frame. Returns the kind that was handled, or `None` when
    /// the frame was malformed or of an unknown type and was dropped.
    pub async fn dispatch(&self, raw: &str) -> Option<EventKind> {
        let Some(event) = InboundEvent::parse(raw) else {
            warn!("Dropping malformed event frame: {}", truncate(raw, 200));
            return None;
        };

        if event.kind == EventKind::Unknown {
            warn!("Dropping event with unknown message_type '{}'", event.message_type);
            return None;
        }

        debug!("Dispatching {} event", event.kind);
        self.apply(&event).await;

        let handlers = self
            .handlers
            .read()
            .get(&event.kind)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                error!("Handler for {} event panicked", event.kind);
            }
        }

        Some(event.kind)
    }

    /// Dispatch frames until the sender side is dropped.
    pub async fn run(self: Arc<Self>, mut frames: mpsc::UnboundedReceiver<String>) {
        while let Some(frame) = frames.recv().await {
            self.dispatch(&frame).await;
        }
        debug!("Event router stopped");
    }

    async fn apply(&self, event: &InboundEvent) {
        match event.kind {
            EventKind::AgentUpdate => {
                if let Err(e) = self.refresher.refresh_dashboard().await {
                    warn!("Dashboard refresh after agent_update failed: {}", e);
                }
            }
            EventKind::TaskUpdate => match event.str_field(&["task_id", "id"]) {
                Some(task_id) => {
                    let data = event.data.clone();
                    self.ui.update(|ui| {
                        ui.tasks.insert(task_id, data);
                    });
                }
                None => warn!("task_update without a task id"),
            },
            EventKind::Notification => {
                let message = event
                    .str_field(&["message", "text"])
                    .unwrap_or_else(|| event.data.to_string());
                let level = event
                    .str_field(&["level", "type"])
                    .map(|l| NotificationLevel::parse(&l))
                    .unwrap_or(NotificationLevel::Info);
                self.ui.notify(level, message);
            }
            EventKind::Welcome => {
                let message = event.str_field(&["message"]).unwrap_or_else(|| "Connected".to_string());
                self.ui.update(|ui| ui.welcome = Some(message));
            }
            EventKind::Pong => {
                self.ui.update(|ui| ui.last_pong = Some(Utc::now()));
            }
            EventKind::Error => {
                let message = event
                    .str_field(&["message", "error", "detail"])
                    .unwrap_or_else(|| "Unknown server error".to_string());
                self.ui.notify(NotificationLevel::Error, message);
            }
            EventKind::Unknown => {}
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::PullDashboard;
    use nimbus_core::{MockApi, MockReply};
    use serde_json::json;

    fn router_with(api: MockApi) -> (EventRouter, UiHandle) {
        let ui = UiHandle::new();
        let refresher = Arc::new(PullDashboard::new(Arc::new(api), ui.clone()));
        (EventRouter::new(ui.clone(), refresher), ui)
    }

    #[test]
    fn test_parse_frames() {
        let event = InboundEvent::parse(r#"{"message_type":"task_update","data":{"task_id":"t1"}}"#).unwrap();
        assert_eq!(event.kind, EventKind::TaskUpdate);

        let event = InboundEvent::parse(r#"{"message_type":"pong"}"#).unwrap();
        assert_eq!(event.data, Value::Null);

        assert!(InboundEvent::parse("not json").is_none());
        assert!(InboundEvent::parse(r#"{"data":{}}"#).is_none());
        assert!(InboundEvent::parse(r#"{"message_type":5}"#).is_none());
    }

    #[tokio::test]
    async fn test_bad_frames_leave_ui_unchanged() {
        let api = MockApi::new();
        let (router, ui) = router_with(api.clone());
        let before = ui.snapshot();

        for raw in ["", "{", "[1,2]", "null", r#"{"message_type":"deploy_started","data":{}}"#] {
            assert_eq!(router.dispatch(raw).await, None);
        }

        assert_eq!(ui.snapshot(), before);
        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn test_agent_update_pulls_full_dashboard() {
        let api = MockApi::new()
            .respond("GET /platform/status", MockReply::ok(json!({"status": "healthy", "version": "1.2"})))
            .respond("GET /agents/", MockReply::ok(json!([{"agent_type": "aws", "name": "AWS"}])));
        let (router, ui) = router_with(api.clone());

        let kind = router
            .dispatch(r#"{"message_type":"agent_update","data":{"agent_type":"aws","status":"busy"}}"#)
            .await;

        assert_eq!(kind, Some(EventKind::AgentUpdate));
        assert!(api.was_called("GET /platform/status"));
        assert!(api.was_called("GET /agents/"));
        let dashboard = ui.snapshot().dashboard.unwrap();
        assert_eq!(dashboard.status.status, "healthy");
        assert_eq!(dashboard.agents[0].agent_type, "aws");
    }

    #[tokio::test]
    async fn test_failed_refresh_is_swallowed() {
        let api = MockApi::new().respond("GET /platform/status", MockReply::error(500, "down"));
        let (router, ui) = router_with(api);

        let kind = router.dispatch(r#"{"message_type":"agent_update","data":{}}"#).await;
        assert_eq!(kind, Some(EventKind::AgentUpdate));
        assert!(ui.snapshot().dashboard.is_none());
    }

    #[tokio::test]
    async fn test_builtin_effects() {
        let (router, ui) = router_with(MockApi::new());

        router
            .dispatch(r#"{"message_type":"task_update","data":{"task_id":"t-1","status":"running"}}"#)
            .await;
        router
            .dispatch(r#"{"message_type":"task_update","data":{"task_id":"t-1","status":"done"}}"#)
            .await;
        router
            .dispatch(r#"{"message_type":"notification","data":{"message":"Plan ready","level":"success"}}"#)
            .await;
        router
            .dispatch(r#"{"message_type":"error","data":{"message":"Agent crashed"}}"#)
            .await;
        router
            .dispatch(r#"{"message_type":"welcome","data":{"message":"Welcome, client 42"}}"#)
            .await;
        router.dispatch(r#"{"message_type":"pong","data":{}}"#).await;

        let snapshot = ui.snapshot();
        assert_eq!(snapshot.tasks["t-1"]["status"], "done");
        assert_eq!(snapshot.notifications.len(), 2);
        assert_eq!(snapshot.notifications[0].level, NotificationLevel::Success);
        assert_eq!(snapshot.notifications[1].message, "Agent crashed");
        assert_eq!(snapshot.welcome.as_deref(), Some("Welcome, client 42"));
        assert!(snapshot.last_pong.is_some());
    }

    #[tokio::test]
    async fn test_registered_handlers_run_after_builtin() {
        let (router, ui) = router_with(MockApi::new());
        let seen = Arc::new(RwLock::new(Vec::new()));
        let sink = seen.clone();
        let ui_probe = ui.clone();
        router.on(EventKind::Notification, move |event| {
            sink.write().push((event.message_type.clone(), ui_probe.snapshot().notifications.len()));
        });
        router.on(EventKind::Pong, |_| panic!("handler bug"));

        router.dispatch(r#"{"message_type":"notification","data":{"message":"hi"}}"#).await;
        assert_eq!(router.dispatch(r#"{"message_type":"pong"}"#).await, Some(EventKind::Pong));

        assert_eq!(*seen.read(), vec![("notification".to_string(), 1)]);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
