//! Shared UI state.
//!
//! Every component writes its user-visible effects into one `UiState`. A
//! front end renders from `UiHandle::snapshot()`. The lock is never held
//! across an `.await`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::types::{
    ChatTurn, ConnectionState, DashboardSnapshot, Identity, Notification, NotificationLevel,
};

/// Notifications beyond this count are dropped oldest-first.
const MAX_NOTIFICATIONS: usize = 50;

/// Everything a front end needs to render the console.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiState {
    pub connection: ConnectionState,
    pub notifications: Vec<Notification>,
    pub dashboard: Option<DashboardSnapshot>,
    /// Latest `task_update` payload per task id
    pub tasks: BTreeMap<String, Value>,
    pub chat: Vec<ChatTurn>,
    pub chat_input: String,
    pub input_enabled: bool,
    pub loading: bool,
    pub wizard_open: bool,
    pub user: Option<Identity>,
    pub last_pong: Option<DateTime<Utc>>,
    pub welcome: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Closed,
            notifications: Vec::new(),
            dashboard: None,
            tasks: BTreeMap::new(),
            chat: Vec::new(),
            chat_input: String::new(),
            input_enabled: true,
            loading: false,
            wizard_open: false,
            user: None,
            last_pong: None,
            welcome: None,
        }
    }
}

impl UiState {
    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }
}

/// Cloneable handle to the shared UI state.
#[derive(Clone, Default)]
pub struct UiHandle {
    state: Arc<RwLock<UiState>>,
}

impl UiHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> UiState {
        self.state.read().clone()
    }

    /// Apply a mutation under the write lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut UiState) -> R) -> R {
        f(&mut self.state.write())
    }

    /// Read a value under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&UiState) -> R) -> R {
        f(&self.state.read())
    }

    pub fn notify(&self, level: NotificationLevel, message: impl Into<String>) {
        self.update(|ui| {
            ui.notifications.push(Notification::new(level, message));
            if ui.notifications.len() > MAX_NOTIFICATIONS {
                let overflow = ui.notifications.len() - MAX_NOTIFICATIONS;
                ui.notifications.drain(..overflow);
            }
        });
    }

    pub fn push_turn(&self, turn: ChatTurn) {
        self.update(|ui| ui.chat.push(turn));
    }

    pub fn set_loading(&self, loading: bool) {
        self.update(|ui| ui.loading = loading);
    }

    pub fn set_user(&self, user: Option<Identity>) {
        self.update(|ui| ui.user = user);
    }

    pub fn chat_len(&self) -> usize {
        self.read(|ui| ui.chat.len())
    }

    pub fn last_turn(&self) -> Option<ChatTurn> {
        self.read(|ui| ui.chat.last().cloned())
    }
}
