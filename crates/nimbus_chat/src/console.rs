//! Console context.
//!
//! One `ConsoleContext` per client. It owns every component, wires the
//! connection into the event router on `init()` and tears it all down on
//! `dispose()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nimbus_core::{
    ChatTurn, ClientStorage, ConsoleApi, ConsoleConfig, FileStorage, HttpApi, SessionStore, UiHandle,
    UiState,
};
use nimbus_realtime::{
    ConnectionManager, Connector, DashboardRefresher, EventRouter, PullDashboard, WsConnector,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ChatError, ChatResult};
use crate::pipeline::{ChatEndpoint, ChatPipeline};
use crate::rules::StepId;
use crate::wizard::RequirementsWizard;

/// What `send_chat` did with a message.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatOutcome {
    /// Blank input; nothing happened
    Ignored,
    /// The message was an infrastructure request and opened the wizard
    WizardOpened(Vec<StepId>),
    /// The message went to the backend; carries the reply or error turn
    Replied(ChatTurn),
}

/// Owns the console's components for the lifetime of one client.
pub struct ConsoleContext {
    config: ConsoleConfig,
    api: Arc<dyn ConsoleApi>,
    session: Arc<SessionStore>,
    ui: UiHandle,
    connection: ConnectionManager,
    dashboard: Arc<PullDashboard>,
    router: Arc<EventRouter>,
    chat: Arc<ChatPipeline>,
    wizard: RequirementsWizard,
    router_task: Mutex<Option<JoinHandle<()>>>,
    initialized: AtomicBool,
}

impl ConsoleContext {
    pub fn new(
        config: ConsoleConfig,
        api: Arc<dyn ConsoleApi>,
        storage: Arc<dyn ClientStorage>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let ui = UiHandle::new();
        let session = Arc::new(SessionStore::new(api.clone(), storage, ui.clone()));
        let connection = ConnectionManager::new(
            config.ws_url.clone(),
            config.reconnect_delay(),
            connector,
            ui.clone(),
        );
        let dashboard = Arc::new(PullDashboard::new(api.clone(), ui.clone()));
        let router = Arc::new(EventRouter::new(ui.clone(), dashboard.clone()));
        let chat = Arc::new(ChatPipeline::new(api.clone(), session.clone(), ui.clone()));
        let wizard = RequirementsWizard::new(ui.clone());

        Self {
            config,
            api,
            session,
            ui,
            connection,
            dashboard,
            router,
            chat,
            wizard,
            router_task: Mutex::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    /// Production wiring: HTTP API, file storage and a WebSocket connector.
    pub fn from_config(config: ConsoleConfig) -> ChatResult<Self> {
        let api = Arc::new(HttpApi::new(&config)?);
        let storage = Arc::new(FileStorage::open(&config.storage_path));
        Ok(Self::new(config, api, storage, Arc::new(WsConnector)))
    }

    /// Route conversational turns to another endpoint. Call before `init()`.
    pub fn with_chat_endpoint(mut self, endpoint: ChatEndpoint) -> Self {
        self.chat = Arc::new(
            ChatPipeline::new(self.api.clone(), self.session.clone(), self.ui.clone()).with_endpoint(endpoint),
        );
        self
    }

    /// Boot the console: restore the session, start routing events and open
    /// the event stream. Returns whether the client is authenticated.
    ///
    /// A failed connect is not an error here; the connection keeps retrying
    /// in the background. Calling `init()` again has no effect.
    pub async fn init(&self) -> bool {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("Console already initialized");
            return self.session.is_authenticated();
        }

        let authenticated = self.session.restore().await;

        let (tx, rx) = mpsc::unbounded_channel();
        self.connection.on_message(move |frame| {
            let _ = tx.send(frame.to_string());
        });
        *self.router_task.lock() = Some(tokio::spawn(self.router.clone().run(rx)));

        if self.chat.endpoint() == ChatEndpoint::Legacy {
            if let Err(e) = self.api.initialize().await {
                warn!("Chat backend initialization failed: {}", e);
            }
        }

        if let Err(e) = self.connection.connect().await {
            warn!("Event stream unavailable, retrying in background: {}", e);
        }

        info!(
            "Console ready (session {}, authenticated: {})",
            self.session.session_id(),
            authenticated
        );
        authenticated
    }

    /// Send a chat message from the user.
    ///
    /// Infrastructure requests open the requirements wizard instead of going
    /// to the backend. Refused while the wizard is open.
    pub async fn send_chat(&self, text: &str) -> ChatResult<ChatOutcome> {
        if self.wizard.is_open() {
            return Err(ChatError::InputDisabled);
        }

        let message = text.trim();
        if message.is_empty() {
            return Ok(ChatOutcome::Ignored);
        }

        if self.wizard.is_trigger(message) {
            self.ui.push_turn(ChatTurn::user(message));
            self.ui.update(|ui| ui.chat_input.clear());
            let steps = self.wizard.open(message);
            self.ui.push_turn(ChatTurn::assistant(
                "Let's capture your requirements before designing this. Fill in the wizard steps and submit.",
            ));
            return Ok(ChatOutcome::WizardOpened(steps));
        }

        Ok(match self.chat.submit(message).await {
            Some(turn) => ChatOutcome::Replied(turn),
            None => ChatOutcome::Ignored,
        })
    }

    /// Submit the open wizard through the chat pipeline.
    pub async fn submit_wizard(&self) -> ChatResult<Option<ChatTurn>> {
        self.wizard.submit(&self.chat).await
    }

    /// Pull platform status and agents into the dashboard now.
    pub async fn refresh_dashboard(&self) -> ChatResult<()> {
        Ok(self.dashboard.refresh_dashboard().await?)
    }

    /// Stop reconnecting, close the event stream and stop the router.
    pub fn dispose(&self) {
        self.connection.dispose();
        if let Some(task) = self.router_task.lock().take() {
            task.abort();
        }
        info!("Console disposed");
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn api(&self) -> &Arc<dyn ConsoleApi> {
        &self.api
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn ui(&self) -> &UiHandle {
        &self.ui
    }

    pub fn snapshot(&self) -> UiState {
        self.ui.snapshot()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn chat(&self) -> &ChatPipeline {
        &self.chat
    }

    pub fn wizard(&self) -> &RequirementsWizard {
        &self.wizard
    }
}

impl Drop for ConsoleContext {
    fn drop(&mut self) {
        if let Some(task) = self.router_task.get_mut().take() {
            task.abort();
        }
    }
}
