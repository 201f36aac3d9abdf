//! Dashboard refresh.
//!
//! Every `agent_update` triggers a full pull of platform status and the agent
//! list. The refresh sits behind [`DashboardRefresher`] so an incremental
//! implementation can replace it without touching event dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use nimbus_core::{ConsoleApi, DashboardSnapshot, UiHandle};
use tracing::debug;

use crate::error::RealtimeResult;

#[async_trait]
pub trait DashboardRefresher: Send + Sync {
    async fn refresh_dashboard(&self) -> RealtimeResult<()>;
}

/// Re-fetches `GET /platform/status` and `GET /agents/` on every refresh.
pub struct PullDashboard {
    api: Arc<dyn ConsoleApi>,
    ui: UiHandle,
}

impl PullDashboard {
    pub fn new(api: Arc<dyn ConsoleApi>, ui: UiHandle) -> Self {
        Self { api, ui }
    }
}

#[async_trait]
impl DashboardRefresher for PullDashboard {
    async fn refresh_dashboard(&self) -> RealtimeResult<()> {
        let (status, agents) = tokio::try_join!(self.api.platform_status(), self.api.list_agents())?;
        debug!("Dashboard refreshed: {} agents, status '{}'", agents.len(), status.status);

        let snapshot = DashboardSnapshot {
            status,
            agents,
            refreshed_at: Utc::now(),
        };
        self.ui.update(|ui| ui.dashboard = Some(snapshot));
        Ok(())
    }
}
