//! # nimbus_realtime
//!
//! Real-time layer of the Nimbus console: one persistent connection to the
//! backend's event stream, and the router that turns its frames into UI
//! state updates.
//!
//! ```text
//! ┌────────────┐  frames  ┌───────────────────┐  on_message  ┌─────────────┐
//! │  Connector │─────────▶│ ConnectionManager │─────────────▶│ EventRouter │
//! └────────────┘          └─────────┬─────────┘              └──────┬──────┘
//!                                   │ reconnect timer               │ agent_update
//!                                   ▼                               ▼
//!                             ┌──────────┐                 ┌──────────────────┐
//!                             │ UiState  │◀────────────────│ DashboardRefresher│
//!                             └──────────┘                 └──────────────────┘
//! ```

pub mod connection;
pub mod dashboard;
pub mod error;
pub mod events;
pub mod transport;

pub use connection::ConnectionManager;
pub use dashboard::{DashboardRefresher, PullDashboard};
pub use error::{RealtimeError, RealtimeResult};
pub use events::{EventHandler, EventKind, EventRouter, InboundEvent};
pub use transport::{Channel, Connector, MemoryConnector, ServerEnd, WsConnector};
