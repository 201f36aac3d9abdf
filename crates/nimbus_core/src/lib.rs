//! # nimbus_core
//!
//! Session, storage and backend API layer for the Nimbus console.
//!
//! This crate holds everything the real-time and chat layers build on:
//!
//! - **Config**: `ConsoleConfig` from `.nimbus/settings.toml` plus `NIMBUS_*` env vars
//! - **Storage**: durable client storage for the auth token and anonymous session id
//! - **Api**: the `ConsoleApi` seam, its `reqwest` implementation and a recording mock
//! - **Session**: `SessionStore`, which restores and validates identity without ever failing
//! - **Ui**: the shared `UiState` every component writes its visible effects into
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nimbus_core::{ConsoleConfig, FileStorage, HttpApi, SessionStore, UiHandle};
//!
//! # async fn run() -> nimbus_core::CoreResult<()> {
//! let config = ConsoleConfig::load(std::path::Path::new("."))?;
//! let api = Arc::new(HttpApi::new(&config)?);
//! let storage = Arc::new(FileStorage::open(&config.storage_path));
//! let session = SessionStore::new(api, storage, UiHandle::new());
//!
//! if !session.restore().await {
//!     session.login("ops", "secret").await?;
//! }
//! println!("session id: {}", session.session_id());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod mock;
pub mod session;
pub mod storage;
pub mod types;
pub mod ui;

pub use api::{error_from_body, AgentStage, ConsoleApi, HttpApi};
pub use config::{ConsoleConfig, MIN_RECONNECT_MS};
pub use error::{CoreError, CoreResult};
pub use mock::{CapturedCall, MockApi, MockReply};
pub use session::SessionStore;
pub use storage::{ClientStorage, FileStorage, MemoryStorage, AUTH_TOKEN_KEY, SESSION_ID_KEY};
pub use types::*;
pub use ui::{UiHandle, UiState};
