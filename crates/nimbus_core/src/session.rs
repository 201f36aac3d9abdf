//! Client session store.
//!
//! Holds the two identities a console client has: the anonymous session id
//! that tags every chat turn, and the optional authenticated user. Both are
//! persisted through [`ClientStorage`] so a restart picks up where the last
//! run left off.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::api::ConsoleApi;
use crate::error::CoreResult;
use crate::storage::{ClientStorage, AUTH_TOKEN_KEY, SESSION_ID_KEY};
use crate::types::{Identity, LoginRequest, Session};
use crate::ui::UiHandle;

/// Persists and validates the client's identity.
pub struct SessionStore {
    api: Arc<dyn ConsoleApi>,
    storage: Arc<dyn ClientStorage>,
    ui: UiHandle,
    session: RwLock<Session>,
}

impl SessionStore {
    pub fn new(api: Arc<dyn ConsoleApi>, storage: Arc<dyn ClientStorage>, ui: UiHandle) -> Self {
        Self {
            api,
            storage,
            ui,
            session: RwLock::new(Session::default()),
        }
    }

    /// Restore a persisted auth token and validate it against `GET /auth/me`.
    ///
    /// Returns `true` when the client is authenticated afterwards. Any failure
    /// clears the token and leaves the client anonymous; nothing is raised.
    pub async fn restore(&self) -> bool {
        let Some(token) = self.storage.get(AUTH_TOKEN_KEY) else {
            debug!("No persisted auth token");
            self.clear_credentials();
            return false;
        };

        self.api.set_auth_token(Some(token.clone()));
        match self.api.current_user().await {
            Ok(user) => {
                info!("Restored session for {}", user.username);
                self.set_credentials(token, user);
                true
            }
            Err(e) => {
                warn!("Persisted auth token rejected: {}", e);
                if let Err(e) = self.storage.remove(AUTH_TOKEN_KEY) {
                    warn!("Failed to clear persisted auth token: {}", e);
                }
                self.clear_credentials();
                false
            }
        }
    }

    /// Authenticate with the backend and persist the returned token.
    pub async fn login(&self, username: &str, password: &str) -> CoreResult<Identity> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = self.api.login(&request).await?;

        self.api.set_auth_token(Some(response.access_token.clone()));
        let user = match response.user {
            Some(user) => user,
            None => match self.api.current_user().await {
                Ok(user) => user,
                Err(e) => {
                    self.api.set_auth_token(None);
                    return Err(e);
                }
            },
        };

        if let Err(e) = self.storage.set(AUTH_TOKEN_KEY, &response.access_token) {
            self.api.set_auth_token(None);
            return Err(e);
        }
        info!("Logged in as {}", user.username);
        self.set_credentials(response.access_token, user.clone());
        Ok(user)
    }

    /// Drop credentials locally. The anonymous session id is kept.
    pub fn logout(&self) -> CoreResult<()> {
        self.clear_credentials();
        self.storage.remove(AUTH_TOKEN_KEY)
    }

    /// The stable anonymous session id, created and persisted on first use.
    pub fn session_id(&self) -> String {
        if let Some(id) = self.cached_session_id() {
            return id;
        }

        let id = match self.storage.get(SESSION_ID_KEY) {
            Some(id) if !id.is_empty() => id,
            _ => {
                let id = uuid::Uuid::new_v4().to_string();
                if let Err(e) = self.storage.set(SESSION_ID_KEY, &id) {
                    warn!("Failed to persist session id: {}", e);
                }
                id
            }
        };

        self.session.write().session_id = id.clone();
        id
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.read().is_authenticated()
    }

    pub fn user(&self) -> Option<Identity> {
        self.session.read().user.clone()
    }

    /// Snapshot of the current session, including the session id.
    pub fn session(&self) -> Session {
        self.session_id();
        self.session.read().clone()
    }

    fn cached_session_id(&self) -> Option<String> {
        let session = self.session.read();
        (!session.session_id.is_empty()).then(|| session.session_id.clone())
    }

    fn set_credentials(&self, token: String, user: Identity) {
        {
            let mut session = self.session.write();
            session.auth_token = Some(token);
            session.user = Some(user.clone());
        }
        self.ui.set_user(Some(user));
    }

    fn clear_credentials(&self) {
        {
            let mut session = self.session.write();
            session.auth_token = None;
            session.user = None;
        }
        self.api.set_auth_token(None);
        self.ui.set_user(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::mock::{MockApi, MockReply};
    use crate::storage::{MemoryStorage, MockClientStorage};
    use serde_json::json;

    fn identity(name: &str) -> Identity {
        Identity {
            id: Some(json!(1)),
            username: name.to_string(),
            email: None,
            full_name: None,
            roles: vec!["admin".to_string()],
        }
    }

    #[tokio::test]
    async fn test_restore_without_token() {
        let api = MockApi::new();
        let store = SessionStore::new(Arc::new(api.clone()), Arc::new(MemoryStorage::new()), UiHandle::new());

        assert!(!store.restore().await);
        assert_eq!(api.call_count(), 0);
    }

    #[tokio::test]
    async fn test_session_id_is_stable_and_persisted() {
        let storage = MemoryStorage::new();
        let api: Arc<dyn ConsoleApi> = Arc::new(MockApi::new());

        let first = SessionStore::new(api.clone(), Arc::new(storage.clone()), UiHandle::new());
        let id = first.session_id();
        assert_eq!(first.session_id(), id);

        let reloaded = SessionStore::new(api, Arc::new(storage.clone()), UiHandle::new());
        assert_eq!(reloaded.session_id(), id);
        assert_eq!(storage.get(SESSION_ID_KEY), Some(id));
    }

    #[tokio::test]
    async fn test_login_uses_identity_from_response() {
        let api = MockApi::new().respond(
            "POST /auth/login",
            MockReply::ok(json!({"access_token": "tok-1", "user": {"username": "ops"}})),
        );
        let storage = MemoryStorage::new();
        let ui = UiHandle::new();
        let store = SessionStore::new(Arc::new(api.clone()), Arc::new(storage.clone()), ui.clone());

        let user = store.login("ops", "secret").await.unwrap();
        assert_eq!(user.username, "ops");
        assert!(store.is_authenticated());
        assert!(ui.snapshot().is_logged_in());
        assert_eq!(storage.get(AUTH_TOKEN_KEY).as_deref(), Some("tok-1"));
        assert!(!api.was_called("GET /auth/me"));
    }

    #[tokio::test]
    async fn test_failed_login_persists_nothing() {
        let api = MockApi::new().respond("POST /auth/login", MockReply::error(401, "Incorrect username or password"));
        let storage = MemoryStorage::new();
        let store = SessionStore::new(Arc::new(api), Arc::new(storage.clone()), UiHandle::new());

        let err = store.login("ops", "wrong").await.unwrap_err();
        assert!(err.is_auth());
        assert!(storage.get(AUTH_TOKEN_KEY).is_none());
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_keeps_session_id() {
        let storage = MemoryStorage::new().with_entry(AUTH_TOKEN_KEY, "tok");
        let api = MockApi::new().accept_token("tok", identity("ops"));
        let store = SessionStore::new(Arc::new(api.clone()), Arc::new(storage.clone()), UiHandle::new());

        assert!(store.restore().await);
        let id = store.session_id();
        store.logout().unwrap();

        assert!(!store.is_authenticated());
        assert!(storage.get(AUTH_TOKEN_KEY).is_none());
        assert!(api.current_token().is_none());
        assert_eq!(store.session_id(), id);
    }

    #[tokio::test]
    async fn test_restore_survives_storage_failure() {
        let mut storage = MockClientStorage::new();
        storage
            .expect_get()
            .returning(|key| (key == AUTH_TOKEN_KEY).then(|| "stale".to_string()));
        storage
            .expect_remove()
            .returning(|_| Err(CoreError::Storage("read-only".to_string())));

        let store = SessionStore::new(Arc::new(MockApi::new()), Arc::new(storage), UiHandle::new());
        assert!(!store.restore().await);
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_rolls_back_token_when_persisting_fails() {
        let api = MockApi::new().respond(
            "POST /auth/login",
            MockReply::ok(json!({"access_token": "tok-1", "user": {"username": "ops"}})),
        );
        let mut storage = MockClientStorage::new();
        storage.expect_get().returning(|_| None);
        storage
            .expect_set()
            .returning(|_, _| Err(CoreError::Storage("disk full".to_string())));
        let ui = UiHandle::new();
        let store = SessionStore::new(Arc::new(api.clone()), Arc::new(storage), ui.clone());

        let err = store.login("ops", "secret").await.unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
        assert!(!store.is_authenticated());
        assert!(!ui.snapshot().is_logged_in());
        assert!(api.current_token().is_none());
    }
}
