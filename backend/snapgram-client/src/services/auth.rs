//! Authentication state store
//!
//! Holds the signed-in user for the whole client. It is created once, passed
//! to whatever needs it, initialized at startup from the backend session,
//! reset on sign-out and re-checked after sign-in. Observers subscribe to a
//! watch channel instead of polling.

use super::Queries;
use crate::domain::User;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Profile fields the views need about the signed-in user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    pub image_url: String,
    pub bio: String,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            image_url: user.image_url.clone(),
            bio: user.bio.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub user: AuthUser,
    pub is_loading: bool,
    pub is_authenticated: bool,
}

/// Where startup should go next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthBootstrap {
    /// No session credential held locally
    RedirectToSignIn,
    Authenticated(AuthUser),
    /// A credential exists but the backend did not accept it
    Unauthenticated,
}

#[derive(Clone)]
pub struct AuthStore {
    queries: Queries,
    state: Arc<watch::Sender<AuthState>>,
}

impl AuthStore {
    pub fn new(queries: Queries) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            queries,
            state: Arc::new(state),
        }
    }

    /// Startup check against the backend session
    pub async fn initialize(&self) -> AuthBootstrap {
        if !self.queries.api().has_local_session() {
            info!("No local session, redirecting to sign-in");
            return AuthBootstrap::RedirectToSignIn;
        }

        if self.check_auth_user().await {
            AuthBootstrap::Authenticated(self.current().user)
        } else {
            AuthBootstrap::Unauthenticated
        }
    }

    /// Ask the backend who holds the session and store the answer
    pub async fn check_auth_user(&self) -> bool {
        self.state.send_modify(|s| s.is_loading = true);

        let user = self.queries.api().get_current_user().await;

        let authenticated = user.is_some();
        self.state.send_modify(|s| {
            if let Some(user) = &user {
                s.user = AuthUser::from(user);
                s.is_authenticated = true;
            }
            s.is_loading = false;
        });

        debug!(authenticated, "Checked auth user");
        authenticated
    }

    pub fn set_user(&self, user: AuthUser) {
        self.state.send_modify(|s| s.user = user);
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.state.send_modify(|s| s.is_authenticated = authenticated);
    }

    /// Teardown on sign-out
    pub fn reset(&self) {
        self.state.send_replace(AuthState::default());
    }

    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Api;
    use crate::backend::{FailPoint, MemoryBackend};
    use crate::config::{CollectionConfig, QueryConfig};
    use crate::domain::NewUser;
    use cache_invalidation::InvalidationPublisher;
    use query_cache::QueryCache;
    use std::sync::Arc;

    fn store() -> (Arc<MemoryBackend>, AuthStore) {
        let backend = Arc::new(MemoryBackend::default());
        let api = Api::new(
            backend.clone(),
            CollectionConfig::local(),
            &QueryConfig::default(),
        );
        let queries = Queries::new(api, QueryCache::new(), InvalidationPublisher::new("test"));
        (backend, AuthStore::new(queries))
    }

    async fn sign_up(store: &AuthStore) {
        store
            .queries
            .create_user_account(&NewUser {
                name: "Ada".to_string(),
                username: "ada".to_string(),
                email: "ada@example.com".to_string(),
                password: "password1".to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_session_redirects() {
        let (backend, store) = store();

        assert_eq!(store.initialize().await, AuthBootstrap::RedirectToSignIn);
        assert!(!store.current().is_authenticated);
        assert_eq!(backend.call_count(FailPoint::GetAccount), 0);
    }

    #[tokio::test]
    async fn test_session_authenticates() {
        let (_, store) = store();
        sign_up(&store).await;
        store
            .queries
            .sign_in_account("ada@example.com", "password1")
            .await
            .unwrap();

        let mut rx = store.subscribe();
        match store.initialize().await {
            AuthBootstrap::Authenticated(user) => assert_eq!(user.username, "ada"),
            other => panic!("unexpected bootstrap: {:?}", other),
        }

        assert!(rx.has_changed().unwrap());
        let state = rx.borrow_and_update().clone();
        assert!(state.is_authenticated);
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_rejected_session_is_unauthenticated() {
        let (backend, store) = store();
        sign_up(&store).await;
        store
            .queries
            .sign_in_account("ada@example.com", "password1")
            .await
            .unwrap();
        backend.fail(FailPoint::GetAccount);

        assert_eq!(store.initialize().await, AuthBootstrap::Unauthenticated);
        assert!(!store.current().is_loading);
    }

    #[test]
    fn test_reset_clears_user() {
        let (_, store) = store();
        store.set_user(AuthUser {
            id: "u1".to_string(),
            ..AuthUser::default()
        });
        store.set_authenticated(true);

        store.reset();
        assert_eq!(store.current(), AuthState::default());
    }
}
