use super::{decode, logged, Api};
use crate::backend::{unique_id, Query};
use crate::domain::{NewUser, Session, User};
use crate::error::{BackendError, BackendResult};
use serde::Serialize;
use tracing::{error, info};

/// Profile document written right after an account is created
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUserDocument {
    pub account_id: String,
    pub name: String,
    pub email: String,
    pub username: String,
    pub image_url: String,
}

impl Api {
    /// Account, initials avatar, then the profile document
    pub async fn create_user_account(&self, user: &NewUser) -> Option<User> {
        let account = self
            .backend
            .create_account(&unique_id(), &user.email, &user.password, &user.name)
            .await;
        let account = logged("create_user_account", account)?;
        info!(account_id = %account.id, "Account created");

        let image_url = self.backend.initials_avatar_url(&user.name);
        self.save_user_to_db(&NewUserDocument {
            account_id: account.id,
            name: account.name,
            email: account.email,
            username: user.username.clone(),
            image_url,
        })
        .await
    }

    pub async fn save_user_to_db(&self, user: &NewUserDocument) -> Option<User> {
        let result: BackendResult<User> = async {
            let data = serde_json::to_value(user)?;
            let doc = self
                .backend
                .create_document(&self.collections.user_collection_id, &unique_id(), data)
                .await?;
            decode(doc)
        }
        .await;
        logged("save_user_to_db", result)
    }

    pub async fn sign_in_account(&self, email: &str, password: &str) -> Option<Session> {
        logged(
            "sign_in_account",
            self.backend.create_email_session(email, password).await,
        )
    }

    pub async fn sign_out_account(&self) -> Option<()> {
        logged(
            "sign_out_account",
            self.backend.delete_current_session().await,
        )
    }

    pub fn has_local_session(&self) -> bool {
        self.backend.has_local_session()
    }

    /// Profile document of the session holder
    pub async fn get_current_user(&self) -> Option<User> {
        let result: BackendResult<User> = async {
            let account = self.backend.get_account().await?;
            let list = self
                .backend
                .list_documents(
                    &self.collections.user_collection_id,
                    &[Query::equal("accountId", account.id.as_str())],
                )
                .await?
                .decode::<User>()?;
            list.documents.into_iter().next().ok_or_else(|| {
                BackendError::NotFound(format!("no profile for account {}", account.id))
            })
        }
        .await;

        match result {
            Ok(user) => Some(user),
            // No session is the normal signed-out state
            Err(BackendError::Unauthorized(message)) => {
                info!(reason = %message, "No current user");
                None
            }
            Err(e) => {
                error!(operation = "get_current_user", error = %e, "Backend call failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FailPoint, MemoryBackend};
    use crate::config::{CollectionConfig, QueryConfig};
    use std::sync::Arc;

    fn api() -> (Arc<MemoryBackend>, Api) {
        let backend = Arc::new(MemoryBackend::default());
        let api = Api::new(
            backend.clone(),
            CollectionConfig::local(),
            &QueryConfig::default(),
        );
        (backend, api)
    }

    fn ada() -> NewUser {
        NewUser {
            name: "Ada Lovelace".to_string(),
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            password: "password1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_sign_up_creates_profile_with_avatar() {
        let (_, api) = api();
        let user = api.create_user_account(&ada()).await.unwrap();

        assert_eq!(user.username, "ada");
        assert!(user.image_url.contains("avatars/initials?name=Ada%20Lovelace"));
        assert!(!user.account_id.is_empty());
    }

    #[tokio::test]
    async fn test_current_user_requires_session() {
        let (_, api) = api();
        let user = api.create_user_account(&ada()).await.unwrap();

        assert!(api.get_current_user().await.is_none());
        assert!(api.sign_in_account("ada@example.com", "password1").await.is_some());
        assert!(api.has_local_session());
        assert_eq!(api.get_current_user().await.unwrap().id, user.id);

        assert!(api.sign_out_account().await.is_some());
        assert!(api.get_current_user().await.is_none());
    }

    #[tokio::test]
    async fn test_failures_are_absent_results() {
        let (backend, api) = api();
        backend.fail(FailPoint::CreateAccount);
        assert!(api.create_user_account(&ada()).await.is_none());

        assert!(api.sign_in_account("nobody@example.com", "password1").await.is_none());
        assert!(api.sign_out_account().await.is_none());
    }
}
