use super::{decode, logged, Api};
use crate::backend::Query;
use crate::domain::{DocumentList, UpdateUser, User};
use crate::error::BackendResult;
use serde_json::json;
use tracing::{error, info};

impl Api {
    pub async fn get_user_by_id(&self, user_id: &str) -> Option<User> {
        let result: BackendResult<User> = async {
            let doc = self
                .backend
                .get_document(&self.collections.user_collection_id, user_id)
                .await?;
            decode(doc)
        }
        .await;
        logged("get_user_by_id", result)
    }

    /// Newest users first, optionally capped
    pub async fn get_all_users(&self, limit: Option<u32>) -> Option<DocumentList<User>> {
        let mut queries = vec![Query::order_desc("$createdAt")];
        if let Some(limit) = limit {
            queries.push(Query::limit(limit));
        }

        let result: BackendResult<DocumentList<User>> = async {
            let list = self
                .backend
                .list_documents(&self.collections.user_collection_id, &queries)
                .await?;
            Ok(list.decode()?)
        }
        .await;
        logged("get_all_users", result)
    }

    /// Update profile fields and optionally the avatar
    ///
    /// The previous avatar is deleted only when a new file replaced it and an
    /// old file id is known; a failed update removes the new upload instead.
    pub async fn update_user(&self, user: &UpdateUser) -> Option<User> {
        let replacement = match &user.file {
            Some(file) => {
                let uploaded = self.upload_file(file).await?;
                match self.get_file_preview(&uploaded.id) {
                    Some(url) => Some((uploaded.id, url)),
                    None => {
                        self.delete_file(&uploaded.id).await;
                        return None;
                    }
                }
            }
            None => None,
        };

        let (image_id, image_url) = match &replacement {
            Some((id, url)) => (Some(id.clone()), url.clone()),
            None => (user.image_id.clone(), user.image_url.clone()),
        };

        let data = json!({
            "name": user.name,
            "username": user.username,
            "bio": user.bio,
            "imageId": image_id,
            "imageUrl": image_url,
        });

        let result: BackendResult<User> = async {
            let doc = self
                .backend
                .update_document(&self.collections.user_collection_id, &user.user_id, data)
                .await?;
            decode(doc)
        }
        .await;

        match result {
            Ok(updated) => {
                if let (Some(_), Some(old_id)) = (&replacement, &user.image_id) {
                    self.delete_file(old_id).await;
                }
                info!(user_id = %updated.id, "Profile updated");
                Some(updated)
            }
            Err(e) => {
                error!(operation = "update_user", user_id = %user.user_id, error = %e, "Backend call failed");
                if let Some((new_id, _)) = replacement {
                    self.delete_file(&new_id).await;
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DatabaseApi, FailPoint, MemoryBackend, StorageApi};
    use crate::config::{CollectionConfig, QueryConfig};
    use crate::domain::FileUpload;
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

    fn update(file: Option<FileUpload>, image_id: Option<&str>) -> UpdateUser {
        UpdateUser {
            user_id: "u1".to_string(),
            name: "Ada L".to_string(),
            username: "ada".to_string(),
            bio: "math".to_string(),
            image_id: image_id.map(str::to_string),
            image_url: "http://img/old".to_string(),
            file,
        }
    }

    #[tokio::test]
    async fn test_update_user_replaces_avatar() {
        let (backend, api) = api();
        backend
            .create_document("users", "u1", json!({ "name": "Ada", "imageId": "old" }))
            .await
            .unwrap();
        backend
            .create_file("old", &FileUpload::infer("old.png", vec![1]))
            .await
            .unwrap();

        let updated = api
            .update_user(&update(Some(FileUpload::infer("new.png", vec![2])), Some("old")))
            .await
            .unwrap();

        assert_eq!(updated.name, "Ada L");
        assert_eq!(updated.bio.as_deref(), Some("math"));
        assert!(!backend.file_exists("old"));
        assert!(backend.file_exists(updated.image_id.as_deref().unwrap()));
    }

    #[tokio::test]
    async fn test_update_user_without_file_keeps_avatar() {
        let (backend, api) = api();
        backend
            .create_document("users", "u1", json!({ "name": "Ada", "imageId": "old" }))
            .await
            .unwrap();
        backend
            .create_file("old", &FileUpload::infer("old.png", vec![1]))
            .await
            .unwrap();

        let updated = api.update_user(&update(None, Some("old"))).await.unwrap();
        assert_eq!(updated.image_url, "http://img/old");
        assert!(backend.file_exists("old"));
    }

    #[tokio::test]
    async fn test_failed_update_removes_new_upload() {
        let (backend, api) = api();
        backend.fail(FailPoint::UpdateDocument);

        let result = api
            .update_user(&update(Some(FileUpload::infer("new.png", vec![2])), None))
            .await;
        assert!(result.is_none());
        assert_eq!(backend.file_count(), 0);
    }

    #[tokio::test]
    async fn test_all_users_newest_first() {
        let (backend, api) = api();
        for id in ["u1", "u2", "u3"] {
            backend
                .create_document("users", id, json!({ "name": id }))
                .await
                .unwrap();
        }

        let users = api.get_all_users(Some(2)).await.unwrap();
        let ids: Vec<_> = users.documents.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["u3", "u2"]);
        assert_eq!(users.total, 3);
        assert!(api.get_user_by_id("u9").await.is_none());
    }
}
