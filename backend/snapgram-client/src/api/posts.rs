use super::{decode, logged, Api};
use crate::backend::{unique_id, Query};
use crate::domain::{parse_tags, DocumentList, FileUpload, NewPost, Post, SaveRecord, UpdatePost};
use crate::error::BackendResult;
use serde_json::{json, Value};
use tracing::{error, info, warn};

impl Api {
    async fn list_posts(&self, queries: &[Query]) -> BackendResult<DocumentList<Post>> {
        self.backend
            .list_documents(&self.collections.post_collection_id, queries)
            .await?
            .decode()
            .map_err(Into::into)
    }

    async fn write_post(&self, id: Option<&str>, data: Value) -> BackendResult<Post> {
        let collection = &self.collections.post_collection_id;
        let doc = match id {
            Some(id) => self.backend.update_document(collection, id, data).await?,
            None => {
                self.backend
                    .create_document(collection, &unique_id(), data)
                    .await?
            }
        };
        decode(doc)
    }

    /// Upload a replacement image and resolve its URL; the upload is removed
    /// again if no URL can be derived
    async fn upload_with_url(&self, file: &FileUpload) -> Option<(String, String)> {
        let uploaded = self.upload_file(file).await?;
        match self.get_file_preview(&uploaded.id) {
            Some(url) => Some((uploaded.id, url)),
            None => {
                self.delete_file(&uploaded.id).await;
                None
            }
        }
    }

    /// Upload, preview URL, then the post document
    ///
    /// The upload is deleted again when a later step fails.
    pub async fn create_post(&self, post: &NewPost) -> Option<Post> {
        let (image_id, image_url) = self.upload_with_url(&post.file).await?;

        let data = json!({
            "creator": post.user_id,
            "caption": post.caption,
            "imageUrl": image_url,
            "imageId": image_id,
            "tags": parse_tags(&post.tags),
            "location": post.location,
        });

        match self.write_post(None, data).await {
            Ok(created) => {
                info!(post_id = %created.id, creator = %post.user_id, "Post created");
                Some(created)
            }
            Err(e) => {
                error!(operation = "create_post", error = %e, "Backend call failed");
                self.delete_file(&image_id).await;
                None
            }
        }
    }

    /// Update caption, tags, location and optionally the image
    ///
    /// A failed update removes the new upload and leaves the current image in
    /// place. The old image is deleted only after it was replaced.
    pub async fn update_post(&self, post: &UpdatePost) -> Option<Post> {
        let replacement = match &post.file {
            Some(file) => Some(self.upload_with_url(file).await?),
            None => None,
        };
        let (image_id, image_url) = replacement
            .clone()
            .unwrap_or_else(|| (post.image_id.clone(), post.image_url.clone()));

        let data = json!({
            "caption": post.caption,
            "imageUrl": image_url,
            "imageId": image_id,
            "tags": parse_tags(&post.tags),
            "location": post.location,
        });

        match self.write_post(Some(&post.post_id), data).await {
            Ok(updated) => {
                if replacement.is_some() && !post.image_id.is_empty() {
                    self.delete_file(&post.image_id).await;
                }
                Some(updated)
            }
            Err(e) => {
                error!(operation = "update_post", post_id = %post.post_id, error = %e, "Backend call failed");
                if let Some((new_id, _)) = replacement {
                    self.delete_file(&new_id).await;
                }
                None
            }
        }
    }

    /// Delete the document, then its image
    pub async fn delete_post(&self, post_id: &str, image_id: &str) -> Option<()> {
        if post_id.is_empty() || image_id.is_empty() {
            warn!(post_id, image_id, "delete_post called without ids");
            return None;
        }

        let result = self
            .backend
            .delete_document(&self.collections.post_collection_id, post_id)
            .await;
        logged("delete_post", result)?;

        // A leftover image does not undo the deletion
        self.delete_file(image_id).await;
        info!(post_id, "Post deleted");
        Some(())
    }

    pub async fn get_post_by_id(&self, post_id: &str) -> Option<Post> {
        let result: BackendResult<Post> = async {
            let doc = self
                .backend
                .get_document(&self.collections.post_collection_id, post_id)
                .await?;
            decode(doc)
        }
        .await;
        logged("get_post_by_id", result)
    }

    /// Latest posts, newest first
    pub async fn get_recent_posts(&self) -> Option<DocumentList<Post>> {
        let queries = [
            Query::order_desc("$createdAt"),
            Query::limit(self.recent_posts_limit),
        ];
        logged("get_recent_posts", self.list_posts(&queries).await)
    }

    /// One page of the home feed, most recently updated first
    pub async fn get_infinite_posts(&self, cursor: Option<&str>) -> Option<DocumentList<Post>> {
        let mut queries = vec![
            Query::order_desc("$updatedAt"),
            Query::limit(self.feed_page_size),
        ];
        if let Some(cursor) = cursor {
            queries.push(Query::cursor_after(cursor));
        }
        logged("get_infinite_posts", self.list_posts(&queries).await)
    }

    pub async fn search_posts(&self, term: &str) -> Option<DocumentList<Post>> {
        let queries = [Query::search("caption", term)];
        logged("search_posts", self.list_posts(&queries).await)
    }

    pub async fn get_user_posts(&self, user_id: &str) -> Option<DocumentList<Post>> {
        let queries = [
            Query::equal("creator", user_id),
            Query::order_desc("$createdAt"),
        ];
        logged("get_user_posts", self.list_posts(&queries).await)
    }

    /// Replace the post's like-list with `likes`
    pub async fn like_post(&self, post_id: &str, likes: &[String]) -> Option<Post> {
        let result = self
            .write_post(Some(post_id), json!({ "likes": likes }))
            .await;
        logged("like_post", result)
    }

    /// Create the bookmark join record
    pub async fn save_post(&self, post_id: &str, user_id: &str) -> Option<SaveRecord> {
        let result: BackendResult<SaveRecord> = async {
            let doc = self
                .backend
                .create_document(
                    &self.collections.saves_collection_id,
                    &unique_id(),
                    json!({ "user": user_id, "post": post_id }),
                )
                .await?;
            decode(doc)
        }
        .await;
        logged("save_post", result)
    }

    /// Delete a bookmark join record by its id
    pub async fn unsave_post(&self, save_id: &str) -> Option<()> {
        let result = self
            .backend
            .delete_document(&self.collections.saves_collection_id, save_id)
            .await;
        logged("unsave_post", result)
    }
}
