//! Cached reads and invalidating mutations
//!
//! Reads go through the query cache under the keys built by [`CacheKey`].
//! A successful mutation evaluates the invalidation graph, marks the affected
//! entries stale before returning, then broadcasts the same patterns without
//! waiting on any listener. Failed mutations invalidate nothing.

use crate::api::Api;
use crate::domain::{DocumentList, NewPost, NewUser, Post, SaveRecord, Session, UpdatePost, UpdateUser, User};
use cache_invalidation::{InvalidationGraph, InvalidationPublisher, MutationKind};
use query_cache::{CacheKey, InfinitePages, QueryCache, QueryState};
use tracing::debug;

#[derive(Clone)]
pub struct Queries {
    api: Api,
    cache: QueryCache,
    graph: InvalidationGraph,
    publisher: InvalidationPublisher,
}

impl Queries {
    pub fn new(api: Api, cache: QueryCache, publisher: InvalidationPublisher) -> Self {
        Self {
            api,
            cache,
            graph: InvalidationGraph::new(),
            publisher,
        }
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn publisher(&self) -> &InvalidationPublisher {
        &self.publisher
    }

    /// Invalidate what `kind` affects; returns the number of entries marked stale
    fn settle(&self, kind: MutationKind) -> usize {
        let patterns = self.graph.patterns_for(&kind);
        let invalidated = self.cache.invalidate_all(&patterns);
        debug!(mutation = %kind, invalidated, "Mutation settled");
        self.publisher.invalidate(kind, patterns);
        invalidated
    }

    fn settle_on_success<T>(&self, result: Option<T>, kind: impl FnOnce(&T) -> MutationKind) -> Option<T> {
        if let Some(value) = &result {
            self.settle(kind(value));
        }
        result
    }

    // ============= Reads =============

    pub async fn recent_posts(&self) -> QueryState<DocumentList<Post>> {
        self.cache
            .fetch(CacheKey::recent_posts(), || self.api.get_recent_posts())
            .await
    }

    /// Idle until a post id is known
    pub async fn post_by_id(&self, post_id: &str) -> QueryState<Post> {
        if post_id.is_empty() {
            return QueryState::Idle;
        }
        self.cache
            .fetch(CacheKey::post_by_id(post_id), || self.api.get_post_by_id(post_id))
            .await
    }

    pub async fn user_posts(&self, user_id: &str) -> QueryState<DocumentList<Post>> {
        if user_id.is_empty() {
            return QueryState::Idle;
        }
        self.cache
            .fetch(CacheKey::user_posts(user_id), || self.api.get_user_posts(user_id))
            .await
    }

    /// Idle for an empty search term
    pub async fn search_posts(&self, term: &str) -> QueryState<DocumentList<Post>> {
        if term.is_empty() {
            return QueryState::Idle;
        }
        self.cache
            .fetch(CacheKey::search_posts(term), || self.api.search_posts(term))
            .await
    }

    pub async fn current_user(&self) -> QueryState<User> {
        self.cache
            .fetch(CacheKey::current_user(), || self.api.get_current_user())
            .await
    }

    pub async fn user_by_id(&self, user_id: &str) -> QueryState<User> {
        if user_id.is_empty() {
            return QueryState::Idle;
        }
        self.cache
            .fetch(CacheKey::user_by_id(user_id), || self.api.get_user_by_id(user_id))
            .await
    }

    pub async fn all_users(&self, limit: Option<u32>) -> QueryState<DocumentList<User>> {
        self.cache
            .fetch(CacheKey::users(), || self.api.get_all_users(limit))
            .await
    }

    /// Home feed with every page loaded so far
    pub async fn infinite_posts(&self) -> QueryState<InfinitePages<Post>> {
        let api = &self.api;
        self.cache
            .fetch_infinite(CacheKey::infinite_posts(), move |cursor: Option<String>| async move {
                api.get_infinite_posts(cursor.as_deref())
                    .await
                    .map(|page| page.documents)
            })
            .await
    }

    /// Append the next feed page; no request once the last page was empty
    pub async fn next_posts_page(&self) -> QueryState<InfinitePages<Post>> {
        let api = &self.api;
        self.cache
            .fetch_next_page(CacheKey::infinite_posts(), move |cursor: Option<String>| async move {
                api.get_infinite_posts(cursor.as_deref())
                    .await
                    .map(|page| page.documents)
            })
            .await
    }

    // ============= Mutations =============

    pub async fn create_user_account(&self, user: &NewUser) -> Option<User> {
        let result = self.api.create_user_account(user).await;
        self.settle_on_success(result, |_| MutationKind::CreateAccount)
    }

    pub async fn sign_in_account(&self, email: &str, password: &str) -> Option<Session> {
        let result = self.api.sign_in_account(email, password).await;
        self.settle_on_success(result, |_| MutationKind::SignIn)
    }

    pub async fn sign_out_account(&self) -> Option<()> {
        let result = self.api.sign_out_account().await;
        self.settle_on_success(result, |_| MutationKind::SignOut)
    }

    pub async fn create_post(&self, post: &NewPost) -> Option<Post> {
        let result = self.api.create_post(post).await;
        self.settle_on_success(result, |created| MutationKind::CreatePost {
            creator: created.creator.id.clone(),
        })
    }

    pub async fn update_post(&self, post: &UpdatePost) -> Option<Post> {
        let result = self.api.update_post(post).await;
        self.settle_on_success(result, |updated| MutationKind::UpdatePost {
            post: updated.id.clone(),
        })
    }

    pub async fn delete_post(&self, post: &Post) -> Option<()> {
        let result = self.api.delete_post(&post.id, &post.image_id).await;
        self.settle_on_success(result, |_| MutationKind::DeletePost {
            post: post.id.clone(),
            creator: post.creator.id.clone(),
        })
    }

    pub async fn like_post(&self, post_id: &str, likes: &[String]) -> Option<Post> {
        let result = self.api.like_post(post_id, likes).await;
        self.settle_on_success(result, |_| MutationKind::LikePost {
            post: post_id.to_string(),
        })
    }

    pub async fn save_post(&self, post_id: &str, user_id: &str) -> Option<SaveRecord> {
        let result = self.api.save_post(post_id, user_id).await;
        self.settle_on_success(result, |_| MutationKind::SavePost)
    }

    pub async fn unsave_post(&self, save_id: &str) -> Option<()> {
        let result = self.api.unsave_post(save_id).await;
        self.settle_on_success(result, |_| MutationKind::UnsavePost)
    }

    pub async fn update_user(&self, user: &UpdateUser) -> Option<User> {
        let result = self.api.update_user(user).await;
        self.settle_on_success(result, |updated| MutationKind::UpdateUser {
            user: updated.id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DatabaseApi, FailPoint, MemoryBackend};
    use crate::config::{CollectionConfig, QueryConfig};
    use serde_json::json;
    use std::sync::Arc;

    async fn setup() -> (Arc<MemoryBackend>, Queries) {
        let backend = Arc::new(MemoryBackend::default());
        backend
            .create_document("users", "u1", json!({ "name": "Ada", "username": "ada" }))
            .await
            .unwrap();
        backend
            .create_document("posts", "p1", json!({ "creator": "u1", "caption": "hi" }))
            .await
            .unwrap();

        let api = Api::new(
            backend.clone(),
            CollectionConfig::local(),
            &QueryConfig::default(),
        );
        let queries = Queries::new(api, QueryCache::new(), InvalidationPublisher::new("test"));
        (backend, queries)
    }

    #[tokio::test]
    async fn test_empty_ids_are_idle() {
        let (backend, queries) = setup().await;

        assert!(queries.post_by_id("").await.is_idle());
        assert!(queries.search_posts("").await.is_idle());
        assert!(queries.user_by_id("").await.is_idle());
        assert!(queries.user_posts("").await.is_idle());
        assert_eq!(backend.call_count(FailPoint::GetDocument), 0);
        assert_eq!(backend.call_count(FailPoint::ListDocuments), 0);
    }

    #[tokio::test]
    async fn test_reads_are_cached_until_a_like_invalidates_them() {
        let (backend, queries) = setup().await;

        queries.post_by_id("p1").await;
        queries.post_by_id("p1").await;
        assert_eq!(backend.call_count(FailPoint::GetDocument), 1);

        queries.like_post("p1", &["u1".to_string()]).await.unwrap();
        assert!(queries.cache().is_stale(&CacheKey::post_by_id("p1")));

        let post = queries.post_by_id("p1").await.into_data().unwrap();
        assert_eq!(post.likes, vec!["u1"]);
        assert_eq!(backend.call_count(FailPoint::GetDocument), 2);
    }

    #[tokio::test]
    async fn test_failed_mutation_invalidates_nothing() {
        let (backend, queries) = setup().await;
        queries.recent_posts().await;

        backend.fail(FailPoint::UpdateDocument);
        assert!(queries.like_post("p1", &["u1".to_string()]).await.is_none());
        assert!(!queries.cache().is_stale(&CacheKey::recent_posts()));
        assert_eq!(queries.publisher().stats().messages_published, 0);
    }

    #[tokio::test]
    async fn test_mutation_broadcasts_after_invalidating() {
        let (_, queries) = setup().await;
        let mut subscriber = queries.publisher().subscribe();

        queries.save_post("p1", "u1").await.unwrap();

        let msg = subscriber.recv().await.unwrap();
        assert_eq!(msg.mutation, MutationKind::SavePost);
        assert!(msg.covers(&CacheKey::current_user()));
    }

    #[tokio::test]
    async fn test_failed_read_is_error_state() {
        let (backend, queries) = setup().await;
        backend.fail(FailPoint::ListDocuments);

        assert!(queries.recent_posts().await.is_error());
    }
}
