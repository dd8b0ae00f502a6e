//! Application state shared by every view

use crate::api::Api;
use crate::backend::{Backend, HttpBackend, MemoryBackend};
use crate::config::{CollectionConfig, Config, QueryConfig};
use crate::domain::Post;
use crate::error::BackendResult;
use crate::forms::Submissions;
use crate::notify::Notifier;
use crate::services::{AuthStore, Feed, PostStats, Queries};
use cache_invalidation::{InvalidationPublisher, InvalidationSubscriber};
use prometheus::Registry;
use query_cache::{CacheMetrics, QueryCache};
use std::sync::Arc;
use tracing::info;

const PUBLISHER_SOURCE: &str = "snapgram-client";

#[derive(Clone)]
pub struct App {
    pub queries: Queries,
    pub auth: AuthStore,
    pub forms: Submissions,
    pub notifier: Arc<dyn Notifier>,
}

impl App {
    pub fn new(
        backend: Arc<dyn Backend>,
        collections: CollectionConfig,
        query: &QueryConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let api = Api::new(backend, collections, query);
        let cache = match query.stale_time() {
            Some(stale_time) => QueryCache::with_stale_time(stale_time),
            None => QueryCache::new(),
        };
        let queries = Queries::new(api, cache, InvalidationPublisher::new(PUBLISHER_SOURCE));
        let auth = AuthStore::new(queries.clone());
        let forms = Submissions::new(queries.clone(), auth.clone(), notifier.clone());

        Self {
            queries,
            auth,
            forms,
            notifier,
        }
    }

    /// Client against the hosted backend named in `config`
    pub fn connect(config: &Config, notifier: Arc<dyn Notifier>) -> BackendResult<Self> {
        let backend = HttpBackend::new(&config.backend, &config.collections)?;
        info!(
            endpoint = %config.backend.endpoint,
            project_id = %config.backend.project_id,
            "Using hosted backend"
        );
        Ok(Self::new(
            Arc::new(backend),
            config.collections.clone(),
            &config.query,
            notifier,
        ))
    }

    /// Client over an in-process backend with the local collection ids
    pub fn in_memory(backend: Arc<MemoryBackend>, notifier: Arc<dyn Notifier>) -> Self {
        Self::new(
            backend,
            CollectionConfig::local(),
            &QueryConfig::default(),
            notifier,
        )
    }

    pub fn api(&self) -> &Api {
        self.queries.api()
    }

    pub fn cache(&self) -> &QueryCache {
        self.queries.cache()
    }

    pub fn feed(&self) -> Feed {
        Feed::new(self.queries.clone())
    }

    /// Like/save controls of `post` for the signed-in user
    pub fn post_stats(&self, post: &Post) -> PostStats {
        PostStats::new(
            post,
            self.auth.current().user.id,
            self.queries.clone(),
            self.notifier.clone(),
        )
    }

    /// Invalidations published after each successful mutation
    pub fn invalidations(&self) -> InvalidationSubscriber {
        self.queries.publisher().subscribe()
    }

    pub fn register_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
        CacheMetrics::register(registry)
    }
}
