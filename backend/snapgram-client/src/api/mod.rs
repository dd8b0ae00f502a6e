//! API adapter
//!
//! Thin domain functions over the backend boundary. Every failure is logged
//! here and surfaces to callers only as `None`; nothing is retried.

mod accounts;
mod files;
mod posts;
mod users;

pub use accounts::NewUserDocument;

use crate::backend::Backend;
use crate::config::{CollectionConfig, QueryConfig};
use crate::error::{BackendError, BackendResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
pub struct Api {
    backend: Arc<dyn Backend>,
    collections: CollectionConfig,
    feed_page_size: u32,
    recent_posts_limit: u32,
}

impl Api {
    pub fn new(backend: Arc<dyn Backend>, collections: CollectionConfig, query: &QueryConfig) -> Self {
        Self {
            backend,
            collections,
            feed_page_size: query.feed_page_size,
            recent_posts_limit: query.recent_posts_limit,
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn collections(&self) -> &CollectionConfig {
        &self.collections
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> BackendResult<T> {
    serde_json::from_value(value).map_err(BackendError::from)
}

/// Log a failed backend call and turn it into an absent result
fn logged<T>(operation: &'static str, result: BackendResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!(operation, error = %e, "Backend call failed");
            None
        }
    }
}
