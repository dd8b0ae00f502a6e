/// Configuration management for the Snapgram client
///
/// Loads configuration from environment variables.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Hosted backend endpoint
    pub backend: BackendConfig,
    /// Database, bucket and collection identifiers
    pub collections: CollectionConfig,
    /// Query layer tuning
    pub query: QueryConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Emit JSON logs instead of human-readable ones
    pub log_json: bool,
}

/// Hosted backend endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// API root, e.g. https://cloud.appwrite.io/v1
    pub endpoint: String,
    /// Project identifier sent with every request
    pub project_id: String,
    /// Fallback session cookie saved by an earlier run
    #[serde(default)]
    pub session: Option<String>,
}

/// Identifiers of the database objects the client reads and writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub database_id: String,
    pub storage_id: String,
    pub user_collection_id: String,
    pub post_collection_id: String,
    pub saves_collection_id: String,
}

/// Query layer tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Posts per home feed page
    #[serde(default = "default_feed_page_size")]
    pub feed_page_size: u32,
    /// Posts in the recent-posts list
    #[serde(default = "default_recent_posts_limit")]
    pub recent_posts_limit: u32,
    /// Seconds before a cached read goes stale on its own; unset means
    /// only invalidation marks reads stale
    pub stale_secs: Option<u64>,
}

// Default values
fn default_feed_page_size() -> u32 {
    3
}

fn default_recent_posts_limit() -> u32 {
    10
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            feed_page_size: default_feed_page_size(),
            recent_posts_limit: default_recent_posts_limit(),
            stale_secs: None,
        }
    }
}

impl QueryConfig {
    pub fn stale_time(&self) -> Option<Duration> {
        self.stale_secs.map(Duration::from_secs)
    }
}

impl CollectionConfig {
    /// Identifiers used by the in-memory backend and tests
    pub fn local() -> Self {
        Self {
            database_id: "snapgram".to_string(),
            storage_id: "media".to_string(),
            user_collection_id: "users".to_string(),
            post_collection_id: "posts".to_string(),
            saves_collection_id: "saves".to_string(),
        }
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{} environment variable not set", name))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            log_json: std::env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        };

        let backend = BackendConfig {
            endpoint: std::env::var("APPWRITE_URL")
                .unwrap_or_else(|_| "https://cloud.appwrite.io/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            project_id: required("APPWRITE_PROJECT_ID")?,
            session: std::env::var("APPWRITE_SESSION")
                .ok()
                .filter(|s| !s.is_empty()),
        };

        let collections = CollectionConfig {
            database_id: required("APPWRITE_DATABASE_ID")?,
            storage_id: required("APPWRITE_STORAGE_ID")?,
            user_collection_id: required("APPWRITE_USER_COLLECTION_ID")?,
            post_collection_id: required("APPWRITE_POST_COLLECTION_ID")?,
            saves_collection_id: required("APPWRITE_SAVES_COLLECTION_ID")?,
        };

        let query = QueryConfig {
            feed_page_size: std::env::var("FEED_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or_else(default_feed_page_size),
            recent_posts_limit: std::env::var("RECENT_POSTS_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or_else(default_recent_posts_limit),
            stale_secs: std::env::var("QUERY_STALE_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
        };

        Ok(Config {
            app,
            backend,
            collections,
            query,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const REQUIRED: [(&str, &str); 6] = [
        ("APPWRITE_PROJECT_ID", "proj"),
        ("APPWRITE_DATABASE_ID", "db"),
        ("APPWRITE_STORAGE_ID", "bucket"),
        ("APPWRITE_USER_COLLECTION_ID", "users"),
        ("APPWRITE_POST_COLLECTION_ID", "posts"),
        ("APPWRITE_SAVES_COLLECTION_ID", "saves"),
    ];

    fn set_required() {
        for (name, value) in REQUIRED {
            std::env::set_var(name, value);
        }
    }

    #[test]
    #[serial]
    fn test_default_values() {
        set_required();
        for name in [
            "APP_ENV",
            "APPWRITE_URL",
            "APPWRITE_SESSION",
            "LOG_FORMAT",
            "FEED_PAGE_SIZE",
            "RECENT_POSTS_LIMIT",
            "QUERY_STALE_SECS",
        ] {
            std::env::remove_var(name);
        }

        let config = Config::from_env().unwrap();

        assert_eq!(config.app.env, "development");
        assert!(!config.app.log_json);
        assert_eq!(config.backend.endpoint, "https://cloud.appwrite.io/v1");
        assert_eq!(config.backend.project_id, "proj");
        assert_eq!(config.backend.session, None);
        assert_eq!(config.collections.saves_collection_id, "saves");
        assert_eq!(config.query.feed_page_size, 3);
        assert_eq!(config.query.recent_posts_limit, 10);
        assert_eq!(config.query.stale_time(), None);
    }

    #[test]
    #[serial]
    fn test_overrides() {
        set_required();
        std::env::set_var("APPWRITE_URL", "http://localhost/v1/");
        std::env::set_var("FEED_PAGE_SIZE", "12");
        std::env::set_var("QUERY_STALE_SECS", "30");
        std::env::set_var("LOG_FORMAT", "JSON");

        let config = Config::from_env().unwrap();

        assert_eq!(config.backend.endpoint, "http://localhost/v1");
        assert_eq!(config.query.feed_page_size, 12);
        assert_eq!(config.query.stale_time(), Some(Duration::from_secs(30)));
        assert!(config.app.log_json);

        for name in ["APPWRITE_URL", "FEED_PAGE_SIZE", "QUERY_STALE_SECS", "LOG_FORMAT"] {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_missing_project_is_an_error() {
        set_required();
        std::env::remove_var("APPWRITE_PROJECT_ID");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("APPWRITE_PROJECT_ID"));
    }
}
