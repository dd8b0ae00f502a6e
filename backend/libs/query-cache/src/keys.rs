//! Query key builders
//!
//! All reads must use these builders so that the invalidation graph and the
//! cache agree on key identity.
//! Key format: {scope}[:{arg}]

use cache_invalidation::{QueryKey, QueryScope};

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    // ============= Post Keys =============

    /// Latest posts list
    /// Format: getRecentPosts
    pub fn recent_posts() -> QueryKey {
        QueryKey::new(QueryScope::RecentPosts)
    }

    /// Single post detail
    /// Format: getPostById:{post_id}
    pub fn post_by_id(post_id: &str) -> QueryKey {
        QueryKey::with_arg(QueryScope::PostById, post_id)
    }

    /// Generic posts list
    pub fn posts() -> QueryKey {
        QueryKey::new(QueryScope::Posts)
    }

    /// Paginated home feed
    /// Format: getInfinitePosts
    pub fn infinite_posts() -> QueryKey {
        QueryKey::new(QueryScope::InfinitePosts)
    }

    /// Caption search results
    /// Format: searchPosts:{term}
    pub fn search_posts(term: &str) -> QueryKey {
        QueryKey::with_arg(QueryScope::SearchPosts, term)
    }

    /// Posts by one creator
    /// Format: getUserPosts:{user_id}
    pub fn user_posts(user_id: &str) -> QueryKey {
        QueryKey::with_arg(QueryScope::UserPosts, user_id)
    }

    // ============= User Keys =============

    /// Signed-in user record
    pub fn current_user() -> QueryKey {
        QueryKey::new(QueryScope::CurrentUser)
    }

    /// Profile by id
    /// Format: getUserById:{user_id}
    pub fn user_by_id(user_id: &str) -> QueryKey {
        QueryKey::with_arg(QueryScope::UserById, user_id)
    }

    /// All-users listing
    pub fn users() -> QueryKey {
        QueryKey::new(QueryScope::Users)
    }

    // ============= Utility =============

    /// Metrics label for a key
    pub fn label(key: &QueryKey) -> &'static str {
        key.scope.as_str()
    }
}
