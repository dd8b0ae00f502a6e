//! Query key schema shared by the cache and the invalidation graph
//!
//! Key format: `{scope}` or `{scope}:{arg}` where scope is one of the
//! [`QueryScope`] names (e.g. `getPostById:6650c1f2`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every cached read belongs to exactly one scope
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum QueryScope {
    RecentPosts,
    PostById,
    CurrentUser,
    Posts,
    InfinitePosts,
    SearchPosts,
    UserPosts,
    UserById,
    Users,
}

impl QueryScope {
    pub const ALL: [QueryScope; 9] = [
        QueryScope::RecentPosts,
        QueryScope::PostById,
        QueryScope::CurrentUser,
        QueryScope::Posts,
        QueryScope::InfinitePosts,
        QueryScope::SearchPosts,
        QueryScope::UserPosts,
        QueryScope::UserById,
        QueryScope::Users,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryScope::RecentPosts => "getRecentPosts",
            QueryScope::PostById => "getPostById",
            QueryScope::CurrentUser => "getCurrentUser",
            QueryScope::Posts => "getPosts",
            QueryScope::InfinitePosts => "getInfinitePosts",
            QueryScope::SearchPosts => "searchPosts",
            QueryScope::UserPosts => "getUserPosts",
            QueryScope::UserById => "getUserById",
            QueryScope::Users => "getUsers",
        }
    }
}

impl fmt::Display for QueryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one cached read
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub scope: QueryScope,
    pub arg: Option<String>,
}

impl QueryKey {
    pub fn new(scope: QueryScope) -> Self {
        Self { scope, arg: None }
    }

    pub fn with_arg(scope: QueryScope, arg: impl Into<String>) -> Self {
        Self {
            scope,
            arg: Some(arg.into()),
        }
    }

    /// Prefix match: a pattern without an argument covers the whole scope
    pub fn matches(&self, pattern: &KeyPattern) -> bool {
        match pattern {
            KeyPattern::All => true,
            KeyPattern::Scope(scope) => self.scope == *scope,
            KeyPattern::Exact(key) => self == key,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{}:{}", self.scope, arg),
            None => write!(f, "{}", self.scope),
        }
    }
}

/// Selector over query keys used by invalidation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum KeyPattern {
    All,
    Scope(QueryScope),
    Exact(QueryKey),
}

impl KeyPattern {
    pub fn scope(scope: QueryScope) -> Self {
        KeyPattern::Scope(scope)
    }

    pub fn exact(scope: QueryScope, arg: impl Into<String>) -> Self {
        KeyPattern::Exact(QueryKey::with_arg(scope, arg))
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPattern::All => f.write_str("*"),
            KeyPattern::Scope(scope) => write!(f, "{}:*", scope),
            KeyPattern::Exact(key) => write!(f, "{}", key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_pattern_matches_every_arg() {
        let pattern = KeyPattern::scope(QueryScope::PostById);
        assert!(QueryKey::with_arg(QueryScope::PostById, "1").matches(&pattern));
        assert!(QueryKey::with_arg(QueryScope::PostById, "2").matches(&pattern));
        assert!(!QueryKey::with_arg(QueryScope::UserById, "1").matches(&pattern));
    }

    #[test]
    fn test_exact_pattern_matches_one_key() {
        let pattern = KeyPattern::exact(QueryScope::PostById, "1");
        assert!(QueryKey::with_arg(QueryScope::PostById, "1").matches(&pattern));
        assert!(!QueryKey::with_arg(QueryScope::PostById, "2").matches(&pattern));
        assert!(!QueryKey::new(QueryScope::PostById).matches(&pattern));
    }

    #[test]
    fn test_all_pattern() {
        for scope in QueryScope::ALL {
            assert!(QueryKey::new(scope).matches(&KeyPattern::All));
        }
    }

    #[test]
    fn test_key_display() {
        assert_eq!(QueryKey::with_arg(QueryScope::UserById, "123").to_string(), "getUserById:123");
        assert_eq!(QueryKey::new(QueryScope::Users).to_string(), "getUsers");
        assert_eq!(KeyPattern::scope(QueryScope::PostById).to_string(), "getPostById:*");
    }
}
