//! Mutation → invalidation dependency graph
//!
//! Each successful mutation is looked up here and the returned key patterns
//! are marked stale before control returns to the caller.

use crate::{KeyPattern, QueryScope};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of writes the client issues against the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MutationKind {
    CreateAccount,
    SignIn,
    SignOut,
    CreatePost { creator: String },
    UpdatePost { post: String },
    DeletePost { post: String, creator: String },
    LikePost { post: String },
    SavePost,
    UnsavePost,
    UpdateUser { user: String },
}

impl MutationKind {
    pub fn name(&self) -> &'static str {
        match self {
            MutationKind::CreateAccount => "create_account",
            MutationKind::SignIn => "sign_in",
            MutationKind::SignOut => "sign_out",
            MutationKind::CreatePost { .. } => "create_post",
            MutationKind::UpdatePost { .. } => "update_post",
            MutationKind::DeletePost { .. } => "delete_post",
            MutationKind::LikePost { .. } => "like_post",
            MutationKind::SavePost => "save_post",
            MutationKind::UnsavePost => "unsave_post",
            MutationKind::UpdateUser { .. } => "update_user",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Explicit dependency graph from mutation kind to stale key patterns
#[derive(Debug, Clone, Default)]
pub struct InvalidationGraph;

impl InvalidationGraph {
    pub fn new() -> Self {
        Self
    }

    pub fn patterns_for(&self, kind: &MutationKind) -> Vec<KeyPattern> {
        use QueryScope::*;

        match kind {
            // Session changes swap whose data every cached read belongs to
            MutationKind::SignIn | MutationKind::SignOut => vec![KeyPattern::All],
            MutationKind::CreateAccount => vec![KeyPattern::scope(Users)],
            MutationKind::CreatePost { creator } => vec![
                KeyPattern::scope(RecentPosts),
                KeyPattern::scope(InfinitePosts),
                KeyPattern::exact(UserPosts, creator.as_str()),
            ],
            MutationKind::UpdatePost { post } => vec![
                KeyPattern::exact(PostById, post.as_str()),
                KeyPattern::scope(RecentPosts),
                KeyPattern::scope(InfinitePosts),
            ],
            MutationKind::DeletePost { post, creator } => vec![
                KeyPattern::exact(PostById, post.as_str()),
                KeyPattern::scope(RecentPosts),
                KeyPattern::scope(InfinitePosts),
                KeyPattern::exact(UserPosts, creator.as_str()),
            ],
            MutationKind::LikePost { post } => vec![
                KeyPattern::exact(PostById, post.as_str()),
                KeyPattern::scope(RecentPosts),
                KeyPattern::scope(CurrentUser),
                KeyPattern::scope(Posts),
                KeyPattern::scope(InfinitePosts),
            ],
            MutationKind::SavePost | MutationKind::UnsavePost => vec![
                KeyPattern::scope(RecentPosts),
                KeyPattern::scope(CurrentUser),
                KeyPattern::scope(Posts),
                KeyPattern::scope(InfinitePosts),
            ],
            MutationKind::UpdateUser { user } => vec![
                KeyPattern::scope(CurrentUser),
                KeyPattern::exact(UserById, user.as_str()),
                KeyPattern::scope(Users),
            ],
        }
    }
}
