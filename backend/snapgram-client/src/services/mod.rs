pub mod auth;
pub mod feed;
pub mod post_stats;
pub mod queries;

pub use auth::{AuthBootstrap, AuthState, AuthStore, AuthUser};
pub use feed::{Feed, END_OF_POSTS};
pub use post_stats::{PostStats, ToggleOutcome};
pub use queries::Queries;
