//! Home feed with cursor pagination
//!
//! The cursor for the next page is the id of the last post loaded. A page
//! with no posts ends the feed: no further page is requested and the end
//! marker is shown.

use super::Queries;
use crate::domain::Post;
use query_cache::{InfinitePages, QueryState};
use tracing::{debug, warn};

/// Text shown below the last page
pub const END_OF_POSTS: &str = "End of posts";

pub struct Feed {
    queries: Queries,
    state: QueryState<InfinitePages<Post>>,
}

impl Feed {
    pub fn new(queries: Queries) -> Self {
        Self {
            queries,
            state: QueryState::Idle,
        }
    }

    /// Load the feed, refetching every loaded page if it went stale
    pub async fn load(&mut self) -> &QueryState<InfinitePages<Post>> {
        let state = self.queries.infinite_posts().await;
        self.apply(state);
        &self.state
    }

    /// Request the next page; a no-op once the feed has ended
    pub async fn fetch_next_page(&mut self) -> &QueryState<InfinitePages<Post>> {
        if self.state.data().is_none() {
            return self.load().await;
        }
        if !self.has_next_page() {
            debug!("Feed already at its end");
            return &self.state;
        }

        let state = self.queries.next_posts_page().await;
        self.apply(state);
        &self.state
    }

    /// Loaded pages survive a failed page request
    fn apply(&mut self, state: QueryState<InfinitePages<Post>>) {
        match state {
            QueryState::Error(message) if self.state.data().is_some() => {
                warn!(error = %message, "Feed page request failed");
            }
            other => self.state = other,
        }
    }

    pub fn state(&self) -> &QueryState<InfinitePages<Post>> {
        &self.state
    }

    pub fn has_next_page(&self) -> bool {
        self.state
            .data()
            .map(InfinitePages::has_next_page)
            .unwrap_or(false)
    }

    pub fn pages(&self) -> &[Vec<Post>] {
        self.state
            .data()
            .map(|pages| pages.pages.as_slice())
            .unwrap_or(&[])
    }

    pub fn posts(&self) -> impl Iterator<Item = &Post> {
        self.pages().iter().flatten()
    }

    /// Nothing loaded yet; views show a loader
    pub fn is_loading(&self) -> bool {
        self.state.data().is_none() && !self.state.is_error()
    }

    /// Data is loaded and there is no further page
    pub fn is_end_of_posts(&self) -> bool {
        self.state.data().is_some() && !self.has_next_page()
    }

    /// Marker text when the feed has ended
    pub fn end_marker(&self) -> Option<&'static str> {
        self.is_end_of_posts().then_some(END_OF_POSTS)
    }
}
