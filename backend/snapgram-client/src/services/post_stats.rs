//! Like and save toggles with optimistic display
//!
//! Every toggle changes what the viewer sees before any request is issued;
//! the authoritative write then runs on its own task. When it succeeds the
//! invalidation graph marks the dependent reads stale and the next read
//! corrects any divergence.
//!
//! Likes: each toggle computes the new like-list from the last local list and
//! sends the whole list. Toggles are neither serialized nor coalesced, so the
//! last write to reach the backend wins. A failed write restores the last
//! list the backend accepted unless a newer toggle has already replaced it.
//!
//! Saves: the toggle is disabled while a save or unsave is in flight. The id
//! of a confirmed save record is kept, so an unsave right after a save always
//! has a record to delete.

use super::Queries;
use crate::domain::{check_is_liked, toggle_like, Post, User};
use crate::notify::{Notice, Notifier};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const LIKE_FAILED: &str = "Failed to update like. Please try again.";
pub const SAVE_FAILED: &str = "Failed to save post. Please try again.";
pub const UNSAVE_FAILED: &str = "Failed to remove saved post. Please try again.";

/// How a spawned toggle write ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Confirmed,
    /// Write failed and the optimistic state was restored
    RolledBack,
    /// Write failed after a newer toggle replaced the state
    Superseded,
}

#[derive(Debug, Default)]
struct StatsState {
    likes: Vec<String>,
    /// Last like-list the backend accepted
    confirmed_likes: Vec<String>,
    /// Bumped by every like toggle
    like_version: u64,
    likes_in_flight: usize,
    saved: bool,
    /// Server-confirmed save record for this post and viewer
    save_record: Option<String>,
    save_in_flight: bool,
}

/// Like/save controls of one post for one viewer
#[derive(Clone)]
pub struct PostStats {
    post_id: String,
    user_id: String,
    queries: Queries,
    notifier: Arc<dyn Notifier>,
    state: Arc<Mutex<StatsState>>,
}

impl PostStats {
    pub fn new(
        post: &Post,
        user_id: impl Into<String>,
        queries: Queries,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            post_id: post.id.clone(),
            user_id: user_id.into(),
            queries,
            notifier,
            state: Arc::new(Mutex::new(StatsState {
                likes: post.likes.clone(),
                confirmed_likes: post.likes.clone(),
                ..StatsState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsState> {
        lock(&self.state)
    }

    // ============= View state =============

    pub fn likes(&self) -> Vec<String> {
        self.lock().likes.clone()
    }

    pub fn like_count(&self) -> usize {
        self.lock().likes.len()
    }

    pub fn is_liked(&self) -> bool {
        check_is_liked(&self.lock().likes, &self.user_id)
    }

    pub fn is_saved(&self) -> bool {
        self.lock().saved
    }

    /// Save toggle is disabled; views show a loader in its place
    pub fn is_save_pending(&self) -> bool {
        self.lock().save_in_flight
    }

    /// Derive the saved state from the viewer's save records
    ///
    /// Ignored while a save or unsave is in flight.
    pub fn sync_saved(&self, current_user: &User) {
        let mut state = self.lock();
        if state.save_in_flight {
            return;
        }
        state.save_record = current_user
            .save_for(&self.post_id)
            .map(|record| record.id.clone());
        state.saved = state.save_record.is_some();
    }

    /// Take the like-list of a refetched post when no like write is pending
    pub fn sync_post(&self, post: &Post) {
        let mut state = self.lock();
        if post.id == self.post_id && state.likes_in_flight == 0 {
            state.likes = post.likes.clone();
            state.confirmed_likes = post.likes.clone();
        }
    }

    /// Re-read the post and the viewer through the cache and sync both
    ///
    /// Stale reads are refetched, so this picks up the backend's answer after
    /// a toggle's invalidation.
    pub async fn refresh(&self) {
        if let Some(post) = self.queries.post_by_id(&self.post_id).await.into_data() {
            self.sync_post(&post);
        }
        if let Some(user) = self.queries.current_user().await.into_data() {
            self.sync_saved(&user);
        }
    }

    // ============= Toggles =============

    /// Toggle the viewer's like
    ///
    /// The visible list changes before this returns; the write runs on the
    /// returned task.
    pub fn handle_like(&self) -> JoinHandle<ToggleOutcome> {
        let (next, version) = {
            let mut state = self.lock();
            let next = toggle_like(&state.likes, &self.user_id);
            state.likes = next.clone();
            state.like_version += 1;
            state.likes_in_flight += 1;
            (next, state.like_version)
        };
        debug!(post_id = %self.post_id, likes = next.len(), "Like toggled");

        let this = self.clone();
        tokio::spawn(async move {
            let confirmed = this.queries.like_post(&this.post_id, &next).await.is_some();

            let outcome = {
                let mut state = this.lock();
                state.likes_in_flight -= 1;
                if confirmed {
                    state.confirmed_likes = next;
                    ToggleOutcome::Confirmed
                } else if state.like_version == version {
                    state.likes = state.confirmed_likes.clone();
                    ToggleOutcome::RolledBack
                } else {
                    ToggleOutcome::Superseded
                }
            };

            if !confirmed {
                warn!(post_id = %this.post_id, outcome = ?outcome, "Like write failed");
                this.notifier.notify(Notice::error(LIKE_FAILED));
            }
            outcome
        })
    }

    /// Toggle the bookmark
    ///
    /// Returns `None` without changing anything while another save or unsave
    /// is in flight.
    pub fn handle_save(&self) -> Option<JoinHandle<ToggleOutcome>> {
        let record = {
            let mut state = self.lock();
            if state.save_in_flight {
                debug!(post_id = %self.post_id, "Save toggle ignored while in flight");
                return None;
            }
            state.save_in_flight = true;
            state.saved = state.save_record.is_none();
            state.save_record.clone()
        };

        let this = self.clone();
        let handle = match record {
            Some(record_id) => tokio::spawn(async move { this.unsave(record_id).await }),
            None => tokio::spawn(async move { this.save().await }),
        };
        Some(handle)
    }

    async fn save(self) -> ToggleOutcome {
        let record = self.queries.save_post(&self.post_id, &self.user_id).await;

        let confirmed = {
            let mut state = self.lock();
            state.save_in_flight = false;
            match record {
                Some(record) => {
                    state.save_record = Some(record.id);
                    true
                }
                None => {
                    state.saved = false;
                    false
                }
            }
        };

        if confirmed {
            ToggleOutcome::Confirmed
        } else {
            warn!(post_id = %self.post_id, "Save write failed");
            self.notifier.notify(Notice::error(SAVE_FAILED));
            ToggleOutcome::RolledBack
        }
    }

    async fn unsave(self, record_id: String) -> ToggleOutcome {
        let confirmed = self.queries.unsave_post(&record_id).await.is_some();

        {
            let mut state = self.lock();
            state.save_in_flight = false;
            if confirmed {
                state.save_record = None;
            } else {
                state.saved = true;
            }
        }

        if confirmed {
            ToggleOutcome::Confirmed
        } else {
            warn!(post_id = %self.post_id, record_id = %record_id, "Unsave write failed");
            self.notifier.notify(Notice::error(UNSAVE_FAILED));
            ToggleOutcome::RolledBack
        }
    }
}

fn lock(state: &Mutex<StatsState>) -> MutexGuard<'_, StatsState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
