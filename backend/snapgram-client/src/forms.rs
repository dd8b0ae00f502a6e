//! Form validation and submission flows
//!
//! Each form validates with `validator` before anything reaches the backend.
//! Submissions report failures as notices and tell the caller where to go
//! next; they never return backend errors.

use crate::domain::{FileUpload, NewPost, NewUser, Post, UpdatePost, UpdateUser, User};
use crate::notify::{Notice, Notifier};
use crate::services::{AuthStore, AuthUser, Queries};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use validator::{Validate, ValidationErrors};

pub const SIGN_UP_FAILED: &str = "Sign up failed. Please try again.";
pub const SIGN_IN_NEW_ACCOUNT_FAILED: &str = "Something went wrong. Please sign in to your new account.";
pub const SIGN_IN_FAILED: &str = "Sign in failed! Please try again.";
pub const SIGN_OUT_FAILED: &str = "Sign out failed. Please try again.";
pub const CREATE_POST_FAILED: &str = "Failed to create post";
pub const UPDATE_POST_FAILED: &str = "Failed to update post";
pub const POST_DELETED: &str = "Post deleted successfully.";
pub const DELETE_POST_FAILED: &str = "Failed to delete post. Please try again.";
pub const PROFILE_UPDATED: &str = "Profile updated successfully.";
pub const PROFILE_UPDATE_FAILED: &str = "Something went wrong. Please try again.";

pub const HOME_ROUTE: &str = "/";
pub const SIGN_IN_ROUTE: &str = "/sign-in";

pub fn post_route(post_id: &str) -> String {
    format!("/posts/{}", post_id)
}

pub fn profile_route(user_id: &str) -> String {
    format!("/profile/{}", user_id)
}

/// Path parameter, or the empty id when the route has none
pub fn route_param(param: Option<&str>) -> &str {
    param.unwrap_or("")
}

/// Where the view goes after a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormOutcome {
    Navigate(String),
    /// Previous page
    Back,
    Stay,
}

// ============================================================================
// Forms
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SignUpForm {
    #[validate(length(min = 2, message = "Too short"))]
    pub name: String,
    #[validate(length(min = 2, message = "Too short"))]
    pub username: String,
    #[validate(email(message = "Invalid email"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SignInForm {
    #[validate(email(message = "Invalid email"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    pub password: String,
}

#[derive(Debug, Clone, Default, Validate)]
pub struct PostForm {
    #[validate(length(min = 2, max = 2200, message = "Too short!"))]
    pub caption: String,
    #[validate(length(min = 2, max = 100))]
    pub location: String,
    /// Comma separated
    pub tags: String,
    pub file: Option<FileUpload>,
}

impl PostForm {
    /// Prefilled from an existing post
    pub fn for_post(post: &Post) -> Self {
        Self {
            caption: post.caption.clone(),
            location: post.location.clone(),
            tags: post.tags.join(","),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Validate)]
pub struct ProfileForm {
    #[validate(length(min = 2, message = "Name must be at least 2 characters."))]
    pub name: String,
    #[validate(length(min = 2, message = "Username must be at least 2 characters."))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    pub bio: String,
    pub file: Option<FileUpload>,
}

impl ProfileForm {
    pub fn for_user(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            bio: user.bio.clone().unwrap_or_default(),
            file: None,
        }
    }
}

// ============================================================================
// Submission flows
// ============================================================================

#[derive(Clone)]
pub struct Submissions {
    queries: Queries,
    auth: AuthStore,
    notifier: Arc<dyn Notifier>,
}

impl Submissions {
    pub fn new(queries: Queries, auth: AuthStore, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            queries,
            auth,
            notifier,
        }
    }

    fn fail(&self, message: &str) -> FormOutcome {
        self.notifier.notify(Notice::error(message));
        FormOutcome::Stay
    }

    /// Create the account, open a session, then load the auth user
    pub async fn sign_up(&self, form: &SignUpForm) -> Result<FormOutcome, ValidationErrors> {
        form.validate()?;

        let new_user = NewUser {
            name: form.name.clone(),
            username: form.username.clone(),
            email: form.email.clone(),
            password: form.password.clone(),
        };
        if self.queries.create_user_account(&new_user).await.is_none() {
            return Ok(self.fail(SIGN_UP_FAILED));
        }

        if self
            .queries
            .sign_in_account(&form.email, &form.password)
            .await
            .is_none()
        {
            self.notifier.notify(Notice::error(SIGN_IN_NEW_ACCOUNT_FAILED));
            return Ok(FormOutcome::Navigate(SIGN_IN_ROUTE.to_string()));
        }

        if self.auth.check_auth_user().await {
            info!(username = %form.username, "Signed up");
            Ok(FormOutcome::Navigate(HOME_ROUTE.to_string()))
        } else {
            Ok(self.fail(SIGN_IN_FAILED))
        }
    }

    pub async fn sign_in(&self, form: &SignInForm) -> Result<FormOutcome, ValidationErrors> {
        form.validate()?;

        if self
            .queries
            .sign_in_account(&form.email, &form.password)
            .await
            .is_none()
        {
            return Ok(self.fail(SIGN_IN_FAILED));
        }

        if self.auth.check_auth_user().await {
            Ok(FormOutcome::Navigate(HOME_ROUTE.to_string()))
        } else {
            Ok(self.fail(SIGN_IN_FAILED))
        }
    }

    /// Drop the session, the auth user and every cached read
    pub async fn sign_out(&self) -> FormOutcome {
        if self.queries.sign_out_account().await.is_none() {
            return self.fail(SIGN_OUT_FAILED);
        }

        self.auth.reset();
        self.queries.cache().clear();
        info!("Signed out");
        FormOutcome::Navigate(SIGN_IN_ROUTE.to_string())
    }

    pub async fn create_post(&self, form: &PostForm) -> Result<FormOutcome, ValidationErrors> {
        form.validate()?;

        let Some(file) = form.file.clone() else {
            warn!("Post submitted without an image");
            return Ok(self.fail(CREATE_POST_FAILED));
        };

        let new_post = NewPost {
            user_id: self.auth.current().user.id,
            caption: form.caption.clone(),
            file,
            location: form.location.clone(),
            tags: form.tags.clone(),
        };
        match self.queries.create_post(&new_post).await {
            Some(_) => Ok(FormOutcome::Navigate(HOME_ROUTE.to_string())),
            None => Ok(self.fail(CREATE_POST_FAILED)),
        }
    }

    /// Edit `post`; its image is replaced only when the form carries a file
    pub async fn update_post(
        &self,
        post: &Post,
        form: &PostForm,
    ) -> Result<FormOutcome, ValidationErrors> {
        form.validate()?;

        let update = UpdatePost {
            post_id: post.id.clone(),
            caption: form.caption.clone(),
            image_id: post.image_id.clone(),
            image_url: post.image_url.clone(),
            file: form.file.clone(),
            location: form.location.clone(),
            tags: form.tags.clone(),
        };
        match self.queries.update_post(&update).await {
            Some(updated) => Ok(FormOutcome::Navigate(post_route(&updated.id))),
            None => Ok(self.fail(UPDATE_POST_FAILED)),
        }
    }

    pub async fn delete_post(&self, post: &Post) -> FormOutcome {
        match self.queries.delete_post(post).await {
            Some(()) => {
                self.notifier.notify(Notice::success(POST_DELETED));
                FormOutcome::Back
            }
            None => self.fail(DELETE_POST_FAILED),
        }
    }

    /// Save the profile of `user` and refresh the auth user from the result
    pub async fn update_profile(
        &self,
        user: &User,
        form: &ProfileForm,
    ) -> Result<FormOutcome, ValidationErrors> {
        form.validate()?;

        let update = UpdateUser {
            user_id: user.id.clone(),
            name: form.name.clone(),
            username: form.username.clone(),
            bio: form.bio.clone(),
            image_id: user.image_id.clone(),
            image_url: user.image_url.clone(),
            file: form.file.clone(),
        };
        let Some(updated) = self.queries.update_user(&update).await else {
            return Ok(self.fail(PROFILE_UPDATE_FAILED));
        };

        let current = self.auth.current().user;
        self.auth.set_user(AuthUser {
            email: current.email,
            ..AuthUser::from(&updated)
        });
        self.notifier.notify(Notice::success(PROFILE_UPDATED));
        Ok(FormOutcome::Navigate(profile_route(&updated.id)))
    }
}
