//! End-to-end client flows against the in-process backend

use query_cache::CacheKey;
use snapgram_client::backend::{FailPoint, MemoryBackend};
use snapgram_client::domain::{FileUpload, Post};
use snapgram_client::forms::{FormOutcome, PostForm, SignUpForm, UPDATE_POST_FAILED};
use snapgram_client::notify::RecordingNotifier;
use snapgram_client::services::{AuthBootstrap, ToggleOutcome, END_OF_POSTS};
use snapgram_client::App;
use std::sync::Arc;

struct Client {
    backend: Arc<MemoryBackend>,
    notifier: RecordingNotifier,
    app: App,
}

async fn signed_in_client() -> Client {
    let backend = Arc::new(MemoryBackend::default());
    let notifier = RecordingNotifier::new();
    let app = App::in_memory(backend.clone(), Arc::new(notifier.clone()));

    let outcome = app
        .forms
        .sign_up(&SignUpForm {
            name: "Ada".to_string(),
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            password: "password1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(outcome, FormOutcome::Navigate("/".to_string()));

    Client {
        backend,
        notifier,
        app,
    }
}

async fn publish(client: &Client, caption: &str) -> Post {
    let form = PostForm {
        caption: caption.to_string(),
        location: "Lisbon".to_string(),
        tags: "travel".to_string(),
        file: Some(FileUpload::infer(format!("{}.png", caption), vec![1, 2, 3])),
    };
    client.app.forms.create_post(&form).await.unwrap();

    let posts = client.app.api().get_recent_posts().await.unwrap();
    posts
        .documents
        .into_iter()
        .find(|p| p.caption == caption)
        .unwrap()
}

#[tokio::test]
async fn like_shows_immediately_and_reads_correct_after_invalidation() {
    let client = signed_in_client().await;
    let post = publish(&client, "first").await;
    let user_id = client.app.auth.current().user.id;

    let feed = client.app.queries.recent_posts().await.into_data().unwrap();
    assert!(feed.documents[0].likes.is_empty());

    let stats = client.app.post_stats(&post);
    client.backend.pause_writes();
    let task = stats.handle_like();

    assert_eq!(stats.like_count(), 1);
    assert!(stats.is_liked());
    assert!(!client.app.cache().is_stale(&CacheKey::recent_posts()));

    client.backend.resume_writes();
    assert_eq!(task.await.unwrap(), ToggleOutcome::Confirmed);

    for key in [
        CacheKey::recent_posts(),
        CacheKey::current_user(),
        CacheKey::post_by_id(&post.id),
        CacheKey::infinite_posts(),
    ] {
        assert!(client.app.cache().is_stale(&key), "{:?} not stale", key);
    }

    let fresh = client.app.queries.post_by_id(&post.id).await.into_data().unwrap();
    assert_eq!(fresh.likes, vec![user_id.clone()]);

    stats.refresh().await;
    assert_eq!(stats.likes(), vec![user_id]);
}

#[tokio::test]
async fn double_like_restores_membership() {
    let client = signed_in_client().await;
    let post = publish(&client, "first").await;
    let stats = client.app.post_stats(&post);

    let first = stats.handle_like();
    let second = stats.handle_like();
    assert!(!stats.is_liked());
    assert_eq!(stats.like_count(), 0);

    first.await.unwrap();
    second.await.unwrap();

    let fresh = client.app.queries.post_by_id(&post.id).await.into_data().unwrap();
    assert!(fresh.likes.is_empty());
}

#[tokio::test]
async fn unsave_reads_false_before_backend_answers() {
    let client = signed_in_client().await;
    let post = publish(&client, "first").await;
    let stats = client.app.post_stats(&post);

    stats.handle_save().unwrap().await.unwrap();
    let user = client.app.queries.current_user().await.into_data().unwrap();
    let record = user.save_for(&post.id).unwrap().id.clone();
    stats.sync_saved(&user);
    assert!(stats.is_saved());

    client.backend.pause_writes();
    let task = stats.handle_save().unwrap();
    assert!(!stats.is_saved());

    client.backend.resume_writes();
    assert_eq!(task.await.unwrap(), ToggleOutcome::Confirmed);
    assert!(client.backend.document("saves", &record).is_none());

    let user = client.app.queries.current_user().await.into_data().unwrap();
    assert!(user.save_for(&post.id).is_none());
}

#[tokio::test]
async fn empty_page_ends_feed_without_further_fetch() {
    let client = signed_in_client().await;
    for caption in ["one", "two", "three"] {
        publish(&client, caption).await;
    }

    let mut feed = client.app.feed();
    feed.load().await;
    assert_eq!(feed.posts().count(), 3);
    assert!(feed.end_marker().is_none());

    feed.fetch_next_page().await;
    assert_eq!(feed.end_marker(), Some(END_OF_POSTS));

    let calls = client.backend.call_count(FailPoint::ListDocuments);
    feed.fetch_next_page().await;
    feed.fetch_next_page().await;
    assert_eq!(client.backend.call_count(FailPoint::ListDocuments), calls);
}

#[tokio::test]
async fn failed_update_keeps_prior_image() {
    let client = signed_in_client().await;
    let post = publish(&client, "first").await;
    client.backend.fail(FailPoint::UpdateDocument);

    let mut form = PostForm::for_post(&post);
    form.caption = "edited".to_string();
    form.file = Some(FileUpload::infer("replacement.jpg", vec![7, 7]));
    let outcome = client.app.forms.update_post(&post, &form).await.unwrap();

    assert_eq!(outcome, FormOutcome::Stay);
    assert!(client.backend.file_exists(&post.image_id));
    assert_eq!(client.backend.file_count(), 1);
    assert_eq!(client.notifier.messages(), vec![UPDATE_POST_FAILED]);
}

#[tokio::test]
async fn sign_out_then_bootstrap_redirects() {
    let client = signed_in_client().await;
    assert!(matches!(
        client.app.auth.initialize().await,
        AuthBootstrap::Authenticated(_)
    ));

    client.app.forms.sign_out().await;

    assert_eq!(
        client.app.auth.initialize().await,
        AuthBootstrap::RedirectToSignIn
    );
}
