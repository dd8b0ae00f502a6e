use anyhow::{Context, Result};
use prometheus::{Encoder, Registry, TextEncoder};
use snapgram_client::domain::time_ago;
use snapgram_client::notify::TracingNotifier;
use snapgram_client::services::AuthBootstrap;
use snapgram_client::{App, Config};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,snapgram_client=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.app.log_json);
    info!(env = %config.app.env, endpoint = %config.backend.endpoint, "Starting snapgram client");

    let registry = Registry::new();
    App::register_metrics(&registry).context("Failed to register cache metrics")?;

    let app = App::connect(&config, Arc::new(TracingNotifier))
        .context("Failed to create backend client")?;

    match app.auth.initialize().await {
        AuthBootstrap::RedirectToSignIn => {
            warn!("No session held locally; sign in first");
            return Ok(());
        }
        AuthBootstrap::Unauthenticated => {
            warn!("Session was not accepted by the backend");
            return Ok(());
        }
        AuthBootstrap::Authenticated(user) => {
            info!(user_id = %user.id, username = %user.username, "Signed in");
        }
    }

    let mut feed = app.feed();
    feed.load().await;
    let now = chrono::Utc::now();
    for post in feed.posts() {
        println!(
            "{} @{} · {}\n  {}\n  {} likes  #{}",
            post.creator.name,
            post.creator.username,
            time_ago(post.created_at, now),
            post.caption,
            post.likes.len(),
            post.tags.join(" #"),
        );
    }
    if let Some(marker) = feed.end_marker() {
        println!("{}", marker);
    }

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    debug!(metrics = %String::from_utf8_lossy(&buffer), "Cache metrics");

    Ok(())
}
