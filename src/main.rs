use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use closure_watch::config::Config;
use closure_watch::fetch::{FetchCache, HttpClosureApi};
use closure_watch::notify::{DeliveryError, Notification, Notifier};
use closure_watch::poll::{self, Engine};
use closure_watch::store::StateStore;
use closure_watch::types::ChannelId;

/// Stand-in delivery backend that writes notifications to the log.
///
/// The real chat-platform notifier is provided by the host embedding this
/// crate; running the binary directly uses this one so the whole engine
/// can be exercised end to end.
struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        channel: ChannelId,
        notification: &Notification,
    ) -> Result<(), DeliveryError> {
        tracing::info!(%channel, title = %notification.title, "notification");
        for (label, value) in &notification.fields {
            tracing::info!(%channel, "  {label}: {value}");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "closure_watch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(
        feed_url = %config.feed_url,
        state_path = %config.state_path.display(),
        interval_secs = config.poll_interval.as_secs(),
        "starting closure-watch"
    );

    let api = Arc::new(HttpClosureApi::with_timeout(
        &config.feed_url,
        config.fetch_timeout,
    ));
    let cache = FetchCache::with_ttl(api, config.cache_ttl);
    let store = StateStore::new(&config.state_path);
    let engine = Engine::load(store, cache);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, shutting down");
            signal_token.cancel();
        }
    });

    poll::run(&engine, &LogNotifier, config.poll_interval, shutdown).await;
}
