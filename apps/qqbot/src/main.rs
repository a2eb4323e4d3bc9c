//! QQ group chat bot.
//!
//! Run with: cargo run -p qqbot
//!
//! Requires `BOT_ID`, `BOT_TOKEN` and `GEMINI_PRO_KEY` in the environment.

mod config;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use qqbot_core::{Credentials, ReplySender, Secret, event::GROUP_AT_MESSAGE_CREATE};
use qqbot_dispatch::{Dispatcher, storage::MemoryConversationStore};
use qqbot_gateway::{SessionManager, discover_gateway, websocket::WsConnector};
use qqbot_handlers::{
    GeminiClient, GroupMessageHandler, HttpImageFetcher, OpenApiClient, Services, builtin,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let credentials = Credentials::new(&config.bot_id, &config.bot_token);
    let http = reqwest::Client::new();

    let url = discover_gateway(&http, &config.bot_url, &credentials)
        .await
        .context("Gateway discovery failed")?;

    // Handlers
    let replies: Arc<dyn ReplySender> = Arc::new(OpenApiClient::new(
        http.clone(),
        &config.bot_url,
        credentials.clone(),
    ));
    let gemini_key = Secret::new(config.gemini_key);
    let services = Services {
        replies: Arc::clone(&replies),
        store: Arc::new(MemoryConversationStore::new()),
        generator: Arc::new(GeminiClient::new(
            http.clone(),
            gemini_key.clone(),
            config.gemini,
        )),
        images: Arc::new(HttpImageFetcher::new(http)),
    };
    let router = builtin::router(&services, gemini_key, config.admin_groups)
        .context("Failed to build command table")?;
    let dispatcher = Dispatcher::new(config.dispatcher).route(
        GROUP_AT_MESSAGE_CREATE,
        Arc::new(GroupMessageHandler::new(router, replies)),
    );

    // Gateway
    let session = SessionManager::new(WsConnector, url, credentials, config.gateway);
    let status = session.status();
    let (events, gateway) = session.spawn();

    tracing::info!(
        max_in_flight = dispatcher.config().max_in_flight,
        handler_deadline_secs = dispatcher.config().handler_deadline.as_secs(),
        "Bot started"
    );

    tokio::select! {
        () = dispatcher.run(events) => tracing::warn!("Gateway session ended"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutting down");
        }
    }
    gateway.abort();

    let in_flight = dispatcher.in_flight();
    if tokio::time::timeout(SHUTDOWN_GRACE, dispatcher.drain()).await.is_err() {
        tracing::warn!(in_flight, "Handlers still running at exit");
    }

    let status = status.borrow();
    tracing::info!(attempts = status.attempts, state = ?status.state, "Stopped");
    Ok(())
}
