//! Saarthi - companion service for the SaarthiGPT chat front-end
//!
//! Keeps the conversation history, submits tasks to the backend job service,
//! follows their progress and streams results into the conversation. The
//! browser UI talks to it over a small JSON API.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod clipboard;
mod config;
mod conversation;
mod core;
mod diff;
mod jobs;
mod routes;

use clipboard::{ClipboardSink, SystemClipboard};
use config::Config;
use crate::core::{ChatController, ConversationStore, CorrectionService, KvStorage, SqliteStorage};
use jobs::JobClient;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub controller: Arc<ChatController>,
    pub corrections: Arc<CorrectionService>,
    pub clipboard: Arc<dyn ClipboardSink>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "saarthi=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let storage: Arc<dyn KvStorage> =
        Arc::new(SqliteStorage::new(&config.data_dir.join("saarthi.db")).await?);
    let store = Arc::new(ConversationStore::load(storage.clone()).await);
    let jobs = Arc::new(JobClient::new(&config)?);

    let controller = Arc::new(ChatController::new(
        store,
        jobs.clone(),
        config.settings.polling.policy(),
    ));
    let corrections = Arc::new(CorrectionService::new(
        jobs,
        storage,
        config.settings.correction.policy(),
    ));

    tracing::info!(
        api_url = %config.api_url,
        grammar_api_url = %config.grammar_api_url,
        "Using job backend"
    );

    let state = AppState {
        config,
        controller,
        corrections,
        clipboard: Arc::new(SystemClipboard),
    };

    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Saarthi API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
