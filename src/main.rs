#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
// easier to use when using the functions as callback of foreign functions
#![allow(clippy::needless_pass_by_value)]
#![doc = include_str!("../README.md")]

use std::sync::Arc;

use anyhow::Result;
use axum::Extension;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::prelude::*;

use crate::api::AudioSession;
use crate::api::router;
use crate::config::Config;
use crate::config::StorageConfig;
use crate::media::AudioDevice;
use crate::presence::FileRevivalTimer;
use crate::presence::InProcessHost;
use crate::presence::PresenceController;
use crate::reminders::ReminderScheduler;
use crate::service::NoteService;
use crate::storage::Memory;
use crate::storage::Sqlite;
use crate::storage::Storage;

mod api;
mod blocks;
mod config;
mod graceful_shutdown;
mod media;
mod notes;
mod presence;
mod reminders;
mod service;
mod storage;
mod utils;

const DEFAULT_RUST_LOG: &str = "agenda=debug,tower_http=debug";

#[tokio::main]
async fn main() -> Result<()> {
    setup_environment();
    setup_tracing();

    let config = Config::from_env()?;

    match &config.storage {
        StorageConfig::Memory => {
            tracing::warn!("`DATABASE_URL` is not set, notes are kept in memory only");

            run(&config, Memory::new()).await
        }
        StorageConfig::Sqlite(database_url) => {
            let storage = Sqlite::new(database_url).await?;

            run(&config, storage).await
        }
    }
}

/// Serve until a shutdown signal arrives
async fn run<S: Storage>(config: &Config, storage: S) -> Result<()> {
    let app = setup_app(config, storage).await?;

    if !app.controller.resume_pending_revival() && config.presence_autostart {
        if let Err(err) = app.controller.start().await {
            tracing::warn!("Could not show the sticky notes: {err}");
        }
    }

    let listener = TcpListener::bind(config.address).await?;
    tracing::info!("Listening on {}", config.address);

    axum::serve(listener, app.router.clone())
        .with_graceful_shutdown(graceful_shutdown::handler())
        .await?;

    app.teardown();

    Ok(())
}

/// The running app with everything that needs a goodbye
pub struct App<S: Storage> {
    pub router: Router,
    pub controller: PresenceController<S>,
    background: CancellationToken,
}

impl<S: Storage> App<S> {
    /// Stop background work, the presence is handed to the durable timer
    pub fn teardown(&self) {
        self.background.cancel();
        self.controller.on_process_teardown();
    }
}

/// Create and setup the app with its dependencies
///
/// # Errors
///
/// Will return `Err` when the initial notes can not be loaded
pub async fn setup_app<S: Storage>(config: &Config, storage: S) -> Result<App<S>> {
    let service = NoteService::new(storage).await?;

    let host = Arc::new(InProcessHost::new());
    let timer = Arc::new(FileRevivalTimer::new(&config.state_dir));
    let controller =
        PresenceController::new(service.clone(), host.clone(), timer, config.presence);

    let background = CancellationToken::new();
    ReminderScheduler::new(service.clone(), host.clone(), &config.state_dir)
        .spawn(background.clone());

    let audio = AudioSession::new(AudioDevice::new(config.audio_cache_dir()));

    let router = Router::new()
        .nest("/api", router::<S>())
        .layer(TraceLayer::new_for_http())
        .layer(Extension(service))
        .layer(Extension(controller.clone()))
        .layer(Extension(host))
        .layer(Extension(audio));

    Ok(App {
        router,
        controller,
        background,
    })
}

fn setup_environment() {
    dotenvy::dotenv().ok();
}

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::registry;

    registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_RUST_LOG.into()),
        ))
        .with(fmt::layer())
        .init();
}
