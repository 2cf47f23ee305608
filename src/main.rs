//! Dialolical Back binary entrypoint wiring REST routes, background workers and storage.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dialolical_back::{
    build_router,
    config::AppConfig,
    dao::{
        dialogue_store::{DialogueStore, memory::MemoryDialogueStore},
        storage::StorageError,
    },
    services::{rate_limit, storage_supervisor, trophy_service},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_state = AppState::new(AppConfig::load());
    spawn_storage(&app_state);
    trophy_service::spawn_trophy_worker(&app_state);
    trophy_service::spawn_trophy_sweep(&app_state);
    rate_limit::spawn_cleanup(&app_state);

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serving axum")?;

    Ok(())
}

/// Select the storage backend from `STORAGE_BACKEND` and hand it to the supervisor.
fn spawn_storage(state: &SharedState) {
    let backend = env::var("STORAGE_BACKEND").unwrap_or_else(|_| default_backend().into());
    match backend.as_str() {
        "memory" => spawn_memory_storage(state),
        #[cfg(feature = "mongo-store")]
        "mongo" | "mongodb" => spawn_mongo_storage(state),
        other => {
            warn!(backend = other, "unknown STORAGE_BACKEND; using memory");
            spawn_memory_storage(state);
        }
    }
}

fn default_backend() -> &'static str {
    if cfg!(feature = "mongo-store") {
        "mongo"
    } else {
        "memory"
    }
}

fn spawn_memory_storage(state: &SharedState) {
    info!("using in-memory dialogue store");
    let store: Arc<dyn DialogueStore> = Arc::new(MemoryDialogueStore::new());
    tokio::spawn(storage_supervisor::run(state.clone(), move || {
        let store = store.clone();
        async move { Ok::<_, StorageError>(store) }
    }));
}

#[cfg(feature = "mongo-store")]
fn spawn_mongo_storage(state: &SharedState) {
    use dialolical_back::dao::dialogue_store::mongodb::{MongoConfig, MongoDialogueStore};

    let uri = env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".into());
    let db_name = env::var("MONGO_DB").ok();
    info!("using MongoDB dialogue store");

    tokio::spawn(storage_supervisor::run(state.clone(), move || {
        let uri = uri.clone();
        let db_name = db_name.clone();
        async move {
            let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
            let store = MongoDialogueStore::connect(config).await?;
            Ok::<_, StorageError>(Arc::new(store) as Arc<dyn DialogueStore>)
        }
    }));
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "cannot install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
