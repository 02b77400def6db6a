//! licsync-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, loads config, picks
//! the store, starts the sync schedule and serves HTTP. All route handlers
//! live in `routes.rs`; shared state lives in `state.rs`.

use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, Method};
use licsync_daemon::{routes, state};
use licsync_reconcile::{LicenseStore, MemoryLicenseStore, Reconciler};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience).
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let paths = licsync_config::config_paths_from_env();
    let (loaded, cfg) = licsync_config::load_sync_config(&paths)?;
    info!(config_hash = %loaded.config_hash, layers = paths.len(), "config loaded");

    let secrets = licsync_config::resolve_secrets(&cfg);

    let (store, reconciler, storage): (Arc<dyn LicenseStore>, Reconciler, &'static str) =
        match secrets.database_url.as_deref() {
            Some(url) => {
                let pool = licsync_db::connect(url).await?;
                licsync_db::migrate(&pool).await?;
                let store: Arc<dyn LicenseStore> =
                    Arc::new(licsync_db::PgLicenseStore::new(pool.clone()));
                let sources = licsync_db::sources_from_settings(&pool, &cfg.sync);
                let reconciler = Reconciler::new(Arc::clone(&store), sources);
                (store, reconciler, "postgres")
            }
            None => {
                warn!(
                    env = %secrets.database_url_env,
                    "no database url configured; using in-memory store with no telemetry origins"
                );
                let store: Arc<dyn LicenseStore> = Arc::new(MemoryLicenseStore::new());
                let reconciler = Reconciler::new(Arc::clone(&store), Vec::new());
                (store, reconciler, "memory")
            }
        };

    let shared = Arc::new(state::AppState::new(
        store,
        reconciler,
        storage,
        cfg.sync.interval_secs,
    ));

    let schedule = shared
        .scheduler
        .start(cfg.sync.interval(), cfg.sync.run_on_start);

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_permissive());

    let addr = cfg.daemon.socket_addr()?;
    info!("licsync-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    schedule.stop().await;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; serve until the process is killed.
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// CORS: any origin, the methods the license routes use.
fn cors_permissive() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
