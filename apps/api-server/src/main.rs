//! api-server — HTTP service for go links.
//!
//! Serves `/go/<keyword>` redirects with personal, organization and global
//! tiers, the moderation and sharing JSON API, and operational endpoints.
//!
//! - Auth: OIDC bearer tokens, or disabled (debug) mode via `X-Debug-User`.
//! - Storage: SQLite (default) or in-memory.
//! - Background: periodic link health checks with an SSRF guard.
//!
//! Run:
//! ```bash
//! # pretty logs, in-memory store, no auth
//! STORAGE_PROVIDER=memory cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod api;
mod auth;
mod config;
mod error;
mod metrics;
mod notifier;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use domain::adapters::memory_repo::InMemoryRepo;
use domain::notify::{NoopNotifier, Notifier};
use domain::{CoreError, Store};
use sqlite_adapter::SqliteRepo;
use tokio::sync::watch;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, StorageProvider};
use crate::notifier::{EmailNotifier, LogTransport};
use crate::state::AppState;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    init_tracing(&cfg);
    cfg.warn_if_insecure();

    let store = match build_store(&cfg) {
        Ok(store) => store,
        Err(e) => {
            error!(err = %e, url = %cfg.database_url, "failed to open storage");
            std::process::exit(1);
        }
    };

    let notifier: Arc<dyn Notifier> = match &cfg.smtp {
        Some(smtp) => {
            info!(host = %smtp.host, port = smtp.port, "email notifications enabled");
            Arc::new(EmailNotifier::new(
                store.clone(),
                Arc::new(LogTransport::new(smtp)),
                smtp.from.clone(),
                cfg.base_url.clone(),
            ))
        }
        None => Arc::new(NoopNotifier),
    };

    let state = match AppState::new(&cfg, store, notifier) {
        Ok(state) => state,
        Err(e) => {
            error!(err = %e, "startup failed");
            std::process::exit(1);
        }
    };

    if !cfg.org_fallbacks.is_empty() {
        match state.fallbacks.apply_org_fallbacks(&cfg.org_fallbacks) {
            Ok(n) => info!(count = n, "organization fallbacks applied"),
            Err(e) => {
                error!(err = %e, "invalid ORG_FALLBACKS");
                std::process::exit(1);
            }
        }
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let checker_task = if cfg.health_check_enabled {
        let checker = state.checker.clone();
        Some(tokio::spawn(async move { checker.run(stop_rx).await }))
    } else {
        info!("health checker disabled");
        None
    };

    let app = build_app(&cfg, state);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, err = %e, "bind failed");
            std::process::exit(1);
        }
    };
    info!(%addr, "api-server listening");
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(err = %e, "server error");
    }

    let _ = stop_tx.send(true);
    if let Some(task) = checker_task {
        if let Err(e) = task.await {
            warn!(err = %e, "health checker task ended abnormally");
        }
    }
    info!("api-server stopped");
}

fn init_tracing(cfg: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

fn build_store(cfg: &Config) -> Result<Arc<dyn Store>, CoreError> {
    match cfg.storage_provider {
        StorageProvider::Memory => {
            info!("storage: in-memory");
            Ok(Arc::new(InMemoryRepo::new()))
        }
        StorageProvider::Sqlite => {
            let repo = SqliteRepo::open_url(&cfg.database_url)?;
            info!(url = %cfg.database_url, "storage: sqlite");
            Ok(Arc::new(repo))
        }
    }
}

/// Router plus request id, tracing and CORS layers.
fn build_app(cfg: &Config, state: AppState) -> axum::Router {
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let app = api::router(state)
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid));

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin.clone()]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::PATCH,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
                axum::http::HeaderName::from_static(auth::DEBUG_USER_HEADER),
                axum::http::HeaderName::from_static(auth::DEBUG_ORG_HEADER),
                axum::http::HeaderName::from_static(auth::DEBUG_GROUPS_HEADER),
                axum::http::HeaderName::from_static(auth::ACCESS_TOKEN_HEADER),
            ])
    };
    app.layer(cors)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(err = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(err = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
