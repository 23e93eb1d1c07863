//! Documentation of an outfit contest platform.
//!
//! Participants submit one look each while the contest is in its submission
//! phase. Voting opens by admin command or automatically once the entry
//! limit is reached, runs for a fixed number of days, and every voter gets a
//! small daily vote budget (Seoul time). When the window elapses the next
//! request closes the contest, and the ranking becomes available.
//!
//!
//!
//! # General Infrastructure
//! - Single backend process in front of one SQLite file
//! - Voter identity is a long-lived opaque cookie minted on first contact
//! - Uploaded images live on local disk and are served under `/uploads`
//! - Admin access is a shared key exchanged for a session cookie
//!
//!
//!
//! # Phase Handling
//!
//! There is no background timer. Every request that depends on the contest
//! phase first runs a tick that closes voting when the window has elapsed,
//! then proceeds. Phase transitions are conditional database updates, so
//! concurrent requests cannot apply the same transition twice.
//!
//!
//!
//! # Configuration
//!
//! Environment variables, all optional:
//! - `RUST_PORT` (5000)
//! - `DATABASE_URL` (`sqlite://contest.db`)
//! - `ADMIN_KEY` (`dev-admin`, also read from `/run/secrets/ADMIN_KEY`)
//! - `CONTEST_TITLE`, `MAX_ENTRIES` (unset = unbounded), `VOTES_PER_VOTER` (2)
//! - `VOTING_DAYS` (5), `UPLOAD_DIR` (`uploads`), `PUBLIC_BASE_URL`,
//!   `MAX_UPLOAD_BYTES` (8 MiB)
use std::{sync::Arc, time::Duration};

use axum::{
    extract::DefaultBodyLimit,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};

use signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod config;
pub mod contest;
pub mod database;
pub mod error;
pub mod identity;
pub mod results;
pub mod routes;
pub mod state;
pub mod storage;
pub mod utils;

use routes::{
    admin_close_handler, admin_delete_all_handler, admin_delete_entry_handler,
    admin_login_handler, admin_logout_handler, admin_reset_handler, admin_start_voting_handler,
    admin_status_handler, index_handler, results_handler, submit_handler, submit_upload_handler,
    vote_handler,
};
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let app = router(state.clone()).layer(cors);

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/submit", post(submit_handler))
        .route("/submit/upload", post(submit_upload_handler))
        .route("/vote/{entry_id}", post(vote_handler))
        .route("/results", get(results_handler))
        .route("/admin/login", post(admin_login_handler))
        .route("/admin/logout", post(admin_logout_handler))
        .route("/admin/status", get(admin_status_handler))
        .route(
            "/admin/start-voting",
            post(admin_start_voting_handler),
        )
        .route("/admin/close", post(admin_close_handler))
        .route(
            "/admin/entries/{entry_id}/delete",
            post(admin_delete_entry_handler),
        )
        .route("/admin/entries/delete-all", post(admin_delete_all_handler))
        .route("/admin/reset", post(admin_reset_handler))
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
