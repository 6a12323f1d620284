//! Backend of a dining hall meal feedback site.
//!
//!
//!
//! # General Infrastructure
//! - Users log in through a signed link handed to them out-of-band
//! - The link sets two long-lived cookies, `sid` and `sid_sig`
//! - Every request re-derives the user from those cookies, nothing is kept server side
//! - Feedback is one record per (meal, user), stored in Redis
//!
//!
//!
//! # Sessions
//!
//! **Goal**: Know who is leaving feedback without running a session table.
//!
//! - `sid` holds the user id as a decimal string
//! - `sid_sig` holds an HMAC-SHA256 over `sid|<id>` keyed with the server secret
//! - If either cookie is missing or the signature does not match, the request is anonymous
//! - Anonymous requests are only turned away by routes that need a user, with a 401
//! - The user record is looked up once per request, on first use
//! - Cookies last a year and are never revoked
//!
//!
//!
//! # Feedback
//!
//! - Stars 1 to 5, free text
//! - Submitting again for the same meal overwrites the previous stars and text
//! - Writes use optimistic locking (`WATCH` / `MULTI` / `EXEC`) and retry on conflict
//! - Busy or slow writes answer 503, bad input answers 400
//!
//!
//!
//! # Routes
//!
//! | Method | Path | Login | |
//! |---|---|---|---|
//! | GET | `/login` | no | handshake, sets cookies, redirects to `continue` |
//! | GET | `/meals/{id}` | yes | meal and its feedback with authors, JSON |
//! | POST | `/meals/{id}/feedback` | yes | form `stars`, `text`, redirects back to the meal |
//!
//!
//!
//! # Setup
//!
//! Secrets are read from `/run/secrets/<NAME>`, or the environment variable of
//! the same name when running outside of swarm.
//!
//! | Variable | Default |
//! |---|---|
//! | `SESSION_SECRET` | required |
//! | `RUST_PORT` | `1111` |
//! | `STORE` | `redis` (`memory` for local runs) |
//! | `REDIS_URL` | `redis://redis:6379` |
//! | `FEEDBACK_TXN_ATTEMPTS` | `8` |
//! | `FEEDBACK_TXN_TIMEOUT_MS` | `5000` |
//!
//! Run locally.
//! ```sh
//! SESSION_SECRET=dev STORE=memory RUST_LOG=info cargo run --bin meals
//! ```
//!
//! Mint a login link for user 42.
//! ```sh
//! SESSION_SECRET=dev cargo run --bin mint-login -- 42 --continue-path /meals/abc
//! ```
//!
//! View docs.
//! ```sh
//! cargo doc --open
//! ```
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod database;
pub mod error;
pub mod feedback;
pub mod login;
pub mod memory;
pub mod models;
pub mod routes;
pub mod session;
pub mod signing;
pub mod state;
pub mod store;

use login::login_handler;
use routes::{post_meal_feedback_handler, view_meal_handler};
use session::{require_login, resolve_session};
use state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/meals/:meal_id", get(view_meal_handler))
        .route("/meals/:meal_id/feedback", post(post_meal_feedback_handler))
        .route_layer(middleware::from_fn(require_login));

    Router::new()
        .route("/login", get(login_handler))
        .merge(protected)
        .layer(middleware::from_fn_with_state(state.clone(), resolve_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    let router = app(state);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .expect("Failed to bind listener");
    info!("Server running on {address}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    info!("Server shut down");
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
