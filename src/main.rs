use std::{str::FromStr, sync::Arc, time::Duration};

use axum::{
    extract::State,
    response::Redirect,
    routing::{get, post, put},
    Json,
};
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use manager::session_manager::SessionManager;
use realtime::{ConnectionRegistry, Gateway};

mod auth;
mod chat_view;
mod config;
mod error;
mod login_view;
mod manager;
mod order_view;
mod realtime;
mod service_view;
mod utils;
mod ws_view;

pub const SESSION_ID_KEY: &str = "session";

pub struct AppState {
    pool: SqlitePool,
    gateway: Gateway,
    config: Config,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,service_desk=debug,tower_http=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

fn spawn_session_cleanup(pool: SqlitePool, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match SessionManager::new(&pool).purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "expired sessions removed"),
                Err(e) => tracing::error!(error = %e, "session cleanup failed"),
            }
        }
    });
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "connections": state.gateway.registry().len(),
    }))
}

async fn index() -> Redirect {
    Redirect::to("/chat")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting service desk");

    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!(database_url = %config.database_url, "database ready");

    spawn_session_cleanup(
        pool.clone(),
        Duration::from_secs(config.session_cleanup_interval_secs),
    );

    let gateway = Gateway::new(ConnectionRegistry::new(), config.ws_outbound_buffer);
    let addr = config.server_address();
    let state = Arc::new(AppState {
        pool,
        gateway,
        config,
    });

    let app = axum::Router::new()
        .route("/", get(index))
        .route("/chat", get(chat_view::chat_page))
        .route("/login", get(login_view::login).post(login_view::try_login))
        .route("/register", post(login_view::try_register))
        .route("/logout", post(login_view::logout))
        .route("/ws", get(ws_view::ws_handler))
        .route("/api/health", get(health))
        .route(
            "/api/profile",
            get(login_view::profile).put(login_view::update_profile),
        )
        .route("/api/services", get(service_view::list_services))
        .route(
            "/api/orders",
            get(order_view::list_orders).post(order_view::create_order),
        )
        .route("/api/admin/orders", get(order_view::list_all_orders))
        .route("/api/admin/orders/status", put(order_view::update_status))
        .route(
            "/api/admin/services",
            get(service_view::list_all_services).post(service_view::create_service),
        )
        .route(
            "/api/admin/services/:id",
            axum::routing::delete(service_view::delete_service),
        )
        .route(
            "/api/admin/services/:id/toggle",
            post(service_view::toggle_service),
        )
        .route("/api/chats", get(chat_view::list_chats))
        .route("/api/chats/info", get(chat_view::chat_info))
        .route(
            "/api/chats/messages",
            get(chat_view::list_messages).post(chat_view::send_message),
        )
        .route("/api/chats/mark-read", post(chat_view::mark_read))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!(%addr, "listening");
    axum::Server::bind(&addr.parse()?)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
