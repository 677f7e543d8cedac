use crate::handlers;
use crate::state::AppState;
use axum::{Router, routing::{get, post}};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/register", post(handlers::register))
        .route("/api/login", post(handlers::login))
        .route("/api/logout", post(handlers::logout))
        .route("/api/me", get(handlers::get_home_stats))
        .route("/api/dashboard", get(handlers::get_dashboard))
        .route("/api/activity", post(handlers::record_activity))
        .route("/api/classify", post(handlers::classify))
        .route("/api/chat", post(handlers::chat))
        .route("/api/chat/greeting", get(handlers::get_greeting))
        .with_state(state)
}
