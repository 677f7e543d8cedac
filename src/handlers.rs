use crate::backend::{CHAT_APOLOGY, estimated_weight};
use crate::engine::{self, ActivityOutcome};
use crate::errors::{AppError, Result};
use crate::models::{
    ActivityRequest, ActivityResponse, ChatRequest, ChatResponse, ClassifyRequest, ClassifyResponse,
    CredentialsRequest, DashboardResponse, GreetingResponse, HomeStats, SessionResponse, UserRecord,
};
use crate::session::{self, SessionContext};
use crate::state::AppState;
use crate::views::{build_dashboard, chat_greeting, home_stats};
use axum::{Json, extract::State, http::StatusCode};
use tracing::warn;

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<SessionResponse>> {
    let user_id = state
        .sessions
        .register(&state.store, &payload.email, &payload.password)
        .await?;
    state.bus.notify();
    Ok(Json(SessionResponse {
        user_id,
        email: payload.email.trim().to_string(),
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<SessionResponse>> {
    let (user_id, email) = state
        .sessions
        .login(&state.store, &payload.email, &payload.password)
        .await?;
    state.bus.notify();
    Ok(Json(SessionResponse { user_id, email }))
}

pub async fn logout(State(state): State<AppState>) -> Result<StatusCode> {
    let mut store = state.store.lock().await;
    state.sessions.logout(&mut store).await?;
    state.bus.notify();
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_home_stats(State(state): State<AppState>) -> Result<Json<HomeStats>> {
    let (_, user) = current_user(&state).await?;
    Ok(Json(home_stats(&user, state.bus.revision())))
}

pub async fn get_dashboard(State(state): State<AppState>) -> Result<Json<DashboardResponse>> {
    let (_, user) = current_user(&state).await?;
    Ok(Json(build_dashboard(&user, state.bus.revision())))
}

pub async fn get_greeting(State(state): State<AppState>) -> Result<Json<GreetingResponse>> {
    let (_, user) = current_user(&state).await?;
    Ok(Json(GreetingResponse {
        greeting: chat_greeting(&user),
        revision: state.bus.revision(),
    }))
}

pub async fn record_activity(
    State(state): State<AppState>,
    Json(payload): Json<ActivityRequest>,
) -> Result<Json<ActivityResponse>> {
    let mut store = state.store.lock().await;
    let ctx = session::require(&store)?;
    let outcome = engine::record_activity(
        &mut store,
        &state.bus,
        &ctx,
        &payload.category,
        payload.weight_kg,
    )
    .await?
    .ok_or(AppError::NotLoggedIn)?;
    Ok(Json(to_response(outcome, state.bus.revision())))
}

pub async fn classify(
    State(state): State<AppState>,
    Json(payload): Json<ClassifyRequest>,
) -> Result<Json<ClassifyResponse>> {
    if payload.image.trim().is_empty() {
        return Err(AppError::bad_request("image is required"));
    }
    let ctx = current_session(&state).await?;
    let _guard = state.in_flight.acquire(&ctx.user_id)?;

    let weight_kg = match payload.weight_kg {
        Some(weight_kg) => {
            engine::validate_weight(weight_kg)?;
            weight_kg
        }
        None => estimated_weight(&mut rand::thread_rng()),
    };

    let classification = state.backend.classify_or_fallback(&payload.image).await;
    // Simulated results are shown but not credited to the user.
    let activity = if classification.simulated {
        None
    } else {
        let mut store = state.store.lock().await;
        engine::record_activity(
            &mut store,
            &state.bus,
            &ctx,
            classification.category.as_str(),
            weight_kg,
        )
        .await?
        .map(|outcome| to_response(outcome, state.bus.revision()))
    };

    Ok(Json(ClassifyResponse {
        classification,
        activity,
    }))
}

pub async fn chat(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(AppError::bad_request("message is required"));
    }
    current_session(&state).await?;

    let response = match state.backend.chat(message).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!(error = %err, "chat failed");
            CHAT_APOLOGY.to_string()
        }
    };
    Ok(Json(ChatResponse { response }))
}

async fn current_session(state: &AppState) -> Result<SessionContext> {
    let store = state.store.lock().await;
    session::require(&store)
}

async fn current_user(state: &AppState) -> Result<(SessionContext, UserRecord)> {
    let store = state.store.lock().await;
    let ctx = session::require(&store)?;
    let user = store.get(&ctx.user_id)?.ok_or(AppError::NotLoggedIn)?;
    Ok((ctx, user))
}

fn to_response(outcome: ActivityOutcome, revision: u64) -> ActivityResponse {
    ActivityResponse {
        category: outcome.category,
        weight_kg: outcome.weight_kg,
        points_earned: outcome.points_earned,
        co2_saved: outcome.co2_saved,
        unlocked: outcome.unlocked.iter().map(|name| name.to_string()).collect(),
        stats: home_stats(&outcome.record, revision),
    }
}
