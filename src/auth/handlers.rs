use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            AccessTokenResponse, AuthResponse, LoginRequest, LogoutRequest, MessageResponse,
            PublicUser, RefreshRequest, RegisterRequest,
        },
        extractors::AuthUser,
        services::AccountService,
    },
    error::AuthError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/auth/register", post(register))
        .route("/users/auth/login", post(login))
        .route("/users/auth/logout", post(logout))
        .route("/users/auth/refresh", post(refresh))
}

#[instrument(skip(accounts, payload))]
pub async fn register(
    State(accounts): State<AccountService>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AuthError> {
    let Json(payload) = payload?;
    let (account, tokens) = accounts.register(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "Registration successful",
            user: PublicUser::from(&account),
            tokens,
        }),
    ))
}

#[instrument(skip(accounts, payload))]
pub async fn login(
    State(accounts): State<AccountService>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AuthError> {
    let Json(payload) = payload?;
    let (account, tokens) = accounts.login(payload).await?;
    Ok(Json(AuthResponse {
        message: "Login successful",
        user: PublicUser::from(&account),
        tokens,
    }))
}

#[instrument(skip(accounts, payload))]
pub async fn logout(
    State(accounts): State<AccountService>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<LogoutRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AuthError> {
    let account = accounts.current(user_id).await?;
    // An unreadable body is just another failed logout.
    let refresh_token = payload.ok().and_then(|Json(p)| p.refresh_token);
    accounts.logout(&account, refresh_token.as_deref()).await?;
    Ok(Json(MessageResponse {
        message: "Logout successful",
    }))
}

#[instrument(skip(accounts, payload))]
pub async fn refresh(
    State(accounts): State<AccountService>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<AccessTokenResponse>, AuthError> {
    let Json(payload) = payload?;
    let access = accounts.refresh(&payload.refresh_token).await?;
    Ok(Json(AccessTokenResponse { access }))
}
