use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{dto::MessageResponse, extractors::AuthUser, services::AccountService},
    error::AuthError,
    state::AppState,
    users::dto::{
        ChangePasswordRequest, DashboardResponse, ProfileResponse, ProfileUpdatedResponse,
        UpdateProfileRequest,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/profile",
            get(get_profile).put(put_profile).patch(patch_profile),
        )
        .route("/users/change-password", post(change_password))
        .route("/users/dashboard", get(dashboard))
}

#[instrument(skip(accounts))]
pub async fn get_profile(
    State(accounts): State<AccountService>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ProfileResponse>, AuthError> {
    let account = accounts.current(user_id).await?;
    Ok(Json(accounts.profile(&account)))
}

#[instrument(skip(accounts, payload))]
pub async fn put_profile(
    State(accounts): State<AccountService>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<ProfileUpdatedResponse>, AuthError> {
    update(accounts, user_id, payload, false).await
}

#[instrument(skip(accounts, payload))]
pub async fn patch_profile(
    State(accounts): State<AccountService>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<ProfileUpdatedResponse>, AuthError> {
    update(accounts, user_id, payload, true).await
}

async fn update(
    accounts: AccountService,
    user_id: i64,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
    partial: bool,
) -> Result<Json<ProfileUpdatedResponse>, AuthError> {
    let Json(changes) = payload?;
    let account = accounts.current(user_id).await?;
    let updated = accounts.update_profile(account, changes, partial).await?;
    Ok(Json(ProfileUpdatedResponse {
        message: "Profile updated",
        profile: accounts.profile(&updated),
    }))
}

#[instrument(skip(accounts, payload))]
pub async fn change_password(
    State(accounts): State<AccountService>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AuthError> {
    let Json(req) = payload?;
    let account = accounts.current(user_id).await?;
    accounts.change_password(&account, req).await?;
    Ok(Json(MessageResponse {
        message: "Password changed",
    }))
}

#[instrument(skip(accounts))]
pub async fn dashboard(
    State(accounts): State<AccountService>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<DashboardResponse>, AuthError> {
    let account = accounts.current(user_id).await?;
    Ok(Json(accounts.dashboard(&account)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::dto::RegisterRequest;
    use crate::config::AppConfig;
    use axum::{extract::FromRef, http::StatusCode, response::IntoResponse};

    async fn registered() -> (AccountService, i64) {
        let accounts =
            AccountService::from_ref(&AppState::in_memory(AppConfig::ephemeral("secret")));
        let req: RegisterRequest = serde_json::from_str(
            r#"{"username":"alice","email":"a@x.com","password":"longpass1",
                "password_confirm":"longpass1","first_name":"A","last_name":"L","gender":"F"}"#,
        )
        .unwrap();
        let (account, _) = accounts.register(req).await.unwrap();
        (accounts, account.id)
    }

    #[tokio::test]
    async fn profile_round_trip_through_handlers() {
        let (accounts, id) = registered().await;

        let Json(profile) = get_profile(State(accounts.clone()), AuthUser(id))
            .await
            .unwrap();
        assert_eq!(profile.username, "alice");

        let changes: UpdateProfileRequest =
            serde_json::from_str(r#"{"last_name":"Liddell","role":"admin"}"#).unwrap();
        let Json(updated) = patch_profile(State(accounts), AuthUser(id), Ok(Json(changes)))
            .await
            .unwrap();
        let json = serde_json::to_value(&updated).unwrap();
        assert_eq!(json["message"], "Profile updated");
        assert_eq!(json["last_name"], "Liddell");
        assert_eq!(json["role"], "customer");
    }

    #[tokio::test]
    async fn unknown_user_is_unauthorized() {
        let (accounts, _) = registered().await;
        let err = dashboard(State(accounts), AuthUser(999)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_old_password_is_bad_request() {
        let (accounts, id) = registered().await;
        let req: ChangePasswordRequest = serde_json::from_str(
            r#"{"old_password":"nope","new_password":"brandnew99","confirm_password":"brandnew99"}"#,
        )
        .unwrap();
        let err = change_password(State(accounts), AuthUser(id), Ok(Json(req)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_credentials");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn dashboard_has_placeholder_stats() {
        let (accounts, id) = registered().await;
        let Json(body) = dashboard(State(accounts), AuthUser(id)).await.unwrap();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["user"]["email"], "a@x.com");
        assert_eq!(json["stats"]["total_orders"], 0);
        assert_eq!(json["stats"]["cart_items"], 0);
    }
}
