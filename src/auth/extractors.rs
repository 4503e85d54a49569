use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::jwt::JwtKeys;
use crate::error::AuthError;

/// Extracts and validates a bearer access token, returning the account ID.
pub struct AuthUser(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Read Authorization header
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::Unauthorized("Missing Authorization header"))?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or(AuthError::Unauthorized("Invalid Authorization header"))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify_access(token).map_err(|_| {
            warn!("invalid or expired access token");
            AuthError::Unauthorized("Invalid or expired token")
        })?;

        Ok(AuthUser(claims.sub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::AppState;
    use axum::http::{header::AUTHORIZATION, Request};

    async fn extract(state: &AppState, header: Option<String>) -> Result<AuthUser, AuthError> {
        let mut builder = Request::builder().uri("/users/profile");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthUser::from_request_parts(&mut parts, state).await
    }

    #[tokio::test]
    async fn accepts_bearer_access_token() {
        let state = AppState::in_memory(AppConfig::ephemeral("secret"));
        let token = JwtKeys::from_ref(&state).sign_access(9).unwrap();
        let AuthUser(id) = extract(&state, Some(format!("Bearer {token}"))).await.unwrap();
        assert_eq!(id, 9);
    }

    #[tokio::test]
    async fn rejects_missing_header_and_refresh_tokens() {
        let state = AppState::in_memory(AppConfig::ephemeral("secret"));
        assert!(matches!(
            extract(&state, None).await,
            Err(AuthError::Unauthorized(_))
        ));

        let refresh = JwtKeys::from_ref(&state).sign_refresh(9).unwrap();
        assert!(matches!(
            extract(&state, Some(format!("Bearer {refresh}"))).await,
            Err(AuthError::Unauthorized(_))
        ));
        assert!(matches!(
            extract(&state, Some(format!("Token {refresh}"))).await,
            Err(AuthError::Unauthorized(_))
        ));
    }
}
