use std::collections::BTreeMap;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::error;

/// One problem attached to a request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub code: &'static str,
    pub message: String,
}

/// Field name -> problems, in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<FieldError>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, code: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(FieldError {
            code,
            message: message.into(),
        });
    }

    pub fn required(&mut self, field: &'static str) {
        self.add(field, "required", "This field is required.");
    }

    /// Records a field-level `AuthError` under `field`, keeping its code.
    pub fn add_error(&mut self, field: &'static str, err: &AuthError) {
        match err {
            AuthError::WeakPassword(reasons) => {
                for reason in reasons {
                    self.add(field, err.code(), reason.clone());
                }
            }
            AuthError::Validation(inner) => {
                for problem in inner.0.values().flatten() {
                    self.add(field, problem.code, problem.message.clone());
                }
            }
            other => self.add(field, other.code(), other.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[FieldError]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn has(&self, field: &str, code: &str) -> bool {
        self.get(field)
            .map(|problems| problems.iter().any(|p| p.code == code))
            .unwrap_or(false)
    }

    pub fn into_result(self) -> Result<(), AuthError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Validation(self))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid input")]
    Validation(FieldErrors),

    #[error("A user with that email already exists")]
    DuplicateEmail,

    #[error("A user with that username already exists")]
    DuplicateUsername,

    #[error("{}", .0.join(" "))]
    WeakPassword(Vec<String>),

    #[error("Password and confirmation do not match")]
    PasswordMismatch,

    #[error("{reason}")]
    InvalidCredentials { reason: &'static str },

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Token is invalid or expired")]
    InvalidToken,

    #[error("Logout failed")]
    LogoutFailed,

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn invalid_credentials() -> Self {
        Self::InvalidCredentials {
            reason: "Invalid credentials",
        }
    }

    pub fn old_password_incorrect() -> Self {
        Self::InvalidCredentials {
            reason: "Old password is incorrect",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "validation_error",
            AuthError::DuplicateEmail => "duplicate_email",
            AuthError::DuplicateUsername => "duplicate_username",
            AuthError::WeakPassword(_) => "weak_password",
            AuthError::PasswordMismatch => "password_mismatch",
            AuthError::InvalidCredentials { .. } => "invalid_credentials",
            AuthError::AccountDisabled => "account_disabled",
            AuthError::InvalidToken => "invalid_token",
            AuthError::LogoutFailed => "logout_failed",
            AuthError::Unauthorized(_) => "unauthorized",
            AuthError::MalformedBody(_) => "malformed_body",
            AuthError::Database(_) | AuthError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidToken | AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::Database(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Problems that belong to a single input field rather than the request.
    pub fn is_field_level(&self) -> bool {
        matches!(
            self,
            AuthError::Validation(_)
                | AuthError::DuplicateEmail
                | AuthError::DuplicateUsername
                | AuthError::WeakPassword(_)
                | AuthError::PasswordMismatch
        )
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AuthError::Database(e) => {
                error!(error = %e, "database error");
                json!({ "error": self.code(), "message": "An internal error occurred" })
            }
            AuthError::Internal(e) => {
                error!(error = %e, "internal error");
                json!({ "error": self.code(), "message": "An internal error occurred" })
            }
            AuthError::Validation(fields) => {
                json!({ "error": self.code(), "message": self.to_string(), "fields": fields })
            }
            _ => json!({ "error": self.code(), "message": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::MalformedBody(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_keep_codes_of_wrapped_errors() {
        let mut errors = FieldErrors::new();
        errors.add_error("email", &AuthError::DuplicateEmail);
        errors.add_error(
            "password",
            &AuthError::WeakPassword(vec!["too short".into(), "too common".into()]),
        );
        errors.required("first_name");

        assert!(errors.has("email", "duplicate_email"));
        assert_eq!(errors.get("password").map(|p| p.len()), Some(2));
        assert!(errors.has("first_name", "required"));
        assert!(!errors.has("last_name", "required"));
    }

    #[test]
    fn empty_field_errors_are_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(AuthError::invalid_credentials().status(), StatusCode::BAD_REQUEST);
        assert_eq!(AuthError::AccountDisabled.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AuthError::LogoutFailed.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AuthError::InvalidToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn credential_errors_share_a_code() {
        assert_eq!(AuthError::invalid_credentials().code(), "invalid_credentials");
        assert_eq!(AuthError::old_password_incorrect().code(), "invalid_credentials");
        assert_eq!(
            AuthError::old_password_incorrect().to_string(),
            "Old password is incorrect"
        );
    }

    #[test]
    fn validation_response_carries_fields() {
        let mut errors = FieldErrors::new();
        errors.required("username");
        let res = AuthError::Validation(errors).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
