use std::sync::Arc;

use axum::extract::FromRef;
use time::{Date, OffsetDateTime};
use tracing::{info, warn};

use crate::{
    auth::{
        dto::{iso_date, LoginRequest, RegisterRequest, TokenPair},
        jwt::{JwtKeys, TokenIssuer},
        password::{burn_verification, hash_password, verify_password},
        repo::UserStore,
        repo_types::{Account, Gender, NewAccount, Role},
        validation::{
            ensure_confirmed, ensure_email_available, ensure_username_available, exceeds,
            is_valid_email, is_valid_username, normalize_email, PasswordContext, PasswordPolicy,
            MAX_NAME_LENGTH,
        },
    },
    error::{AuthError, FieldErrors},
    state::AppState,
    users::dto::{ChangePasswordRequest, DashboardResponse, ProfileResponse, UpdateProfileRequest},
};

/// Takes a required text field, trimming it; records `required` if absent.
fn required(errors: &mut FieldErrors, field: &'static str, value: Option<String>) -> Option<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Some(v),
        _ => {
            errors.required(field);
            None
        }
    }
}

/// Like [`required`] but keeps the value untouched, for passwords.
fn required_secret(
    errors: &mut FieldErrors,
    field: &'static str,
    value: Option<String>,
) -> Option<String> {
    match value {
        Some(v) if !v.is_empty() => Some(v),
        _ => {
            errors.required(field);
            None
        }
    }
}

/// A required name, at most [`MAX_NAME_LENGTH`] characters.
fn name(errors: &mut FieldErrors, field: &'static str, value: Option<String>) -> Option<String> {
    let value = required(errors, field, value)?;
    if exceeds(&value, MAX_NAME_LENGTH) {
        errors.add(
            field,
            "invalid",
            format!("Ensure this field has no more than {MAX_NAME_LENGTH} characters."),
        );
        return None;
    }
    Some(value)
}

/// Parses optional text with `parse`. Blank input is `Some(None)`; text
/// `parse` rejects is recorded under `field` and yields `None`.
fn optional<T>(
    errors: &mut FieldErrors,
    field: &'static str,
    value: Option<String>,
    parse: impl FnOnce(&str) -> Option<T>,
    message: &'static str,
) -> Option<Option<T>> {
    let Some(text) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        return Some(None);
    };
    match parse(&text) {
        Some(parsed) => Some(Some(parsed)),
        None => {
            errors.add(field, "invalid", message);
            None
        }
    }
}

fn parse_gender(errors: &mut FieldErrors, value: Option<String>) -> Option<Option<Gender>> {
    optional(
        errors,
        "gender",
        value,
        |s| s.parse().ok(),
        "Select a valid choice: M, F or O.",
    )
}

fn parse_date_of_birth(
    errors: &mut FieldErrors,
    value: Option<String>,
) -> Option<Option<Date>> {
    optional(
        errors,
        "date_of_birth",
        value,
        |s| iso_date::parse(s).ok(),
        "Enter a valid date in YYYY-MM-DD format.",
    )
}

/// Moves a field-level failure into `errors`; anything else is returned.
fn collect(
    errors: &mut FieldErrors,
    field: &'static str,
    result: Result<(), AuthError>,
) -> Result<(), AuthError> {
    match result {
        Err(e) if e.is_field_level() => {
            errors.add_error(field, &e);
            Ok(())
        }
        other => other,
    }
}

/// Verifies identifier + password pairs.
#[derive(Clone)]
pub struct Authenticator {
    users: Arc<dyn UserStore>,
}

impl Authenticator {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// An identifier containing `@` is looked up as an email, anything else
    /// as a username. Unknown identifiers and wrong passwords fail the same
    /// way; a disabled account is only reported once the password matched.
    pub async fn authenticate(&self, identifier: &str, password: &str) -> Result<Account, AuthError> {
        let identifier = identifier.trim();
        let found = if identifier.contains('@') {
            self.users.find_by_email(&normalize_email(identifier)).await?
        } else {
            self.users.find_by_username(identifier).await?
        };

        let Some(mut account) = found else {
            burn_verification(password);
            warn!(identifier = %identifier, "login unknown identifier");
            return Err(AuthError::invalid_credentials());
        };

        if !verify_password(password, &account.password_hash)? {
            warn!(user_id = account.id, "login invalid password");
            return Err(AuthError::invalid_credentials());
        }

        if !account.is_active {
            warn!(user_id = account.id, "login to disabled account");
            return Err(AuthError::AccountDisabled);
        }

        let now = OffsetDateTime::now_utc();
        self.users.touch_last_login(account.id, now).await?;
        account.last_login = Some(now);
        Ok(account)
    }
}

/// Registration, login, logout, profile and password operations.
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    authenticator: Authenticator,
    tokens: TokenIssuer,
    policy: PasswordPolicy,
}

impl FromRef<AppState> for AccountService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(
            state.users.clone(),
            TokenIssuer::new(JwtKeys::from_ref(state), state.revoked.clone()),
            PasswordPolicy::new(state.config.password_min_length),
        )
    }
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, tokens: TokenIssuer, policy: PasswordPolicy) -> Self {
        Self {
            authenticator: Authenticator::new(users.clone()),
            users,
            tokens,
            policy,
        }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<(Account, TokenPair), AuthError> {
        let mut errors = FieldErrors::new();

        let username = required(&mut errors, "username", req.username);
        let email = required(&mut errors, "email", req.email).map(|e| normalize_email(&e));
        let first_name = name(&mut errors, "first_name", req.first_name);
        let last_name = name(&mut errors, "last_name", req.last_name);
        let gender = parse_gender(&mut errors, req.gender).flatten();
        let date_of_birth = parse_date_of_birth(&mut errors, req.date_of_birth).flatten();
        let password = required_secret(&mut errors, "password", req.password);
        let confirmation = required_secret(&mut errors, "password_confirm", req.password_confirm);

        if let Some(username) = &username {
            if !is_valid_username(username) {
                errors.add(
                    "username",
                    "invalid",
                    "Enter a valid username. Use at most 150 letters, digits and @/./+/-/_.",
                );
            } else {
                collect(
                    &mut errors,
                    "username",
                    ensure_username_available(self.users.as_ref(), username).await,
                )?;
            }
        }

        if let Some(email) = &email {
            if !is_valid_email(email) {
                errors.add("email", "invalid", "Enter a valid email address.");
            } else {
                collect(
                    &mut errors,
                    "email",
                    ensure_email_available(self.users.as_ref(), email).await,
                )?;
            }
        }

        if let Some(password) = &password {
            let ctx = PasswordContext {
                username: username.as_deref().unwrap_or_default(),
                email: email.as_deref().unwrap_or_default(),
                first_name: first_name.as_deref().unwrap_or_default(),
                last_name: last_name.as_deref().unwrap_or_default(),
            };
            collect(&mut errors, "password", self.policy.validate(password, &ctx))?;
            if let Some(confirmation) = &confirmation {
                collect(
                    &mut errors,
                    "password_confirm",
                    ensure_confirmed(password, confirmation),
                )?;
            }
        }

        errors.into_result()?;
        let (Some(username), Some(email), Some(first_name), Some(last_name), Some(password)) =
            (username, email, first_name, last_name, password)
        else {
            return Err(AuthError::Internal(anyhow::anyhow!(
                "registration passed validation with a missing field"
            )));
        };

        let password_hash = hash_password(&password)?;
        let account = self
            .users
            .insert(NewAccount {
                username,
                email,
                password_hash,
                first_name,
                last_name,
                gender,
                date_of_birth,
                role: Role::Customer,
            })
            .await
            .map_err(|e| match e {
                // Lost the race against a concurrent registration.
                AuthError::DuplicateEmail => field_error("email", e),
                AuthError::DuplicateUsername => field_error("username", e),
                other => other,
            })?;

        let tokens = self.tokens.issue_pair(account.id)?;
        info!(user_id = account.id, username = %account.username, "user registered");
        Ok((account, tokens))
    }

    pub async fn login(&self, req: LoginRequest) -> Result<(Account, TokenPair), AuthError> {
        let mut errors = FieldErrors::new();
        let identifier = required(&mut errors, "identifier", req.identifier);
        let password = required_secret(&mut errors, "password", req.password);
        errors.into_result()?;
        let (Some(identifier), Some(password)) = (identifier, password) else {
            return Err(AuthError::invalid_credentials());
        };

        let account = self.authenticator.authenticate(&identifier, &password).await?;
        let tokens = self.tokens.issue_pair(account.id)?;
        info!(user_id = account.id, username = %account.username, "user logged in");
        Ok((account, tokens))
    }

    /// Revokes `refresh_token`. Every failure is reported as
    /// [`AuthError::LogoutFailed`]; the cause is only logged.
    pub async fn logout(&self, account: &Account, refresh_token: Option<&str>) -> Result<(), AuthError> {
        let Some(token) = refresh_token.map(str::trim).filter(|t| !t.is_empty()) else {
            warn!(user_id = account.id, "logout without refresh token");
            return Err(AuthError::LogoutFailed);
        };

        match self.revoke_own(account, token).await {
            Ok(()) => {
                info!(user_id = account.id, "user logged out");
                Ok(())
            }
            Err(e) => {
                warn!(user_id = account.id, error = %e, "logout failed");
                Err(AuthError::LogoutFailed)
            }
        }
    }

    async fn revoke_own(&self, account: &Account, token: &str) -> Result<(), AuthError> {
        let claims = self.tokens.validate_refresh(token).await?;
        if claims.sub != account.id {
            warn!(user_id = account.id, token_owner = claims.sub, "refresh token of another account");
            return Err(AuthError::InvalidToken);
        }
        self.tokens.revoke(token).await?;
        Ok(())
    }

    /// Exchanges a refresh token for a new access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, AuthError> {
        let claims = self.tokens.validate_refresh(refresh_token).await?;
        match self.users.find_by_id(claims.sub).await? {
            Some(account) if account.is_active => self.tokens.access_for(&claims),
            _ => {
                warn!(user_id = claims.sub, "refresh for missing or disabled account");
                Err(AuthError::InvalidToken)
            }
        }
    }

    /// Resolves the bearer identity into its account.
    pub async fn current(&self, user_id: i64) -> Result<Account, AuthError> {
        match self.users.find_by_id(user_id).await? {
            Some(account) if account.is_active => Ok(account),
            Some(_) => Err(AuthError::Unauthorized("User is inactive")),
            None => Err(AuthError::Unauthorized("User not found")),
        }
    }

    pub fn profile(&self, account: &Account) -> ProfileResponse {
        ProfileResponse::from(account)
    }

    /// Applies `changes` to the account. A full update (`partial == false`)
    /// requires every required field to be present.
    pub async fn update_profile(
        &self,
        mut account: Account,
        changes: UpdateProfileRequest,
        partial: bool,
    ) -> Result<Account, AuthError> {
        let mut errors = FieldErrors::new();

        match changes.email {
            Some(email) => {
                let email = normalize_email(&email);
                if email.is_empty() {
                    errors.required("email");
                } else if !is_valid_email(&email) {
                    errors.add("email", "invalid", "Enter a valid email address.");
                } else {
                    if email != account.email {
                        collect(
                            &mut errors,
                            "email",
                            ensure_email_available(self.users.as_ref(), &email).await,
                        )?;
                    }
                    account.email = email;
                }
            }
            None if !partial => errors.required("email"),
            None => {}
        }

        if changes.first_name.is_some() || !partial {
            if let Some(v) = name(&mut errors, "first_name", changes.first_name) {
                account.first_name = v;
            }
        }
        if changes.last_name.is_some() || !partial {
            if let Some(v) = name(&mut errors, "last_name", changes.last_name) {
                account.last_name = v;
            }
        }
        if let Some(value) = changes.gender {
            if let Some(parsed) = parse_gender(&mut errors, value) {
                account.gender = parsed;
            }
        }
        if let Some(value) = changes.date_of_birth {
            if let Some(parsed) = parse_date_of_birth(&mut errors, value) {
                account.date_of_birth = parsed;
            }
        }

        errors.into_result()?;
        let updated = self.users.update_profile(&account).await.map_err(|e| match e {
            AuthError::DuplicateEmail => field_error("email", e),
            other => other,
        })?;
        info!(user_id = updated.id, "profile updated");
        Ok(updated)
    }

    /// Checks, in order: old password, confirmation, policy. The stored
    /// hash is only touched once all three pass.
    pub async fn change_password(
        &self,
        account: &Account,
        req: ChangePasswordRequest,
    ) -> Result<(), AuthError> {
        let mut errors = FieldErrors::new();
        let old = required_secret(&mut errors, "old_password", req.old_password);
        let new = required_secret(&mut errors, "new_password", req.new_password);
        let confirm = required_secret(&mut errors, "confirm_password", req.confirm_password);
        errors.into_result()?;
        let (Some(old), Some(new), Some(confirm)) = (old, new, confirm) else {
            return Err(AuthError::PasswordMismatch);
        };

        if !verify_password(&old, &account.password_hash)? {
            warn!(user_id = account.id, "change password with wrong old password");
            return Err(AuthError::old_password_incorrect());
        }
        ensure_confirmed(&new, &confirm)?;
        self.policy.validate(
            &new,
            &PasswordContext {
                username: &account.username,
                email: &account.email,
                first_name: &account.first_name,
                last_name: &account.last_name,
            },
        )?;

        let hash = hash_password(&new)?;
        self.users.set_password_hash(account.id, &hash).await?;
        info!(user_id = account.id, "password changed");
        Ok(())
    }

    pub fn dashboard(&self, account: &Account) -> DashboardResponse {
        DashboardResponse::from(account)
    }
}

fn field_error(field: &'static str, err: AuthError) -> AuthError {
    let mut errors = FieldErrors::new();
    errors.add_error(field, &err);
    AuthError::Validation(errors)
}
