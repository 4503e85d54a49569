use serde::{Deserialize, Serialize};

use crate::auth::repo_types::{Account, Role};

/// `YYYY-MM-DD` parsing and serialization for optional dates.
pub(crate) mod iso_date {
    use serde::Serializer;
    use time::{macros::format_description, Date};

    pub fn parse(s: &str) -> Result<Date, time::error::Parse> {
        Date::parse(s, format_description!("[year]-[month]-[day]"))
    }

    pub fn serialize<S: Serializer>(date: &Option<Date>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => {
                let text = d
                    .format(format_description!("[year]-[month]-[day]"))
                    .map_err(serde::ser::Error::custom)?;
                s.serialize_some(&text)
            }
            None => s.serialize_none(),
        }
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
pub(crate) fn deserialize_patch<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

/// Request body for user registration.
///
/// Every field is optional at the type level so that missing fields are
/// reported together with the other validation problems.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_confirm: Option<String>,
    /// `M`, `F` or `O`; checked by the service.
    #[serde(default)]
    pub gender: Option<String>,
    /// `YYYY-MM-DD`; checked by the service.
    #[serde(default, alias = "dob")]
    pub date_of_birth: Option<String>,
}

/// Request body for login. The identifier is a username or an email.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default, alias = "username")]
    pub identifier: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Request body for logout.
#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(alias = "refresh")]
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Response returned after login or register.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: &'static str,
    pub user: PublicUser,
    pub tokens: TokenPair,
}

/// Response returned after a token refresh.
#[derive(Debug, Serialize)]
pub struct AccessTokenResponse {
    pub access: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

impl From<&Account> for PublicUser {
    fn from(a: &Account) -> Self {
        Self {
            id: a.id,
            username: a.username.clone(),
            email: a.email.clone(),
            first_name: a.first_name.clone(),
            last_name: a.last_name.clone(),
            role: a.role,
        }
    }
}
