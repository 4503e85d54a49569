use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::auth::{
    dto::{deserialize_patch, iso_date},
    repo_types::{Account, Gender, Role},
};

/// Profile as shown to its owner.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: Option<Gender>,
    #[serde(serialize_with = "iso_date::serialize")]
    pub date_of_birth: Option<Date>,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub date_joined: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
}

impl From<&Account> for ProfileResponse {
    fn from(a: &Account) -> Self {
        Self {
            id: a.id,
            username: a.username.clone(),
            email: a.email.clone(),
            first_name: a.first_name.clone(),
            last_name: a.last_name.clone(),
            gender: a.gender,
            date_of_birth: a.date_of_birth,
            role: a.role,
            date_joined: a.date_joined,
            last_login: a.last_login,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileUpdatedResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub profile: ProfileResponse,
}

/// Writable profile fields. Read-only fields sent by clients are ignored.
///
/// `gender` and `date_of_birth` distinguish "absent" (`None`) from an
/// explicit `null` (`Some(None)`), which clears the value. Their text is
/// checked by the service so a bad value is reported per field.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_patch")]
    pub gender: Option<Option<String>>,
    #[serde(default, alias = "dob", deserialize_with = "deserialize_patch")]
    pub date_of_birth: Option<Option<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: Option<String>,
    #[serde(default)]
    pub new_password: Option<String>,
    #[serde(default, alias = "confirm_new_password")]
    pub confirm_password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DashboardUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub date_joined: OffsetDateTime,
}

/// Placeholder counters; orders and carts live outside this service.
#[derive(Debug, Default, Serialize)]
pub struct DashboardStats {
    pub total_orders: u64,
    pub cart_items: u64,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub user: DashboardUser,
    pub stats: DashboardStats,
}

impl From<&Account> for DashboardResponse {
    fn from(a: &Account) -> Self {
        Self {
            user: DashboardUser {
                id: a.id,
                username: a.username.clone(),
                email: a.email.clone(),
                role: a.role,
                date_joined: a.date_joined,
            },
            stats: DashboardStats::default(),
        }
    }
}
