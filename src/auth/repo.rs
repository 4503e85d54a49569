use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::auth::repo_types::{Account, NewAccount, UserRow};
use crate::error::AuthError;

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, gender, \
     date_of_birth, role, is_active, is_staff, is_superuser, date_joined, last_login";

/// Persistent record of accounts.
///
/// Implementations must enforce username and email uniqueness atomically and
/// report a collision as [`AuthError::DuplicateUsername`] /
/// [`AuthError::DuplicateEmail`].
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, AuthError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, AuthError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError>;
    async fn email_exists(&self, email: &str) -> Result<bool, AuthError>;
    async fn username_exists(&self, username: &str) -> Result<bool, AuthError>;
    async fn insert(&self, account: NewAccount) -> Result<Account, AuthError>;
    /// Writes the mutable profile fields of `account` back.
    async fn update_profile(&self, account: &Account) -> Result<Account, AuthError>;
    async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<(), AuthError>;
    async fn touch_last_login(&self, id: i64, at: OffsetDateTime) -> Result<(), AuthError>;
    async fn set_active(&self, id: i64, active: bool) -> Result<(), AuthError>;
}

/// PostgreSQL-backed [`UserStore`].
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Account>, AuthError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Account::try_from).transpose()?)
    }
}

fn map_unique_violation(err: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            match db_err.constraint() {
                Some("users_email_key") => return AuthError::DuplicateEmail,
                Some("users_username_key") => return AuthError::DuplicateUsername,
                _ => {}
            }
        }
    }
    AuthError::Database(err)
}

fn expect_row(rows_affected: u64, id: i64) -> Result<(), AuthError> {
    if rows_affected == 0 {
        return Err(AuthError::Internal(anyhow::anyhow!("user {id} does not exist")));
    }
    Ok(())
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, AuthError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Account::try_from).transpose()?)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, AuthError> {
        self.find_one("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError> {
        self.find_one("email", email).await
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AuthError> {
        let exists: bool =
            sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)"#)
                .bind(email)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn username_exists(&self, username: &str) -> Result<bool, AuthError> {
        let exists: bool =
            sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)"#)
                .bind(username)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn insert(&self, account: NewAccount) -> Result<Account, AuthError> {
        let sql = format!(
            r#"
            INSERT INTO users (username, email, password_hash, first_name, last_name,
                               gender, date_of_birth, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(&account.first_name)
            .bind(&account.last_name)
            .bind(account.gender.map(|g| g.as_str()))
            .bind(account.date_of_birth)
            .bind(account.role.as_str())
            .fetch_one(&self.db)
            .await
            .map_err(map_unique_violation)?;
        Ok(Account::try_from(row)?)
    }

    async fn update_profile(&self, account: &Account) -> Result<Account, AuthError> {
        let sql = format!(
            r#"
            UPDATE users
               SET email = $2, first_name = $3, last_name = $4, gender = $5, date_of_birth = $6
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(account.id)
            .bind(&account.email)
            .bind(&account.first_name)
            .bind(&account.last_name)
            .bind(account.gender.map(|g| g.as_str()))
            .bind(account.date_of_birth)
            .fetch_one(&self.db)
            .await
            .map_err(map_unique_violation)?;
        Ok(Account::try_from(row)?)
    }

    async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<(), AuthError> {
        let done = sqlx::query(r#"UPDATE users SET password_hash = $2 WHERE id = $1"#)
            .bind(id)
            .bind(password_hash)
            .execute(&self.db)
            .await?;
        expect_row(done.rows_affected(), id)
    }

    async fn touch_last_login(&self, id: i64, at: OffsetDateTime) -> Result<(), AuthError> {
        let done = sqlx::query(r#"UPDATE users SET last_login = $2 WHERE id = $1"#)
            .bind(id)
            .bind(at)
            .execute(&self.db)
            .await?;
        expect_row(done.rows_affected(), id)
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<(), AuthError> {
        let done = sqlx::query(r#"UPDATE users SET is_active = $2 WHERE id = $1"#)
            .bind(id)
            .bind(active)
            .execute(&self.db)
            .await?;
        expect_row(done.rows_affected(), id)
    }
}
