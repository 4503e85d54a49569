use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AuthError;

/// Persisted set of refresh tokens that may no longer be used.
#[async_trait]
pub trait RevokedTokens: Send + Sync {
    /// Adds `jti` to the set. Returns `false` if it was already there.
    async fn revoke(
        &self,
        jti: Uuid,
        user_id: i64,
        expires_at: OffsetDateTime,
    ) -> Result<bool, AuthError>;

    async fn is_revoked(&self, jti: Uuid) -> Result<bool, AuthError>;
}

#[derive(Clone)]
pub struct PgRevokedTokens {
    db: PgPool,
}

impl PgRevokedTokens {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RevokedTokens for PgRevokedTokens {
    async fn revoke(
        &self,
        jti: Uuid,
        user_id: i64,
        expires_at: OffsetDateTime,
    ) -> Result<bool, AuthError> {
        let done = sqlx::query(
            r#"
            INSERT INTO token_blacklist (jti, user_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (jti) DO NOTHING
            "#,
        )
        .bind(jti)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.db)
        .await?;
        Ok(done.rows_affected() == 1)
    }

    async fn is_revoked(&self, jti: Uuid) -> Result<bool, AuthError> {
        let revoked: bool = sqlx::query_scalar(
            r#"SELECT EXISTS (SELECT 1 FROM token_blacklist WHERE jti = $1)"#,
        )
        .bind(jti)
        .fetch_one(&self.db)
        .await?;
        Ok(revoked)
    }
}
