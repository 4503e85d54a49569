use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    auth::{
        claims::{Claims, TokenKind},
        dto::TokenPair,
        revocation::RevokedTokens,
    },
    config::JwtConfig,
    error::AuthError,
    state::AppState,
};

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
            refresh_ttl_minutes,
        } = cfg.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            access_ttl: Duration::from_secs((ttl_minutes.max(0) as u64) * 60),
            refresh_ttl: Duration::from_secs((refresh_ttl_minutes.max(0) as u64) * 60),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from(&state.config.jwt)
    }
}

impl JwtKeys {
    fn sign_with_kind(&self, user_id: i64, kind: TokenKind) -> Result<String, AuthError> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
            jti: Uuid::new_v4(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(e.into()))?;
        debug!(user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: i64) -> Result<String, AuthError> {
        self.sign_with_kind(user_id, TokenKind::Access)
    }
    pub fn sign_refresh(&self, user_id: i64) -> Result<String, AuthError> {
        self.sign_with_kind(user_id, TokenKind::Refresh)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            AuthError::InvalidToken
        })?;
        debug!(user_id = data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Access {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }
}

/// Mints token pairs and manages the refresh-token revocation set.
#[derive(Clone)]
pub struct TokenIssuer {
    keys: JwtKeys,
    revoked: Arc<dyn RevokedTokens>,
}

impl TokenIssuer {
    pub fn new(keys: JwtKeys, revoked: Arc<dyn RevokedTokens>) -> Self {
        Self { keys, revoked }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    pub fn issue_pair(&self, user_id: i64) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access: self.keys.sign_access(user_id)?,
            refresh: self.keys.sign_refresh(user_id)?,
        })
    }

    /// Checks signature, expiry, kind and the revocation set.
    pub async fn validate_refresh(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.keys.verify_refresh(token)?;
        if self.revoked.is_revoked(claims.jti).await? {
            warn!(user_id = claims.sub, jti = %claims.jti, "revoked refresh token presented");
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// Mints a fresh access token for the subject of `claims`.
    pub fn access_for(&self, claims: &Claims) -> Result<String, AuthError> {
        self.keys.sign_access(claims.sub)
    }

    /// Blacklists a refresh token. Fails with [`AuthError::InvalidToken`]
    /// when the token is malformed, expired or already revoked.
    pub async fn revoke(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.validate_refresh(token).await?;
        if !self
            .revoked
            .revoke(claims.jti, claims.sub, claims.expires_at())
            .await?
        {
            return Err(AuthError::InvalidToken);
        }
        debug!(user_id = claims.sub, jti = %claims.jti, "refresh token revoked");
        Ok(claims)
    }
}
