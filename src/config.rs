use serde::Deserialize;

/// Floor for the configurable password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub server: ServerConfig,
    pub password_min_length: usize,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "ecommerce-users".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "ecommerce-clients".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        anyhow::ensure!(!jwt.secret.is_empty(), "JWT_SECRET must not be empty");
        anyhow::ensure!(
            jwt.ttl_minutes > 0 && jwt.refresh_ttl_minutes > 0,
            "token lifetimes must be positive"
        );

        let server = ServerConfig {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("APP_PORT", 8080),
        };

        let password_min_length =
            env_or("PASSWORD_MIN_LENGTH", MIN_PASSWORD_LENGTH).max(MIN_PASSWORD_LENGTH);

        Ok(Self {
            database_url,
            jwt,
            server,
            password_min_length,
        })
    }

    /// Configuration for in-process use where no database is involved.
    pub fn ephemeral(secret: &str) -> Self {
        Self {
            database_url: String::new(),
            jwt: JwtConfig {
                secret: secret.into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
            },
            password_min_length: MIN_PASSWORD_LENGTH,
        }
    }
}
