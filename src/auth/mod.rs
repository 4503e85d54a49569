use crate::state::AppState;
use axum::Router;

mod claims;
pub mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod jwt;
pub mod memory;
mod password;
pub mod repo;
pub mod repo_types;
pub mod revocation;
pub mod services;
pub mod validation;

pub use claims::{Claims, TokenKind};
pub use extractors::AuthUser;
pub use jwt::{JwtKeys, TokenIssuer};
pub use repo::{PgUserStore, UserStore};
pub use repo_types::{Account, Gender, Role};
pub use revocation::{PgRevokedTokens, RevokedTokens};
pub use services::{AccountService, Authenticator};

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
