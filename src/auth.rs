use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use rand::{Rng, TryRngCore, distr::Alphanumeric, rngs::OsRng};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use tracing::debug;

use crate::{
    AppState,
    entities::session,
    error::{AppError, AppResult},
};

/// Request and response header carrying the session token.
pub const AUTH_HEADER: &str = "X-Authorization";

const TOKEN_LEN: usize = 32;
const SALT_LEN: usize = 16;

/// The caller, resolved from a live session token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i32,
    pub token: String,
}

impl AuthUser {
    pub fn owns(&self, owner_id: i32) -> bool {
        self.user_id == owner_id
    }
}

/// Like [`AuthUser`] but anonymous callers are let through.
#[derive(Clone, Debug)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = header_token(parts) else {
            debug!("request without auth token");
            return Err(AppError::Unauthenticated);
        };
        match resolve(&state.db, &token).await? {
            Some(user_id) => Ok(AuthUser { user_id, token }),
            None => {
                debug!("auth token matches no session");
                Err(AppError::Unauthenticated)
            },
        }
    }
}

impl FromRequestParts<Arc<AppState>> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = header_token(parts) else {
            return Ok(MaybeAuthUser(None));
        };
        let user = resolve(&state.db, &token).await?.map(|user_id| AuthUser { user_id, token });
        Ok(MaybeAuthUser(user))
    }
}

fn header_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Maps a token to the user holding it, if the session is live.
pub async fn resolve<C: ConnectionTrait>(db: &C, token: &str) -> AppResult<Option<i32>> {
    let found = session::Entity::find_by_id(token.to_string()).one(db).await?;
    Ok(found.map(|s| s.user_id))
}

/// Starts a session for `user_id`, replacing any session it already had.
pub async fn issue_session(db: &DatabaseConnection, user_id: i32) -> AppResult<String> {
    let token = new_token();
    let txn = db.begin().await?;

    session::Entity::delete_many()
        .filter(session::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;

    session::Entity::insert(session::ActiveModel {
        token: Set(token.clone()),
        user_id: Set(user_id),
        created_at: Set(jiff::Timestamp::now().as_second()),
    })
    .exec(&txn)
    .await?;

    txn.commit().await?;
    Ok(token)
}

/// Ends the session behind `token`. Returns whether one existed.
pub async fn revoke_session<C: ConnectionTrait>(db: &C, token: &str) -> AppResult<bool> {
    let res = session::Entity::delete_by_id(token.to_string()).exec(db).await?;
    Ok(res.rows_affected > 0)
}

pub fn new_token() -> String {
    rand::rng().sample_iter(&Alphanumeric).take(TOKEN_LEN).map(char::from).collect()
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let mut salt_bytes = [0u8; SALT_LEN];
    OsRng.try_fill_bytes(&mut salt_bytes).map_err(|e| anyhow::anyhow!("os rng: {e}"))?;
    let salt = SaltString::encode_b64(&salt_bytes)?;
    Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}
