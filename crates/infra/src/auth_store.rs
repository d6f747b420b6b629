//! Login/refresh/logout storage: Argon2id credential check, HS256 access
//! tokens, and single-use refresh-token rotation.
//!
//! Refresh tokens are bearer secrets handed to the client; only their
//! SHA-256 hash is ever persisted. Presenting a token that is already used or
//! expired is treated as a forensic signal (possible token theft), so it
//! revokes every other still-redeemable token issued to that device rather
//! than just failing the one request.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Duration;
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};

use eln_auth::{Hs256JwtValidator, JwtClaims, PasswordHasher};
use eln_core::id::{DeviceId, RefreshTokenId, UserId};
use eln_core::user::{Role, User};
use eln_core::{DomainError, DomainResult};

use crate::error::map_sqlx_error;

pub struct Session {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

pub async fn login(
    pool: &PgPool,
    hasher: &PasswordHasher,
    jwt: &Hs256JwtValidator,
    access_ttl: Duration,
    refresh_ttl: Duration,
    email: &str,
    password: &str,
    device_id: DeviceId,
) -> DomainResult<Session> {
    let normalized = User::normalize_email(email);
    let row = sqlx::query("SELECT id, email, password_hash, display_name, role, created_at FROM users WHERE email = $1")
        .bind(&normalized)
        .fetch_optional(pool)
        .await
        .map_err(|e| map_sqlx_error("login_lookup", e))?
        .ok_or(DomainError::InvalidPassword)?;

    let user = row_to_user(&row)?;

    let matches = hasher
        .verify(password, &user.password_hash)
        .map_err(|_| DomainError::internal("stored password hash is malformed"))?;
    if !matches {
        return Err(DomainError::InvalidPassword);
    }

    issue_session(pool, jwt, access_ttl, refresh_ttl, user, device_id).await
}

/// Rotate a presented refresh token. On success, the presented token is
/// marked used and points at the replacement; a stale presentation (already
/// used, or expired) revokes the rest of that device's chain and returns
/// `Unauthenticated`.
pub async fn refresh(
    pool: &PgPool,
    jwt: &Hs256JwtValidator,
    access_ttl: Duration,
    refresh_ttl: Duration,
    presented_token: &str,
    device_id: DeviceId,
) -> DomainResult<Session> {
    let presented_hash = hash_token(presented_token);
    let now = chrono::Utc::now();

    let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("refresh_begin", e))?;

    let row = sqlx::query(
        "SELECT id, user_id, device_id, expires_at, used_at FROM refresh_tokens WHERE token_hash = $1 FOR UPDATE",
    )
    .bind(&presented_hash)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| map_sqlx_error("refresh_lookup", e))?
    .ok_or(DomainError::Unauthenticated)?;

    let token_id: uuid::Uuid = row.try_get("id").map_err(|e| map_sqlx_error("refresh_row", e))?;
    let user_id: uuid::Uuid = row.try_get("user_id").map_err(|e| map_sqlx_error("refresh_row", e))?;
    let stored_device: String = row.try_get("device_id").map_err(|e| map_sqlx_error("refresh_row", e))?;
    let expires_at: chrono::DateTime<chrono::Utc> = row.try_get("expires_at").map_err(|e| map_sqlx_error("refresh_row", e))?;
    let used_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("used_at").map_err(|e| map_sqlx_error("refresh_row", e))?;

    let user_id = UserId::from_uuid(user_id);
    let is_redeemable = used_at.is_none() && now < expires_at;

    if !is_redeemable {
        revoke_device_chain(&mut tx, user_id, &stored_device).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("refresh_revoke_commit", e))?;
        return Err(DomainError::Unauthenticated);
    }

    let user_row = sqlx::query("SELECT id, email, password_hash, display_name, role, created_at FROM users WHERE id = $1")
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("refresh_user_lookup", e))?
        .ok_or_else(DomainError::not_found)?;
    let user = row_to_user(&user_row)?;

    let (new_token, new_token_id) = insert_refresh_token(&mut tx, user_id, &device_id, refresh_ttl, now).await?;

    sqlx::query("UPDATE refresh_tokens SET used_at = $1, replaced_by_token_id = $2 WHERE id = $3")
        .bind(now)
        .bind(new_token_id.as_uuid())
        .bind(token_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("refresh_mark_used", e))?;

    tx.commit().await.map_err(|e| map_sqlx_error("refresh_commit", e))?;

    let access_token = mint_access_token(jwt, &user, &device_id, access_ttl)?;
    Ok(Session { user, access_token, refresh_token: new_token })
}

pub async fn logout(pool: &PgPool, presented_token: &str) -> DomainResult<()> {
    let presented_hash = hash_token(presented_token);
    let now = chrono::Utc::now();
    sqlx::query("UPDATE refresh_tokens SET used_at = $1 WHERE token_hash = $2 AND used_at IS NULL")
        .bind(now)
        .bind(&presented_hash)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("logout", e))?;
    Ok(())
}

async fn issue_session(
    pool: &PgPool,
    jwt: &Hs256JwtValidator,
    access_ttl: Duration,
    refresh_ttl: Duration,
    user: User,
    device_id: DeviceId,
) -> DomainResult<Session> {
    let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("issue_session_begin", e))?;
    let now = chrono::Utc::now();
    let (refresh_token, _) = insert_refresh_token(&mut tx, user.id, &device_id, refresh_ttl, now).await?;
    tx.commit().await.map_err(|e| map_sqlx_error("issue_session_commit", e))?;

    let access_token = mint_access_token(jwt, &user, &device_id, access_ttl)?;
    Ok(Session { user, access_token, refresh_token })
}

async fn insert_refresh_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: UserId,
    device_id: &DeviceId,
    ttl: Duration,
    now: chrono::DateTime<chrono::Utc>,
) -> DomainResult<(String, RefreshTokenId)> {
    let raw_token = generate_token();
    let token_hash = hash_token(&raw_token);
    let id = RefreshTokenId::new();

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, user_id, device_id, token_hash, issued_at, expires_at, used_at, replaced_by_token_id)
        VALUES ($1, $2, $3, $4, $5, $6, NULL, NULL)
        "#,
    )
    .bind(id.as_uuid())
    .bind(user_id.as_uuid())
    .bind(device_id.as_str())
    .bind(&token_hash)
    .bind(now)
    .bind(now + ttl)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_refresh_token", e))?;

    Ok((raw_token, id))
}

async fn revoke_device_chain(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, user_id: UserId, device_id: &str) -> DomainResult<()> {
    let now = chrono::Utc::now();
    sqlx::query(
        "UPDATE refresh_tokens SET used_at = $1 WHERE user_id = $2 AND device_id = $3 AND used_at IS NULL",
    )
    .bind(now)
    .bind(user_id.as_uuid())
    .bind(device_id)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("revoke_device_chain", e))?;
    Ok(())
}

fn mint_access_token(jwt: &Hs256JwtValidator, user: &User, device_id: &DeviceId, access_ttl: Duration) -> DomainResult<String> {
    let now = chrono::Utc::now();
    let claims = JwtClaims {
        sub: user.id,
        role: user.role,
        device_id: device_id.clone(),
        issued_at: now,
        expires_at: now + access_ttl,
    };
    jwt.encode(&claims).map_err(|e| DomainError::internal(e.to_string()))
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> DomainResult<User> {
    let id: uuid::Uuid = row.try_get("id").map_err(|e| map_sqlx_error("row_to_user", e))?;
    let role: String = row.try_get("role").map_err(|e| map_sqlx_error("row_to_user", e))?;
    Ok(User {
        id: UserId::from_uuid(id),
        email: row.try_get("email").map_err(|e| map_sqlx_error("row_to_user", e))?,
        password_hash: row.try_get("password_hash").map_err(|e| map_sqlx_error("row_to_user", e))?,
        display_name: row.try_get("display_name").map_err(|e| map_sqlx_error("row_to_user", e))?,
        role: parse_role(&role),
        created_at: row.try_get("created_at").map_err(|e| map_sqlx_error("row_to_user", e))?,
    })
}

fn parse_role(s: &str) -> Role {
    match s {
        "admin" => Role::Admin,
        "viewer" => Role::Viewer,
        _ => Role::Owner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_hash_is_deterministic() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
    }

    #[test]
    fn generated_tokens_are_not_reused() {
        assert_ne!(generate_token(), generate_token());
    }
}
