//! API key authentication middleware for the management API.
//!
//! Every protected request carries `Authorization: Bearer <key>`; the key
//! is SHA-256-hashed and looked up against active rows in `api_keys`. The
//! provider webhook endpoint does not pass through here; it authenticates
//! by HMAC signature instead.

use crate::{db::DbPool, error::AppError, models::api_key::ApiKey};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Authentication context attached to authenticated requests.
///
/// Inserted into the request's extension map for handlers that want to know
/// who called (audit logging of payout requests, mostly).
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub api_key_id: Uuid,
    pub label: String,
}

/// API key authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <key>` from the request
/// 2. SHA-256 the key and look up the hash where `is_active = true`
/// 3. Found: inject `AuthContext`, call the next handler
/// 4. Not found: 401
pub async fn auth_middleware(
    State(pool): State<DbPool>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::InvalidApiKey)?;

    let api_key = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::InvalidApiKey)?;

    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    let key_hash = hex::encode(hasher.finalize());

    let api_key_record = sqlx::query_as::<_, ApiKey>(
        "SELECT id, key_hash, label, is_active, created_at
         FROM api_keys
         WHERE key_hash = $1 AND is_active = true",
    )
    .bind(&key_hash)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::InvalidApiKey)?;

    request.extensions_mut().insert(AuthContext {
        api_key_id: api_key_record.id,
        label: api_key_record.label,
    });

    Ok(next.run(request).await)
}
