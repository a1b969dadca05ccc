// ABOUTME: Token authentication: password hashing, token generation, and request extraction
// ABOUTME: Handlers take `AuthUser` to require a valid `Authorization: Token <key>` header

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};

use crate::entities::user;
use crate::error::{AppError, Result};
use crate::AppState;

const SALT_SIZE: usize = 16; // 128 bits salt for Argon2
const TOKEN_BYTES: usize = 30; // 40 characters once base64url-encoded

fn hash_password_blocking(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt_bytes);

    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Internal(format!("Salt encoding failed: {}", e)))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

fn verify_password_blocking(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Hashes a password off the async runtime; argon2 is deliberately slow.
pub async fn hash_password(password: &str) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password_blocking(&password)).await?
}

pub async fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let password = password.to_string();
    let hash = hash.to_string();
    Ok(tokio::task::spawn_blocking(move || verify_password_blocking(&password, &hash)).await?)
}

pub fn generate_token_key() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Resolves presented token keys to accounts.
#[async_trait]
pub trait TokenAuthority: Send + Sync {
    async fn resolve(&self, key: &str) -> Result<Option<user::Model>>;
}

/// The account bound to the request's token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub user::Model);

impl AuthUser {
    pub fn id(&self) -> i32 {
        self.0.id
    }
}

fn token_from_header(value: &str) -> Option<&str> {
    let (scheme, key) = value.trim().split_once(' ')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    if scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer") {
        Some(key)
    } else {
        None
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("No authorization header".to_string()))?
            .to_str()
            .map_err(|_| AppError::Unauthorized("Malformed authorization header".to_string()))?;

        let key = token_from_header(header_value)
            .ok_or_else(|| AppError::Unauthorized("Unsupported authorization scheme".to_string()))?;

        let user = state
            .tokens
            .resolve(key)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid token".to_string()))?;

        if !user.is_active {
            return Err(AppError::Unauthorized(format!(
                "User {} inactive or deleted",
                user.id
            )));
        }

        Ok(AuthUser(user))
    }
}
