//! services/api/src/adapters/credentials.rs
//!
//! Password hashing and password-reset token helpers shared by the auth adapter.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::Engine;
use chrono::{DateTime, Utc};
use raven_core::ports::{PortError, PortResult, ResetLinkError};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Length of a URL-safe, unpadded base64 encoding of 32 random bytes.
const TOKEN_LEN: usize = 43;

pub fn hash_password(password: &str) -> PortResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PortError::Unexpected(format!("Failed to hash password: {e}")))
}

pub fn verify_password(password: &str, stored_hash: &str) -> PortResult<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| PortError::Unexpected(format!("Failed to parse password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// A random reset token (URL-safe base64, 32 bytes of entropy).
pub fn generate_reset_token() -> String {
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex SHA-256 of a token; the only form that is stored.
pub fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Rejects anything that cannot have come from `generate_reset_token`,
/// such as a link truncated by a mail client.
pub fn check_token_shape(token: &str) -> Result<(), ResetLinkError> {
    let well_formed = token.len() == TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if well_formed {
        Ok(())
    } else {
        Err(ResetLinkError::Malformed)
    }
}

/// A stored reset row, as far as validation cares.
#[derive(Debug, Clone)]
pub struct ResetRow {
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

/// Decides whether a looked-up reset row can still be redeemed at `now`.
pub fn classify_reset(row: Option<&ResetRow>, now: DateTime<Utc>) -> Result<Uuid, ResetLinkError> {
    match row {
        None => Err(ResetLinkError::NoSession),
        Some(row) if row.used => Err(ResetLinkError::NoSession),
        Some(row) if row.expires_at <= now => Err(ResetLinkError::Expired),
        Some(row) => Ok(row.user_id),
    }
}
