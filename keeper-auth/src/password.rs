use bcrypt::{hash, verify};

use crate::{AuthError, AuthResult};

/// bcrypt cost used when no cost is configured
pub const DEFAULT_HASH_COST: u32 = 10;

/// Hash a password on the blocking pool
pub async fn hash_password(password: &str, cost: u32) -> AuthResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash(password, cost))
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Check a password against a stored bcrypt hash
///
/// A malformed hash counts as a mismatch rather than an error so callers
/// cannot tell it apart from a wrong password.
pub async fn verify_password(password: &str, password_hash: &str) -> AuthResult<bool> {
    let password = password.to_string();
    let password_hash = password_hash.to_string();
    let outcome = tokio::task::spawn_blocking(move || verify(password, &password_hash))
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?;

    Ok(outcome.unwrap_or(false))
}
