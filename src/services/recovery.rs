//! One-time recovery codes.
//!
//! Codes are shown to the user once and stored only as Argon2 hashes. A code
//! is consumed by the first successful redeem.

use crate::db::Database;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::Rng;
use rand::rngs::OsRng;
use thiserror::Error;

// No 0/O or 1/I, codes get typed in by hand.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const GROUP_LEN: usize = 4;
const GROUPS: usize = 2;

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("failed to hash recovery code: {0}")]
    Hash(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Random codes shaped like `ABCD-EF23`.
pub fn generate_codes(count: usize) -> Vec<String> {
    let mut rng = OsRng;
    (0..count)
        .map(|_| {
            (0..GROUPS)
                .map(|_| {
                    (0..GROUP_LEN)
                        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
                        .collect::<String>()
                })
                .collect::<Vec<_>>()
                .join("-")
        })
        .collect()
}

/// Uppercases and drops whitespace so ` abcd-ef23 ` matches `ABCD-EF23`.
pub fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

pub fn hash_code(code: &str) -> Result<String, RecoveryError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(normalize_code(code).as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| RecoveryError::Hash(e.to_string()))
}

pub fn verify_code(code: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        tracing::warn!("Skipping unparseable recovery code hash");
        return false;
    };
    Argon2::default()
        .verify_password(normalize_code(code).as_bytes(), &parsed)
        .is_ok()
}

/// Generates a fresh set of codes for the user, replacing any previous set.
pub async fn issue_codes(
    db: &Database,
    user_id: &str,
    count: usize,
) -> Result<Vec<String>, RecoveryError> {
    let codes = generate_codes(count);
    let to_hash = codes.clone();
    let hashes = tokio::task::spawn_blocking(move || {
        to_hash.iter().map(|c| hash_code(c)).collect::<Result<Vec<_>, _>>()
    })
    .await
    .map_err(|e| RecoveryError::Hash(e.to_string()))??;

    db.replace_recovery_codes(user_id, &hashes).await?;
    tracing::info!(user_id, count, "Issued recovery codes");
    Ok(codes)
}

/// Consumes the code if it matches one of the user's unused codes.
pub async fn redeem_code(db: &Database, user_id: &str, code: &str) -> Result<bool, RecoveryError> {
    let candidates = db.unused_recovery_codes(user_id).await?;
    let code = code.to_string();
    let matched = tokio::task::spawn_blocking(move || {
        candidates
            .into_iter()
            .find(|record| verify_code(&code, &record.code_hash))
    })
    .await
    .map_err(|e| RecoveryError::Hash(e.to_string()))?;

    let Some(record) = matched else {
        tracing::warn!(user_id, "Recovery code rejected");
        return Ok(false);
    };

    let consumed = db.mark_recovery_code_used(&record.id).await?;
    if consumed {
        tracing::info!(user_id, "Recovery code redeemed");
    }
    Ok(consumed)
}
