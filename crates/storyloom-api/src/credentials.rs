use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand_core::OsRng;
use tracing::warn;

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// Check a password against a stored digest. A digest that does not parse
/// counts as a mismatch.
pub fn verify_password(password: &str, digest: &str) -> bool {
    let parsed = match PasswordHash::new(digest) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Stored password hash is unreadable: {}", e);
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
