use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::{Algorithm, Params, Pbkdf2};
use uuid::Uuid;

/// Lowest iteration count accepted from configuration.
pub const MIN_PASSWORD_ROUNDS: u32 = 1_000;
pub const DEFAULT_PASSWORD_ROUNDS: u32 = 600_000;

const OUTPUT_LEN: usize = 32;

/// PBKDF2-SHA256 password hash in PHC form:
/// `$pbkdf2-sha256$i=<rounds>,l=32$<salt>$<hash>`.
pub fn hash_password(password: &str, rounds: u32) -> anyhow::Result<String> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| anyhow::anyhow!("salt encoding failed: {e}"))?;
    let params = Params {
        rounds: rounds.max(MIN_PASSWORD_ROUNDS),
        output_length: OUTPUT_LEN,
    };
    let hash = Pbkdf2
        .hash_password_customized(
            password.as_bytes(),
            Some(Algorithm::Pbkdf2Sha256.ident()),
            None,
            params,
            &salt,
        )
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

/// Rounds and salt come from the stored string, so hashes made under an older
/// iteration count keep verifying.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok()
}

/// Opaque bearer token handed to clients on login/registration.
pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}
