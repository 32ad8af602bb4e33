use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::num::NonZeroU32;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
const ITERATIONS: u32 = 100_000;

#[derive(thiserror::Error, Debug)]
pub enum PasswordError {
    #[error("Failed to generate salt")]
    RandomFailure,

    #[error("Unsupported or malformed password hash")]
    MalformedHash,
}

/// Hashes a password as `pbkdf2-sha256$<iterations>$<salt hex>$<hash hex>`
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| PasswordError::RandomFailure)?;

    Ok(hash_with_salt(password, &salt, ITERATIONS))
}

fn hash_with_salt(password: &str, salt: &[u8], iterations: u32) -> String {
    let rounds = NonZeroU32::new(iterations).unwrap_or(NonZeroU32::MIN);
    let mut hash = [0u8; HASH_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        rounds,
        salt,
        password.as_bytes(),
        &mut hash,
    );

    format!(
        "{}${}${}${}",
        SCHEME,
        rounds,
        hex::encode(salt),
        hex::encode(hash)
    )
}

/// Verifies a password against a stored hash in constant time
pub fn verify_password(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let mut parts = stored.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(PasswordError::MalformedHash);
    };

    let iterations: NonZeroU32 = iterations
        .parse()
        .map_err(|_| PasswordError::MalformedHash)?;
    let salt = hex::decode(salt).map_err(|_| PasswordError::MalformedHash)?;
    let hash = hex::decode(hash).map_err(|_| PasswordError::MalformedHash)?;

    Ok(pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        password.as_bytes(),
        &hash,
    )
    .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("secret!12345").unwrap();

        assert!(hash.starts_with("pbkdf2-sha256$100000$"));
        assert!(verify_password("secret!12345", &hash).unwrap());
        assert!(!verify_password("secret!1234", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("changeme1337").unwrap();
        let b = hash_password("changeme1337").unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_known_hash_with_low_iterations() {
        let stored = hash_with_salt("ILoveYouManu", b"0123456789abcdef", 2);

        assert!(verify_password("ILoveYouManu", &stored).unwrap());
    }

    #[test]
    fn test_malformed_hash() {
        assert!(matches!(
            verify_password("x", "$2y$13$abcdef"),
            Err(PasswordError::MalformedHash)
        ));
        assert!(matches!(
            verify_password("x", "pbkdf2-sha256$0$00$00"),
            Err(PasswordError::MalformedHash)
        ));
    }
}
