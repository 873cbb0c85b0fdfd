//! services/api/src/security.rs
//!
//! Password hashing, JWT issuance/verification, reset-token generation, and
//! the input validation rules for registration.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chatbot_core::ports::{PortError, PortResult};

//=========================================================================================
// Password Hashing
//=========================================================================================

pub fn hash_password(password: &str) -> PortResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PortError::Unexpected(format!("Failed to hash password: {e}")))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hashed: &str) -> PortResult<bool> {
    let parsed_hash = PasswordHash::new(hashed)
        .map_err(|e| PortError::Unexpected(format!("Failed to parse password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

//=========================================================================================
// JWT Access Tokens
//=========================================================================================

/// Claims carried by an access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiration (unix seconds).
    pub exp: i64,
}

pub fn create_access_token(
    user_id: Uuid,
    secret: &str,
    algorithm: Algorithm,
    expire_minutes: i64,
) -> PortResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::minutes(expire_minutes)).timestamp(),
    };
    encode(
        &Header::new(algorithm),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| PortError::Unexpected(format!("Failed to sign access token: {e}")))
}

/// Verifies the token signature and expiry, returning the user id it was
/// issued for. Every failure collapses into the same generic rejection.
pub fn decode_access_token(token: &str, secret: &str, algorithm: Algorithm) -> PortResult<Uuid> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(algorithm),
    )
    .map_err(|_| PortError::Unauthorized("Invalid or expired access token".to_string()))?;

    Uuid::parse_str(&data.claims.sub)
        .map_err(|_| PortError::Unauthorized("Invalid or expired access token".to_string()))
}

//=========================================================================================
// Password Reset Tokens
//=========================================================================================

/// 32 random bytes, hex encoded: 256 bits of entropy, URL-safe.
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

//=========================================================================================
// Registration Validators
//=========================================================================================

/// At least 8 characters, one uppercase, one lowercase, one digit.
pub fn validate_password_strength(password: &str) -> PortResult<()> {
    if password.len() < 8 {
        return Err(PortError::Validation(
            "Password must be at least 8 characters long".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(PortError::Validation(
            "Password must contain at least one uppercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(PortError::Validation(
            "Password must contain at least one lowercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PortError::Validation(
            "Password must contain at least one number".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_handle(handle: &str) -> PortResult<()> {
    if handle.len() < 3 || handle.len() > 50 {
        return Err(PortError::Validation(
            "Handle must be between 3 and 50 characters".to_string(),
        ));
    }
    if !handle
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(PortError::Validation(
            "Handle can only contain letters, numbers, and underscores".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> PortResult<()> {
    // The single regex the rest of the app agrees on for "looks like an email".
    let pattern = Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
    if !pattern.is_match(email) {
        return Err(PortError::Validation("Invalid email address".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("Sup3rSecret").unwrap();
        assert!(verify_password("Sup3rSecret", &hash).unwrap());
        assert!(!verify_password("sup3rsecret", &hash).unwrap());
    }

    #[test]
    fn access_token_roundtrip() {
        let user_id = Uuid::new_v4();
        let token = create_access_token(user_id, "test-secret", Algorithm::HS256, 60).unwrap();
        let decoded = decode_access_token(&token, "test-secret", Algorithm::HS256).unwrap();
        assert_eq!(decoded, user_id);
    }

    #[test]
    fn expired_token_is_rejected() {
        let token =
            create_access_token(Uuid::new_v4(), "test-secret", Algorithm::HS256, -5).unwrap();
        let err = decode_access_token(&token, "test-secret", Algorithm::HS256).unwrap_err();
        assert!(matches!(err, PortError::Unauthorized(_)));
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let token = create_access_token(Uuid::new_v4(), "secret-a", Algorithm::HS256, 60).unwrap();
        assert!(decode_access_token(&token, "secret-b", Algorithm::HS256).is_err());
    }

    #[test]
    fn reset_tokens_are_long_and_unique() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn password_strength_policy() {
        assert!(validate_password_strength("Abcdef12").is_ok());
        assert!(validate_password_strength("Ab1").is_err());
        assert!(validate_password_strength("abcdefg1").is_err());
        assert!(validate_password_strength("ABCDEFG1").is_err());
        assert!(validate_password_strength("Abcdefgh").is_err());
    }

    #[test]
    fn handle_rules() {
        assert!(validate_handle("chat_user_1").is_ok());
        assert!(validate_handle("ab").is_err());
        assert!(validate_handle("bad handle").is_err());
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("not-an-email").is_err());
    }
}
