//! Authenticated user identity

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Claims carried by the bearer token issued by the external auth service.
///
/// The reservation core trusts this opaque identity; it never issues tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    /// Authenticated user id
    pub sub: i32,
    /// "admin" or "member"
    pub role: String,
    pub exp: i64,
}

impl UserClaims {
    /// Validate and decode a JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        let data = decode::<UserClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(data.claims)
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Authorization(
                "Administrator role required".to_string(),
            ))
        }
    }
}
