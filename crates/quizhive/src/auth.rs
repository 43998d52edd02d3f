//! Bearer-token verification.
//!
//! Tokens are HS256 JWTs whose subject is the recipient identifier.
//! Issuance belongs to the identity provider; this side only verifies.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    Missing,
    #[error("Token expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
}

/// Claims carried by a bearer token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Recipient identifier (email).
    pub sub: String,
    /// Expiry as a unix timestamp.
    pub exp: usize,
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
}

/// HS256 verifier over a shared secret.
pub struct TokenVerifier {
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => Ok(Identity {
                email: data.claims.sub,
            }),
            Err(e) => match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Err(AuthError::Expired),
                _ => Err(AuthError::Invalid),
            },
        }
    }

    /// Pull and verify the `Authorization: Bearer` header.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let header = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::Missing)?;
        let token = header.strip_prefix("Bearer ").ok_or(AuthError::Missing)?;
        self.verify(token)
    }
}
