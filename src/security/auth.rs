//! Authentication Module
//!
//! Turns a Bearer JWT into an [`Identity`]. Issuing tokens belongs to the
//! surrounding application; [`JwtTokenGenerator`] exists for development
//! and tests.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::config::IdentitySettings;
use crate::error::{AppError, Result};
use crate::security::identity::Identity;

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Token expiration timestamp
    pub exp: usize,
    /// Token not before timestamp
    pub nbf: usize,
    /// Issued at timestamp
    pub iat: usize,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Unique token ID
    pub jti: String,
}

impl Claims {
    /// Create new claims
    pub fn new(sub: String, expiry_seconds: u64, issuer: String, audience: String) -> Self {
        let now = Utc::now();
        let iat = now.timestamp() as usize;

        Self {
            sub,
            exp: iat + expiry_seconds as usize,
            nbf: iat,
            iat,
            iss: issuer,
            aud: audience,
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Check if claims are expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() as usize > self.exp
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.sub.clone())
    }
}

/// Extract the token from an `Authorization: Bearer ...` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Validates HS256 tokens issued by the application
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str, issuer: &str, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn from_settings(settings: &IdentitySettings) -> Self {
        Self::new(
            &settings.jwt_secret,
            &settings.jwt_issuer,
            &settings.jwt_audience,
        )
    }

    /// Validate a token and return its claims
    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::Authentication(format!("Invalid token: {}", e)))
    }

    /// Validate a token and return the identity it names
    pub fn identity(&self, token: &str) -> Result<Identity> {
        let claims = self.verify(token)?;
        if claims.sub.trim().is_empty() {
            return Err(AppError::Authentication("Token has no subject".to_string()));
        }
        Ok(claims.identity())
    }
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("issuer", &self.validation.iss)
            .field("audience", &self.validation.aud)
            .finish()
    }
}

/// JWT token generator
#[derive(Clone)]
pub struct JwtTokenGenerator {
    encoding_key: EncodingKey,
    issuer: String,
    audience: String,
    expiry_seconds: u64,
}

impl JwtTokenGenerator {
    /// Create new token generator
    pub fn new(secret: &str, issuer: &str, audience: &str, expiry_seconds: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            expiry_seconds,
        }
    }

    pub fn from_settings(settings: &IdentitySettings) -> Self {
        Self::new(
            &settings.jwt_secret,
            &settings.jwt_issuer,
            &settings.jwt_audience,
            settings.jwt_expiry_seconds,
        )
    }

    /// Generate a signed token for `user_id`
    pub fn generate_token(&self, user_id: &str) -> Result<String> {
        let claims = Claims::new(
            user_id.to_string(),
            self.expiry_seconds,
            self.issuer.clone(),
            self.audience.clone(),
        );

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to encode token: {}", e)))
    }
}
