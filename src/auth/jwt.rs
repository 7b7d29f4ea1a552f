/// Token Issuing and Verification
///
/// HS256 JWTs signed with the configured secret. Verification is pure:
/// a clock read and HMAC check, no I/O and no record of issued tokens.

use chrono::{Duration, SubsecRound};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::clock::Clock;
use crate::configuration::JwtSettings;
use crate::error::{AppError, TokenError};

pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(config: &JwtSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            default_ttl: config.token_ttl(),
            clock,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Sign a token for `subject` that expires `ttl` after the current
    /// whole second
    ///
    /// # Errors
    /// Returns error if token encoding fails
    pub fn issue(&self, subject: Uuid, ttl: Duration) -> Result<String, AppError> {
        let issued_at = self.clock.now().trunc_subsecs(0);
        let claims = Claims::new(subject, issued_at, ttl, self.issuer.clone());

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    pub fn issue_default(&self, subject: Uuid) -> Result<String, AppError> {
        self.issue(subject, self.default_ttl)
    }

    /// Check signature, issuer and expiry; return the subject id
    ///
    /// The signature is checked first, so a tampered token never reports
    /// `Expired`.
    pub fn verify(&self, token: &str) -> Result<Uuid, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);
        // Expiry is judged against the injected clock below, with no leeway.
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Token rejected: {}", e);
                match e.kind() {
                    ErrorKind::InvalidSignature
                    | ErrorKind::InvalidIssuer
                    | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
                    _ => TokenError::Malformed,
                }
            })?;

        if claims.is_expired_at(self.clock.now()) {
            return Err(TokenError::Expired);
        }

        claims.subject_id()
    }
}
