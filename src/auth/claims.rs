/// Bearer token claims
///
/// The payload binds a subject (user id) to an absolute expiry. Standard
/// JWT claim names (RFC 7519) are used on the wire.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TokenError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    /// JWT times are whole seconds, so the lifetime runs from the second of
    /// issue: valid on `[iat, iat + ttl)` with `iat` truncated.
    pub fn new(subject: Uuid, issued_at: DateTime<Utc>, ttl: Duration, issuer: String) -> Self {
        let iat = issued_at.timestamp();
        Self {
            sub: subject.to_string(),
            iat,
            exp: iat + ttl.num_seconds(),
            iss: issuer,
        }
    }

    /// Extract the subject id
    ///
    /// # Errors
    /// `TokenError::Malformed` if the subject is not a UUID
    pub fn subject_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Malformed)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    /// Expired once `now` reaches `exp`; an unrepresentable `exp` counts as expired
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map_or(true, |exp| now >= exp)
    }
}
