/// Password Hashing and Verification
///
/// bcrypt with a configurable cost. Both directions run on tokio's blocking
/// pool so a slow hash never holds up an async worker.

use bcrypt::{hash, verify};
use std::sync::{Arc, OnceLock};

use crate::error::AppError;

const MIN_COST: u32 = 4;
const MAX_COST: u32 = 31;

/// Input for the timing-equalizer hash used when an account does not exist
const DUMMY_PASSWORD: &str = "moneyhandle-dummy-password";

#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
    dummy_hash: Arc<OnceLock<String>>,
}

impl PasswordHasher {
    /// `cost` is clamped to bcrypt's supported range
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(MIN_COST, MAX_COST),
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password into a self-describing `$2b$<cost>$...` string
    ///
    /// # Errors
    /// Returns error if bcrypt fails or the blocking task is lost
    pub async fn hash(&self, password: &str) -> Result<String, AppError> {
        let password = password.to_string();
        let cost = self.cost;

        tokio::task::spawn_blocking(move || hash(password, cost))
            .await?
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a stored hash.
    ///
    /// Fails closed: a malformed hash or a lost worker yields `false`.
    pub async fn verify(&self, password: &str, password_hash: &str) -> bool {
        let password = password.to_string();
        let password_hash = password_hash.to_string();

        match tokio::task::spawn_blocking(move || verify(password, &password_hash)).await {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Stored password hash could not be parsed");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Password verification task failed");
                false
            }
        }
    }

    /// Spend the same effort as a real verification, always returning `false`.
    /// Keeps unknown-account signins indistinguishable by response time.
    pub async fn verify_dummy(&self, password: &str) {
        let password = password.to_string();
        let cost = self.cost;
        let dummy_hash = self.dummy_hash.clone();

        let _ = tokio::task::spawn_blocking(move || {
            let reference = dummy_hash.get_or_init(|| hash(DUMMY_PASSWORD, cost).unwrap_or_default());
            verify(password, reference)
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(MIN_COST)
    }

    #[tokio::test]
    async fn test_hash_password() {
        let password = "ValidPassword123";
        let hash = hasher().hash(password).await.expect("Failed to hash password");

        assert_ne!(password, hash);
        assert!(hash.starts_with("$2"));
        assert!(hash.contains("$04$"));
    }

    #[tokio::test]
    async fn test_same_password_hashes_differently() {
        let hasher = hasher();
        let first = hasher.hash("Passw0rd").await.unwrap();
        let second = hasher.hash("Passw0rd").await.unwrap();

        assert_ne!(first, second);
        assert!(hasher.verify("Passw0rd", &first).await);
        assert!(hasher.verify("Passw0rd", &second).await);
    }

    #[tokio::test]
    async fn test_verify_wrong_password() {
        let hasher = hasher();
        let hash = hasher.hash("ValidPassword123").await.unwrap();

        assert!(!hasher.verify("WrongPassword123", &hash).await);
    }

    #[tokio::test]
    async fn test_malformed_hash_fails_closed() {
        let hasher = hasher();

        assert!(!hasher.verify("Passw0rd", "not-a-bcrypt-hash").await);
        assert!(!hasher.verify("Passw0rd", "").await);
    }

    #[tokio::test]
    async fn test_dummy_verification_completes() {
        hasher().verify_dummy("anything").await;
    }

    #[test]
    fn test_cost_is_clamped() {
        assert_eq!(PasswordHasher::new(1).cost(), MIN_COST);
        assert_eq!(PasswordHasher::new(99).cost(), MAX_COST);
        assert_eq!(PasswordHasher::new(12).cost(), 12);
    }
}
