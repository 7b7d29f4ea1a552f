/// Credential store
///
/// Durable repository of user identity and lockout state. All lockout
/// mutation happens inside the store as a single atomic update; callers
/// never read a counter, compute, and write it back.

mod memory;
mod postgres;
mod user;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::{LockState, LockoutPolicy};
use crate::error::StoreError;

pub use memory::InMemoryCredentialStore;
pub use postgres::PgCredentialStore;
pub use user::{NewUser, Plan, Role, User, UserProfile};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `email` must already be normalized
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Fails with `StoreError::DuplicateEmail` if the email is taken;
    /// concurrent creates for one email yield exactly one success.
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;

    /// Count a failed signin and apply the lockout rules in one update.
    /// Returns the state after the update.
    async fn apply_failed_attempt(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> Result<LockState, StoreError>;

    /// Reset the counter and stamp the login time, unless a lock is on
    /// record. Returns `false`, leaving the record untouched, in that case:
    /// a lock set after the caller read the account still wins.
    async fn apply_successful_login(&self, id: Uuid, now: DateTime<Utc>)
        -> Result<bool, StoreError>;

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self.find_by_email(email).await?.is_some())
    }
}
