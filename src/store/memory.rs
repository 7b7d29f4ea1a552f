/// In-process credential store
///
/// One mutex guards both the user table and the email index, so every
/// operation (uniqueness check + insert, attempt counting) is a single
/// critical section. State does not survive a restart; production uses
/// `PgCredentialStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{CredentialStore, NewUser, User};
use crate::auth::{record_failure, LockState, LockoutPolicy};
use crate::error::StoreError;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    by_email: HashMap<String, Uuid>,
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    tables: Mutex<Tables>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("credential table lock poisoned".to_string()))
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables()?;
        Ok(tables
            .by_email
            .get(&email.to_lowercase())
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables()?;
        let email = user.email.to_lowercase();
        if tables.by_email.contains_key(&email) {
            return Err(StoreError::DuplicateEmail);
        }

        let mut user = user.into_user(Uuid::new_v4());
        user.email = email.clone();
        tables.by_email.insert(email, user.id);
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn apply_failed_attempt(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> Result<LockState, StoreError> {
        let mut tables = self.tables()?;
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;

        let (count, locked_until) =
            record_failure(user.failed_attempt_count, user.locked_until, now, policy);
        user.failed_attempt_count = count;
        user.locked_until = locked_until;
        user.updated_at = now;

        Ok(LockState::from_parts(count, locked_until))
    }

    async fn apply_successful_login(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables()?;
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;

        if user.locked_until.is_some() {
            return Ok(false);
        }
        user.failed_attempt_count = 0;
        user.last_login_at = Some(now);
        user.updated_at = now;
        Ok(true)
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;

        user.password_hash = password_hash.to_string();
        user.updated_at = now;
        Ok(())
    }
}
