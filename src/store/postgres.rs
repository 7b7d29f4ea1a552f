/// PostgreSQL credential store
///
/// Uniqueness is enforced by the `users_email_key` unique index; lockout
/// counters are mutated with a single `UPDATE ... RETURNING` so the row lock
/// serializes concurrent failed attempts on one account.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{CredentialStore, NewUser, User};
use crate::auth::{LockState, LockoutPolicy};
use crate::error::StoreError;

const USER_COLUMNS: &str = "id, first_name, last_name, email, password_hash, phone, \
     date_of_birth, plan, role, failed_attempt_count, locked_until, last_login_at, \
     created_at, updated_at";

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    password_hash: String,
    phone: Option<String>,
    date_of_birth: Option<NaiveDate>,
    plan: String,
    role: String,
    failed_attempt_count: i32,
    locked_until: Option<DateTime<Utc>>,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            password_hash: row.password_hash,
            phone: row.phone,
            date_of_birth: row.date_of_birth,
            plan: row.plan.parse().map_err(StoreError::CorruptRecord)?,
            role: row.role.parse().map_err(StoreError::CorruptRecord)?,
            failed_attempt_count: attempt_count(row.failed_attempt_count)?,
            locked_until: row.locked_until,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn attempt_count(raw: i32) -> Result<u32, StoreError> {
    u32::try_from(raw)
        .map_err(|_| StoreError::CorruptRecord(format!("negative failed_attempt_count {}", raw)))
}

pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = $1",
            USER_COLUMNS
        ))
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, first_name, last_name, email, password_hash, phone,
                               date_of_birth, plan, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.email.to_lowercase())
        .bind(&user.password_hash)
        .bind(&user.phone)
        .bind(user.date_of_birth)
        .bind(user.plan.as_str())
        .bind(user.role.as_str())
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await?;

        User::try_from(row)
    }

    async fn apply_failed_attempt(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> Result<LockState, StoreError> {
        // Right-hand sides see the pre-update row, mirroring `record_failure`.
        let threshold = i32::try_from(policy.max_failed_attempts).unwrap_or(i32::MAX);
        let row = sqlx::query_as::<_, (i32, Option<DateTime<Utc>>)>(
            r#"
            UPDATE users SET
                failed_attempt_count = CASE
                    WHEN locked_until IS NOT NULL AND locked_until <= $2 THEN 1
                    ELSE failed_attempt_count + 1
                END,
                locked_until = CASE
                    WHEN locked_until IS NOT NULL AND locked_until <= $2 THEN NULL
                    WHEN locked_until IS NOT NULL THEN locked_until
                    WHEN failed_attempt_count + 1 >= $3 THEN $4
                    ELSE NULL
                END,
                updated_at = $2
            WHERE id = $1
            RETURNING failed_attempt_count, locked_until
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(threshold)
        .bind(now + policy.lockout_duration)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        Ok(LockState::from_parts(attempt_count(row.0)?, row.1))
    }

    async fn apply_successful_login(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // The lock test sits in the WHERE clause so it is evaluated under the row lock.
        let result = sqlx::query(
            r#"
            UPDATE users
            SET failed_attempt_count = 0, last_login_at = $2, updated_at = $2
            WHERE id = $1 AND locked_until IS NULL
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(false)
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = $1)",
        )
        .bind(email.to_lowercase())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
