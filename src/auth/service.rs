/// Authentication Service
///
/// Orchestrates signup, signin and password changes on top of the
/// credential store, password hasher and token issuer, and applies the
/// brute-force lockout protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{LockState, LockoutPolicy, PasswordHasher, TokenIssuer};
use crate::clock::Clock;
use crate::error::{AppError, AuthError, StoreError, ValidationErrors};
use crate::store::{CredentialStore, NewUser, Role, UserProfile};
use crate::validators::{
    normalize_email, parse_date_of_birth, parse_plan, validate_name, validate_password,
    validate_phone, ValidationError,
};

/// Signup form; absent required fields deserialize empty and fail validation
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub plan: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SigninRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// Token plus the user it was issued for
#[derive(Debug, Serialize)]
pub struct AuthOutcome {
    pub token: String,
    pub user: UserProfile,
}

/// Lockout counters for one account
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockoutStatus {
    pub user_id: Uuid,
    pub failed_attempt_count: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub locked: bool,
}

pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    tokens: Arc<TokenIssuer>,
    policy: LockoutPolicy,
    clock: Arc<dyn Clock>,
}

fn check<T>(errors: &mut ValidationErrors, result: Result<T, ValidationError>) -> Option<T> {
    result.map_err(|e| errors.add(e.field(), e.to_string())).ok()
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: PasswordHasher,
        tokens: Arc<TokenIssuer>,
        policy: LockoutPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            policy,
            clock,
        }
    }

    /// Register a new account and sign it in
    ///
    /// # Errors
    /// - `Validation` with one entry per offending field
    /// - `Store(DuplicateEmail)` if the email is taken (any letter case)
    pub async fn signup(&self, request: SignupRequest) -> Result<AuthOutcome, AppError> {
        let now = self.clock.now();
        let mut errors = ValidationErrors::new();

        let first_name = check(&mut errors, validate_name("firstName", &request.first_name));
        let last_name = check(&mut errors, validate_name("lastName", &request.last_name));
        let email = check(&mut errors, normalize_email(&request.email));
        let password = check(&mut errors, validate_password("password", &request.password));
        let phone = check(&mut errors, validate_phone(request.phone.as_deref()));
        let date_of_birth = check(
            &mut errors,
            parse_date_of_birth(request.date_of_birth.as_deref(), now.date_naive()),
        );
        let plan = check(&mut errors, parse_plan(request.plan.as_deref()));

        let (first_name, last_name, email, phone, date_of_birth, plan) =
            match (first_name, last_name, email, password, phone, date_of_birth, plan) {
                (Some(f), Some(l), Some(e), Some(()), Some(p), Some(d), Some(pl))
                    if errors.is_empty() =>
                {
                    (f, l, e, p, d, pl)
                }
                _ => return Err(errors.into()),
            };

        // Cheap early exit; `create` remains the authority on uniqueness.
        if self.store.email_exists(&email).await? {
            return Err(StoreError::DuplicateEmail.into());
        }

        let password_hash = self.hasher.hash(&request.password).await?;
        let user = self
            .store
            .create(NewUser {
                first_name,
                last_name,
                email,
                password_hash,
                phone,
                date_of_birth,
                plan,
                role: Role::User,
                created_at: now,
            })
            .await?;

        let token = self.tokens.issue_default(user.id)?;
        tracing::info!(user_id = %user.id, "User signed up");

        Ok(AuthOutcome {
            token,
            user: user.profile(),
        })
    }

    /// Authenticate with email and password
    ///
    /// An account with a lock on record is charged a failed attempt and
    /// rejected before its password is looked at. Unknown emails and wrong
    /// passwords are indistinguishable to the caller.
    pub async fn signin(&self, request: SigninRequest) -> Result<AuthOutcome, AppError> {
        let mut errors = ValidationErrors::new();
        let email = check(&mut errors, normalize_email(&request.email));
        if request.password.is_empty() {
            errors.add("password", "password is required");
        }
        let email = match email {
            Some(email) if errors.is_empty() => email,
            _ => return Err(errors.into()),
        };

        let user = match self.store.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                self.hasher.verify_dummy(&request.password).await;
                tracing::debug!("Signin for unknown account");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let now = self.clock.now();

        if user.has_lock_marker() {
            let state = self
                .store
                .apply_failed_attempt(user.id, now, &self.policy)
                .await?;
            tracing::warn!(
                target: "security",
                user_id = %user.id,
                failed_attempts = state.failed_attempts(),
                "Signin attempted on locked account"
            );
            return Err(AuthError::AccountLocked.into());
        }

        if !self.hasher.verify(&request.password, &user.password_hash).await {
            let state = self
                .store
                .apply_failed_attempt(user.id, now, &self.policy)
                .await?;
            return match state {
                LockState::Locked {
                    failed_attempts,
                    until,
                } => {
                    tracing::warn!(
                        target: "security",
                        event = "ACCOUNT_LOCKED",
                        user_id = %user.id,
                        failed_attempts,
                        locked_until = %until,
                        "Account locked after repeated failures"
                    );
                    Err(AuthError::AccountLocked.into())
                }
                LockState::Unlocked { .. } => Err(AuthError::InvalidCredentials.into()),
            };
        }

        if !self.store.apply_successful_login(user.id, now).await? {
            tracing::warn!(
                target: "security",
                user_id = %user.id,
                "Account locked while signin was in flight"
            );
            return Err(AuthError::AccountLocked.into());
        }
        let token = self.tokens.issue_default(user.id)?;

        let mut user = user;
        user.failed_attempt_count = 0;
        user.last_login_at = Some(now);
        user.updated_at = now;

        tracing::info!(user_id = %user.id, "User signed in");
        Ok(AuthOutcome {
            token,
            user: user.profile(),
        })
    }

    /// Replace the password after re-checking the current one.
    /// Issues a fresh token; earlier tokens stay valid until they expire.
    pub async fn update_password(
        &self,
        user_id: Uuid,
        request: UpdatePasswordRequest,
    ) -> Result<AuthOutcome, AppError> {
        let mut errors = ValidationErrors::new();
        if request.current_password.is_empty() {
            errors.add("currentPassword", "currentPassword is required");
        }
        check(&mut errors, validate_password("newPassword", &request.new_password));
        errors.into_result()?;

        let mut user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(StoreError::NotFound)?;

        if !self
            .hasher
            .verify(&request.current_password, &user.password_hash)
            .await
        {
            return Err(AuthError::IncorrectCurrentPassword.into());
        }

        let password_hash = self.hasher.hash(&request.new_password).await?;
        let now = self.clock.now();
        self.store
            .update_password_hash(user.id, &password_hash, now)
            .await?;

        let token = self.tokens.issue_default(user.id)?;
        user.password_hash = password_hash;
        user.updated_at = now;

        tracing::info!(user_id = %user.id, "Password updated");
        Ok(AuthOutcome {
            token,
            user: user.profile(),
        })
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<UserProfile, AppError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(user.profile())
    }

    /// Whether an email could still be used for signup
    pub async fn email_available(&self, email: &str) -> Result<bool, AppError> {
        let email = normalize_email(email)?;
        Ok(!self.store.email_exists(&email).await?)
    }

    pub async fn lockout_status(&self, user_id: Uuid) -> Result<LockoutStatus, AppError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(StoreError::NotFound)?;

        Ok(LockoutStatus {
            user_id: user.id,
            failed_attempt_count: user.failed_attempt_count,
            locked_until: user.locked_until,
            locked: user.is_locked(self.clock.now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::configuration::JwtSettings;
    use crate::store::{InMemoryCredentialStore, User};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    struct Harness {
        service: AuthService,
        store: Arc<InMemoryCredentialStore>,
        clock: Arc<ManualClock>,
        tokens: Arc<TokenIssuer>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
        let store = Arc::new(InMemoryCredentialStore::new());
        let tokens = Arc::new(TokenIssuer::new(
            &JwtSettings {
                secret: "test-secret-key-at-least-32-characters-long".to_string(),
                token_ttl_seconds: 3600,
                issuer: "test".to_string(),
            },
            clock.clone(),
        ));
        let service = AuthService::new(
            store.clone(),
            PasswordHasher::new(4),
            tokens.clone(),
            LockoutPolicy::default(),
            clock.clone(),
        );
        Harness {
            service,
            store,
            clock,
            tokens,
        }
    }

    fn service_over(h: &Harness, store: Arc<dyn CredentialStore>) -> AuthService {
        AuthService::new(
            store,
            PasswordHasher::new(4),
            h.tokens.clone(),
            LockoutPolicy::default(),
            h.clock.clone(),
        )
    }

    /// Answers email lookups with a record read before any lock was applied,
    /// as a signin racing concurrent failures would see it.
    struct StaleEmailLookup {
        inner: Arc<InMemoryCredentialStore>,
        snapshot: User,
    }

    #[async_trait]
    impl CredentialStore for StaleEmailLookup {
        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
            Ok(Some(self.snapshot.clone()))
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn create(&self, user: NewUser) -> Result<User, StoreError> {
            self.inner.create(user).await
        }

        async fn apply_failed_attempt(
            &self,
            id: Uuid,
            now: DateTime<Utc>,
            policy: &LockoutPolicy,
        ) -> Result<LockState, StoreError> {
            self.inner.apply_failed_attempt(id, now, policy).await
        }

        async fn apply_successful_login(
            &self,
            id: Uuid,
            now: DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            self.inner.apply_successful_login(id, now).await
        }

        async fn update_password_hash(
            &self,
            id: Uuid,
            password_hash: &str,
            now: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.inner.update_password_hash(id, password_hash, now).await
        }
    }

    fn signup_request(email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            password: password.to_string(),
            ..Default::default()
        }
    }

    fn signin_request(email: &str, password: &str) -> SigninRequest {
        SigninRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    async fn failed_count(h: &Harness, email: &str) -> u32 {
        h.store
            .find_by_email(email)
            .await
            .unwrap()
            .unwrap()
            .failed_attempt_count
    }

    #[tokio::test]
    async fn test_signup_returns_token_for_new_user() {
        let h = harness();
        let outcome = h
            .service
            .signup(signup_request("A@X.com", "Passw0rd"))
            .await
            .unwrap();

        assert_eq!(outcome.user.email, "a@x.com");
        assert_eq!(outcome.user.role, Role::User);
        assert_eq!(outcome.user.failed_attempt_count, 0);
        assert_eq!(h.tokens.verify(&outcome.token), Ok(outcome.user.id));
    }

    #[tokio::test]
    async fn test_signup_collects_field_errors() {
        let h = harness();
        let request = SignupRequest {
            first_name: "".to_string(),
            last_name: "L".repeat(51),
            email: "not-an-email".to_string(),
            password: "weak".to_string(),
            phone: Some("abc".to_string()),
            date_of_birth: None,
            plan: Some("gold".to_string()),
        };

        match h.service.signup(request).await {
            Err(AppError::Validation(errors)) => {
                for field in ["firstName", "lastName", "email", "password", "phone", "plan"] {
                    assert!(errors.has_field(field), "missing error for {}", field);
                }
            }
            other => panic!("expected validation error, got {:?}", other.map(|o| o.user)),
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_any_case() {
        let h = harness();
        h.service
            .signup(signup_request("a@x.com", "Passw0rd"))
            .await
            .unwrap();

        let result = h.service.signup(signup_request("A@X.COM", "Passw0rd")).await;
        assert!(matches!(result, Err(AppError::Store(StoreError::DuplicateEmail))));
    }

    #[tokio::test]
    async fn test_unknown_email_is_invalid_credentials() {
        let h = harness();
        let result = h.service.signin(signin_request("nobody@x.com", "Passw0rd")).await;

        assert_eq!(
            result.err().and_then(|e| e.auth_kind()),
            Some(AuthError::InvalidCredentials)
        );
    }

    #[tokio::test]
    async fn test_successful_signin_resets_counters() {
        let h = harness();
        h.service
            .signup(signup_request("a@x.com", "Passw0rd"))
            .await
            .unwrap();
        for _ in 0..3 {
            let _ = h.service.signin(signin_request("a@x.com", "wrong")).await;
        }
        assert_eq!(failed_count(&h, "a@x.com").await, 3);

        let outcome = h
            .service
            .signin(signin_request("a@x.com", "Passw0rd"))
            .await
            .unwrap();

        let stored = h.store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(stored.failed_attempt_count, 0);
        assert!(stored.locked_until.is_none());
        assert_eq!(stored.last_login_at, Some(h.clock.now()));
        assert_eq!(outcome.user.last_login_at, Some(h.clock.now()));
    }

    #[tokio::test]
    async fn test_lockout_scenario() {
        let h = harness();
        h.service
            .signup(signup_request("a@x.com", "Passw0rd"))
            .await
            .unwrap();

        for (i, password) in ["wrong1", "wrong2", "wrong3", "wrong4"].iter().enumerate() {
            let result = h.service.signin(signin_request("a@x.com", password)).await;
            assert_eq!(
                result.err().and_then(|e| e.auth_kind()),
                Some(AuthError::InvalidCredentials)
            );
            assert_eq!(failed_count(&h, "a@x.com").await, i as u32 + 1);
        }

        let locked_at = h.clock.now();
        let result = h.service.signin(signin_request("a@x.com", "wrong5")).await;
        assert_eq!(
            result.err().and_then(|e| e.auth_kind()),
            Some(AuthError::AccountLocked)
        );
        let stored = h.store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(stored.locked_until, Some(locked_at + Duration::hours(2)));

        // Correct password inside the window is still refused
        h.clock.advance(Duration::minutes(30));
        let result = h.service.signin(signin_request("a@x.com", "Passw0rd")).await;
        assert_eq!(
            result.err().and_then(|e| e.auth_kind()),
            Some(AuthError::AccountLocked)
        );
        assert_eq!(failed_count(&h, "a@x.com").await, 6);

        // First attempt after expiry is refused once more and resets the counter
        h.clock.advance(Duration::hours(2));
        let result = h.service.signin(signin_request("a@x.com", "Passw0rd")).await;
        assert_eq!(
            result.err().and_then(|e| e.auth_kind()),
            Some(AuthError::AccountLocked)
        );
        let stored = h.store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(stored.failed_attempt_count, 1);
        assert!(stored.locked_until.is_none());

        let outcome = h
            .service
            .signin(signin_request("a@x.com", "Passw0rd"))
            .await
            .unwrap();
        assert_eq!(h.tokens.verify(&outcome.token), Ok(outcome.user.id));
        assert_eq!(failed_count(&h, "a@x.com").await, 0);
    }

    #[tokio::test]
    async fn test_update_password() {
        let h = harness();
        let signup = h
            .service
            .signup(signup_request("a@x.com", "Passw0rd"))
            .await
            .unwrap();

        let wrong = h
            .service
            .update_password(
                signup.user.id,
                UpdatePasswordRequest {
                    current_password: "Nope1234".to_string(),
                    new_password: "N3wPassword".to_string(),
                },
            )
            .await;
        assert_eq!(
            wrong.err().and_then(|e| e.auth_kind()),
            Some(AuthError::IncorrectCurrentPassword)
        );

        let weak = h
            .service
            .update_password(
                signup.user.id,
                UpdatePasswordRequest {
                    current_password: "Passw0rd".to_string(),
                    new_password: "weak".to_string(),
                },
            )
            .await;
        assert!(matches!(weak, Err(AppError::Validation(_))));

        let outcome = h
            .service
            .update_password(
                signup.user.id,
                UpdatePasswordRequest {
                    current_password: "Passw0rd".to_string(),
                    new_password: "N3wPassword".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(h.tokens.verify(&outcome.token), Ok(signup.user.id));

        assert!(h
            .service
            .signin(signin_request("a@x.com", "Passw0rd"))
            .await
            .is_err());
        assert!(h
            .service
            .signin(signin_request("a@x.com", "N3wPassword"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_email_availability() {
        let h = harness();
        assert!(h.service.email_available("a@x.com").await.unwrap());
        h.service
            .signup(signup_request("a@x.com", "Passw0rd"))
            .await
            .unwrap();
        assert!(!h.service.email_available("A@x.com").await.unwrap());
        assert!(matches!(
            h.service.email_available("bad").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_lockout_status_and_profile_for_missing_user() {
        let h = harness();
        assert!(matches!(
            h.service.lockout_status(Uuid::new_v4()).await,
            Err(AppError::Store(StoreError::NotFound))
        ));
        assert!(matches!(
            h.service.profile(Uuid::new_v4()).await,
            Err(AppError::Store(StoreError::NotFound))
        ));
    }

    #[tokio::test]
    async fn test_correct_password_cannot_clear_a_lock_set_mid_signin() {
        let h = harness();
        h.service
            .signup(signup_request("a@x.com", "Passw0rd"))
            .await
            .unwrap();
        let snapshot = h.store.find_by_email("a@x.com").await.unwrap().unwrap();

        let policy = LockoutPolicy::default();
        for _ in 0..policy.max_failed_attempts {
            h.store
                .apply_failed_attempt(snapshot.id, h.clock.now(), &policy)
                .await
                .unwrap();
        }

        let service = service_over(
            &h,
            Arc::new(StaleEmailLookup {
                inner: h.store.clone(),
                snapshot,
            }),
        );
        let result = service.signin(signin_request("a@x.com", "Passw0rd")).await;
        assert_eq!(
            result.err().and_then(|e| e.auth_kind()),
            Some(AuthError::AccountLocked)
        );

        let stored = h.store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(stored.failed_attempt_count, 5);
        assert_eq!(stored.locked_until, Some(h.clock.now() + Duration::hours(2)));
        assert!(stored.last_login_at.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_guesses_always_end_locked() {
        let h = harness();
        h.service
            .signup(signup_request("a@x.com", "Passw0rd"))
            .await
            .unwrap();
        let service = Arc::new(service_over(&h, h.store.clone()));

        let handles: Vec<_> = (0..11)
            .map(|i| {
                let service = service.clone();
                let password = if i == 5 { "Passw0rd" } else { "Wr0ngPass" };
                tokio::spawn(async move { service.signin(signin_request("a@x.com", password)).await })
            })
            .collect();
        for handle in handles {
            let _ = handle.await.unwrap();
        }

        // Ten failures are always counted; a success can only reset fewer than five of them.
        let stored = h.store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert!(stored.locked_until.is_some());
        assert!(stored.failed_attempt_count >= 6);
    }
}
