/// User records as held by the credential store, and their outward view

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Basic,
    Pro,
    Premium,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Basic => "basic",
            Plan::Pro => "pro",
            Plan::Premium => "premium",
        }
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Plan::Basic),
            "pro" => Ok(Plan::Pro),
            "premium" => Ok(Plan::Premium),
            other => Err(format!("unknown plan '{}'", other)),
        }
    }
}

/// Stored identity plus lockout state
#[derive(Clone)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    /// Always lowercase
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub plan: Plan,
    pub role: Role,
    pub failed_attempt_count: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Inside an active lockout window
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if until > now)
    }

    /// A lock was applied and has not yet been cleared, expired or not.
    /// Signin routes such accounts through the failed-attempt path.
    pub fn has_lock_marker(&self) -> bool {
        self.locked_until.is_some()
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            date_of_birth: self.date_of_birth,
            plan: self.plan,
            role: self.role,
            failed_attempt_count: self.failed_attempt_count,
            locked_until: self.locked_until,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("role", &self.role)
            .field("failed_attempt_count", &self.failed_attempt_count)
            .field("locked_until", &self.locked_until)
            .field("last_login_at", &self.last_login_at)
            .finish()
    }
}

/// Everything about a user except the password hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    pub plan: Plan,
    pub role: Role,
    pub failed_attempt_count: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to `CredentialStore::create`; the store assigns the id
#[derive(Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub plan: Plan,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl NewUser {
    pub fn into_user(self, id: Uuid) -> User {
        User {
            id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            password_hash: self.password_hash,
            phone: self.phone,
            date_of_birth: self.date_of_birth,
            plan: self.plan,
            role: self.role,
            failed_attempt_count: 0,
            locked_until: None,
            last_login_at: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn user() -> User {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        NewUser {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "$2b$04$secret".to_string(),
            phone: None,
            date_of_birth: None,
            plan: Plan::Basic,
            role: Role::User,
            created_at: now,
        }
        .into_user(Uuid::new_v4())
    }

    #[test]
    fn test_new_user_starts_unlocked() {
        let user = user();
        assert_eq!(user.failed_attempt_count, 0);
        assert!(user.locked_until.is_none());
        assert!(!user.has_lock_marker());
    }

    #[test]
    fn test_lock_predicates() {
        let mut user = user();
        let now = user.created_at;
        user.locked_until = Some(now + Duration::minutes(5));
        assert!(user.is_locked(now));
        assert!(user.has_lock_marker());

        user.locked_until = Some(now);
        assert!(!user.is_locked(now));
        assert!(user.has_lock_marker());
    }

    #[test]
    fn test_profile_never_carries_password_hash() {
        let user = user();
        let json = serde_json::to_value(user.profile()).unwrap();

        assert_eq!(json["email"], "ada@example.com");
        assert_eq!(json["firstName"], "Ada");
        assert_eq!(json["role"], "user");
        assert!(json.get("passwordHash").is_none());
        assert!(!json.to_string().contains("$2b$"));
        assert!(!format!("{:?}", user).contains("$2b$"));
    }

    #[test]
    fn test_role_and_plan_parse() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert!("root".parse::<Role>().is_err());
        assert_eq!("pro".parse::<Plan>(), Ok(Plan::Pro));
        assert_eq!(Plan::default().as_str(), "basic");
    }
}
