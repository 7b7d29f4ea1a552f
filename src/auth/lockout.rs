/// Brute-force lockout rules
///
/// Per-account state machine: `Unlocked(count)` and `Locked(until)`.
/// Every failed signin moves the machine through `record_failure`; only a
/// successful login returns it to `Unlocked(0)`.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failed attempts that trigger a lock
    pub max_failed_attempts: u32,
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_duration: Duration::hours(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked {
        failed_attempts: u32,
    },
    Locked {
        failed_attempts: u32,
        until: DateTime<Utc>,
    },
}

impl LockState {
    pub fn from_parts(failed_attempts: u32, locked_until: Option<DateTime<Utc>>) -> Self {
        match locked_until {
            Some(until) => LockState::Locked {
                failed_attempts,
                until,
            },
            None => LockState::Unlocked { failed_attempts },
        }
    }

    pub fn failed_attempts(&self) -> u32 {
        match self {
            LockState::Unlocked { failed_attempts } | LockState::Locked { failed_attempts, .. } => {
                *failed_attempts
            }
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, LockState::Locked { .. })
    }
}

/// Counter and lock after one more failed attempt.
///
/// - active lock: count + 1, lock kept
/// - expired lock: count restarts at 1, lock cleared
/// - no lock: count + 1, lock set once the count reaches the threshold
///
/// Stores must apply the result in the same atomic step that read the inputs.
pub fn record_failure(
    failed_attempts: u32,
    locked_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    policy: &LockoutPolicy,
) -> (u32, Option<DateTime<Utc>>) {
    match locked_until {
        Some(until) if until > now => (failed_attempts.saturating_add(1), Some(until)),
        Some(_) => (1, None),
        None => {
            let count = failed_attempts.saturating_add(1);
            if count >= policy.max_failed_attempts {
                (count, Some(now + policy.lockout_duration))
            } else {
                (count, None)
            }
        }
    }
}
