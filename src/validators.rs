/// Input validators for account fields
/// Features:
/// 1. DoS Protection: Input length limits
/// 2. Email normalization (trimmed, lowercased) so uniqueness is case-insensitive
/// 3. Password strength rules
/// 4. Optional profile fields (phone, date of birth, plan)

use chrono::{DateTime, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;

use crate::store::Plan;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MAX_NAME_LENGTH: usize = 50;
const MIN_NAME_LENGTH: usize = 1;
pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_PASSWORD_BYTES: usize = 128;

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$").unwrap();

    // E.164: optional plus, no leading zero, up to 15 digits
    static ref PHONE_REGEX: Regex = Regex::new(r"^\+?[1-9]\d{1,14}$").unwrap();
}

/// Normalizes and validates an email address
/// - Trims surrounding whitespace and lowercases
/// - Verifies length constraints
/// - Checks format
pub fn normalize_email(email: &str) -> Result<String, ValidationError> {
    let normalized = email.trim().to_lowercase();

    if normalized.is_empty() {
        return Err(ValidationError::EmptyField("email"));
    }

    if normalized.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email", MIN_EMAIL_LENGTH));
    }

    if normalized.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email", MAX_EMAIL_LENGTH));
    }

    if normalized.contains('\0') || !EMAIL_REGEX.is_match(&normalized) {
        return Err(ValidationError::InvalidFormat("email"));
    }

    Ok(normalized)
}

/// Validates a first or last name
pub fn validate_name(field: &'static str, name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }

    let length = trimmed.chars().count();
    if length < MIN_NAME_LENGTH {
        return Err(ValidationError::TooShort(field, MIN_NAME_LENGTH));
    }

    if length > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong(field, MAX_NAME_LENGTH));
    }

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::SuspiciousContent(field));
    }

    Ok(trimmed.to_string())
}

/// Validates password strength
///
/// Requirements:
/// - Minimum 6 characters
/// - Maximum 128 bytes (bcrypt only reads the first 72)
/// - At least one lowercase letter, one uppercase letter and one digit
pub fn validate_password(field: &'static str, password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort(field, MIN_PASSWORD_LENGTH));
    }

    if password.len() > MAX_PASSWORD_BYTES {
        return Err(ValidationError::TooLong(field, MAX_PASSWORD_BYTES));
    }

    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(ValidationError::WeakPassword(field));
    }

    Ok(())
}

/// Validates an optional phone number; blank input counts as absent
pub fn validate_phone(phone: Option<&str>) -> Result<Option<String>, ValidationError> {
    match phone.map(str::trim) {
        None | Some("") => Ok(None),
        Some(p) if PHONE_REGEX.is_match(p) => Ok(Some(p.to_string())),
        Some(_) => Err(ValidationError::InvalidFormat("phone")),
    }
}

/// Parses an optional date of birth given as `YYYY-MM-DD` or RFC 3339
pub fn parse_date_of_birth(
    value: Option<&str>,
    today: NaiveDate,
) -> Result<Option<NaiveDate>, ValidationError> {
    let raw = match value.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(raw) => raw,
    };

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .ok_or(ValidationError::InvalidFormat("dateOfBirth"))?;

    if date > today {
        return Err(ValidationError::InFuture("dateOfBirth"));
    }

    Ok(Some(date))
}

/// Parses an optional plan, defaulting to basic
pub fn parse_plan(value: Option<&str>) -> Result<Plan, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(Plan::default()),
        Some(raw) => raw
            .parse::<Plan>()
            .map_err(|_| ValidationError::NotAllowed("plan", "basic, pro, premium")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField(&'static str),
    TooShort(&'static str, usize),
    TooLong(&'static str, usize),
    InvalidFormat(&'static str),
    SuspiciousContent(&'static str),
    WeakPassword(&'static str),
    NotAllowed(&'static str, &'static str),
    InFuture(&'static str),
}

impl ValidationError {
    /// Name of the offending field as the client sent it
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::EmptyField(field)
            | ValidationError::TooShort(field, _)
            | ValidationError::TooLong(field, _)
            | ValidationError::InvalidFormat(field)
            | ValidationError::SuspiciousContent(field)
            | ValidationError::WeakPassword(field)
            | ValidationError::NotAllowed(field, _)
            | ValidationError::InFuture(field) => field,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is required", field),
            ValidationError::TooShort(field, min) => write!(f, "{} must be at least {} characters", field, min),
            ValidationError::TooLong(field, max) => write!(f, "{} must be at most {} characters", field, max),
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::SuspiciousContent(field) => write!(f, "{} contains control characters", field),
            ValidationError::WeakPassword(field) => write!(
                f,
                "{} must contain at least one lowercase letter, one uppercase letter, and one number",
                field
            ),
            ValidationError::NotAllowed(field, allowed) => write!(f, "{} must be one of: {}", field, allowed),
            ValidationError::InFuture(field) => write!(f, "{} cannot be in the future", field),
        }
    }
}

impl From<ValidationError> for crate::error::ValidationErrors {
    fn from(err: ValidationError) -> Self {
        crate::error::ValidationErrors::single(err.field(), err.to_string())
    }
}

impl From<ValidationError> for crate::error::AppError {
    fn from(err: ValidationError) -> Self {
        crate::error::AppError::Validation(err.into())
    }
}
