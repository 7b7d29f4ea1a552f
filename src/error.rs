/// Error Handling Module
///
/// Unified error handling for the authentication service:
/// 1. Domain-specific error types (validation, auth, token, store, config)
/// 2. A single `AppError` used for control flow with `?`
/// 3. HTTP response mapping at the boundary (status codes live only here)
/// 4. Structured error logging with request context

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;
use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether 500 responses may carry the underlying error text.
/// Switched on only for the development environment at startup.
static EXPOSE_INTERNAL_DETAILS: AtomicBool = AtomicBool::new(false);

pub fn expose_internal_details(enabled: bool) {
    EXPOSE_INTERNAL_DETAILS.store(enabled, Ordering::Relaxed);
}

fn internal_details_exposed() -> bool {
    EXPOSE_INTERNAL_DETAILS.load(Ordering::Relaxed)
}

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Collected validation failures for one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// `Ok(())` when nothing was recorded
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed")?;
        for (i, e) in self.errors.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{} {}", sep, e.field, e.message)?;
        }
        Ok(())
    }
}

impl StdError for ValidationErrors {}

/// Authentication and authorization errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    InvalidCredentials,
    AccountLocked,
    IncorrectCurrentPassword,
    TokenMissing,
    TokenInvalid,
    TokenExpired,
    Forbidden,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid credentials"),
            AuthError::AccountLocked => {
                write!(f, "Account temporarily locked. Please try again later")
            }
            AuthError::IncorrectCurrentPassword => write!(f, "Current password is incorrect"),
            AuthError::TokenMissing => {
                write!(f, "You are not logged in. Please log in to get access")
            }
            AuthError::TokenInvalid => write!(f, "Invalid token. Please log in again"),
            AuthError::TokenExpired => write!(f, "Your token has expired. Please log in again"),
            AuthError::Forbidden => {
                write!(f, "You do not have permission to perform this action")
            }
        }
    }
}

impl StdError for AuthError {}

/// Bearer token verification failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Malformed,
    InvalidSignature,
    Expired,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::Malformed => write!(f, "token is malformed"),
            TokenError::InvalidSignature => write!(f, "token signature is invalid"),
            TokenError::Expired => write!(f, "token has expired"),
        }
    }
}

impl StdError for TokenError {}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed | TokenError::InvalidSignature => AuthError::TokenInvalid,
            TokenError::Expired => AuthError::TokenExpired,
        }
    }
}

/// Credential store errors
#[derive(Debug)]
pub enum StoreError {
    DuplicateEmail,
    NotFound,
    Unavailable(String),
    Query(String),
    CorruptRecord(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::DuplicateEmail => write!(f, "User with this email already exists"),
            StoreError::NotFound => write!(f, "User not found"),
            StoreError::Unavailable(msg) => write!(f, "Credential store unavailable: {}", msg),
            StoreError::Query(msg) => write!(f, "Credential store query failed: {}", msg),
            StoreError::CorruptRecord(msg) => write!(f, "Corrupt user record: {}", msg),
        }
    }
}

impl StdError for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                StoreError::DuplicateEmail
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Query(err.to_string()),
        }
    }
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Validation(ValidationErrors),
    Auth(AuthError),
    Store(StoreError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Store(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl AppError {
    /// The auth variant, if this is one
    pub fn auth_kind(&self) -> Option<AuthError> {
        match self {
            AppError::Auth(e) => Some(*e),
            _ => None,
        }
    }

    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
                AuthError::AccountLocked => "ACCOUNT_LOCKED",
                AuthError::IncorrectCurrentPassword => "INCORRECT_CURRENT_PASSWORD",
                AuthError::TokenMissing => "TOKEN_MISSING",
                AuthError::TokenInvalid => "TOKEN_INVALID",
                AuthError::TokenExpired => "TOKEN_EXPIRED",
                AuthError::Forbidden => "FORBIDDEN",
            },
            AppError::Store(e) => match e {
                StoreError::DuplicateEmail => "DUPLICATE_EMAIL",
                StoreError::NotFound => "NOT_FOUND",
                _ => "INTERNAL_ERROR",
            },
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::Validation(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Auth(err.into())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Blocking task failed: {}", err))
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error body returned for every failed request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Unique error ID for correlating with server logs
    pub error_id: String,
    pub message: String,
    pub code: String,
    pub status: u16,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
            errors: None,
            detail: None,
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let status = self.status_code();
        let message = match self {
            AppError::Validation(_) => "Validation failed".to_string(),
            AppError::Auth(e) => e.to_string(),
            AppError::Store(e @ (StoreError::DuplicateEmail | StoreError::NotFound)) => {
                e.to_string()
            }
            _ => "Internal server error".to_string(),
        };

        let mut response = ErrorResponse::new(
            request_id.to_string(),
            message,
            self.code().to_string(),
            status.as_u16(),
        );

        match self {
            AppError::Validation(e) => response.errors = Some(e.fields().to_vec()),
            _ if status == StatusCode::INTERNAL_SERVER_ERROR && internal_details_exposed() => {
                response.detail = Some(self.to_string());
            }
            _ => {}
        }

        (status, response)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Validation error");
            }
            AppError::Auth(AuthError::Forbidden) => {
                tracing::warn!(
                    target: "security",
                    request_id = request_id,
                    event = "FORBIDDEN_ACCESS",
                    "Access denied by role check"
                );
            }
            AppError::Auth(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Authentication error");
            }
            AppError::Store(StoreError::DuplicateEmail) => {
                tracing::warn!(request_id = request_id, error = %self, "Duplicate email attempt");
            }
            AppError::Store(StoreError::NotFound) => {
                tracing::info!(request_id = request_id, error = %self, "User not found");
            }
            AppError::Store(e) => {
                tracing::error!(request_id = request_id, error = %e, "Credential store error");
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(e) => match e {
                AuthError::IncorrectCurrentPassword => StatusCode::BAD_REQUEST,
                AuthError::Forbidden => StatusCode::FORBIDDEN,
                _ => StatusCode::UNAUTHORIZED,
            },
            AppError::Store(e) => match e {
                StoreError::DuplicateEmail => StatusCode::BAD_REQUEST,
                StoreError::NotFound => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for enhanced logging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn log_error(&self, error: &AppError) {
        let context = serde_json::json!({
            "request_id": self.request_id,
            "operation": self.operation,
            "user_id": self.user_id,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match error {
            AppError::Validation(_) | AppError::Auth(_) => {
                tracing::warn!(error = %error, context = ?context, "Request rejected");
            }
            AppError::Store(StoreError::DuplicateEmail | StoreError::NotFound) => {
                tracing::info!(error = %error, context = ?context, "Request rejected");
            }
            _ => {
                tracing::error!(error = %error, context = ?context, "Request failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_collect_fields() {
        let mut errors = ValidationErrors::new();
        assert!(errors.is_empty());
        errors.add("email", "is invalid");
        errors.add("password", "is too short");

        assert!(errors.has_field("email"));
        assert!(!errors.has_field("phone"));
        assert_eq!(
            errors.to_string(),
            "Validation failed: email is invalid; password is too short"
        );
        assert!(errors.into_result().is_err());
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn test_token_errors_map_to_auth_errors() {
        assert_eq!(AuthError::from(TokenError::Malformed), AuthError::TokenInvalid);
        assert_eq!(AuthError::from(TokenError::InvalidSignature), AuthError::TokenInvalid);
        assert_eq!(AuthError::from(TokenError::Expired), AuthError::TokenExpired);
    }

    #[test]
    fn test_status_codes_follow_taxonomy() {
        let cases = vec![
            (AppError::Validation(ValidationErrors::single("email", "bad")), 400),
            (AppError::Store(StoreError::DuplicateEmail), 400),
            (AppError::Auth(AuthError::IncorrectCurrentPassword), 400),
            (AppError::Auth(AuthError::InvalidCredentials), 401),
            (AppError::Auth(AuthError::AccountLocked), 401),
            (AppError::Auth(AuthError::TokenMissing), 401),
            (AppError::Auth(AuthError::TokenInvalid), 401),
            (AppError::Auth(AuthError::TokenExpired), 401),
            (AppError::Auth(AuthError::Forbidden), 403),
            (AppError::Store(StoreError::NotFound), 404),
            (AppError::Store(StoreError::Query("boom".to_string())), 500),
            (AppError::Internal("boom".to_string()), 500),
        ];

        for (error, expected) in cases {
            assert_eq!(
                ResponseError::status_code(&error).as_u16(),
                expected,
                "unexpected status for {:?}",
                error
            );
        }
    }

    #[test]
    fn test_validation_response_carries_field_errors() {
        let error = AppError::Validation(ValidationErrors::single("phone", "is invalid"));
        let (status, body) = ErrorHandler::error_response(&error, "req-1");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "VALIDATION_ERROR");
        assert_eq!(body.error_id, "req-1");
        let fields = body.errors.expect("field errors");
        assert_eq!(fields[0].field, "phone");
        assert!(body.detail.is_none());
    }

    #[test]
    fn test_internal_response_hides_detail_by_default() {
        let error = AppError::Store(StoreError::Query("relation users missing".to_string()));
        let (status, body) = ErrorHandler::error_response(&error, "req-2");

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, "Internal server error");
        assert!(!body.message.contains("relation"));
    }

    #[test]
    fn test_error_context_creation() {
        let ctx = ErrorContext::new("user_signin");
        assert_eq!(ctx.operation, "user_signin");
        assert!(ctx.user_id.is_none());

        let ctx = ctx.with_user_id("user-123".to_string());
        assert_eq!(ctx.user_id, Some("user-123".to_string()));
    }
}
