/// Authentication Routes
///
/// Signup, signin, current user, password change, logout and email
/// availability. Handlers only translate HTTP to `AuthService` calls.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::auth::{AuthService, SigninRequest, SignupRequest, UpdatePasswordRequest};
use crate::error::{AppError, ErrorContext};
use crate::middleware::Identity;

#[derive(Deserialize)]
pub struct CheckEmailRequest {
    #[serde(default)]
    pub email: String,
}

/// POST /api/auth/signup
///
/// # Errors
/// - 400: Validation errors, or email already registered
/// - 500: Internal server error
pub async fn signup(
    form: web::Json<SignupRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let outcome = service.signup(form.into_inner()).await?;
    Ok(HttpResponse::Created().json(outcome))
}

/// POST /api/auth/signin
///
/// Every rejection is also written to the security log with the client
/// address and user agent.
///
/// # Errors
/// - 400: Validation error
/// - 401: Invalid credentials or account locked
/// - 500: Internal server error
pub async fn signin(
    req: HttpRequest,
    form: web::Json<SigninRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let email = form.email.trim().to_lowercase();

    match service.signin(form).await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(outcome)),
        Err(e) => {
            let ip = req
                .connection_info()
                .realip_remote_addr()
                .unwrap_or("unknown")
                .to_string();
            let user_agent = req
                .headers()
                .get("User-Agent")
                .and_then(|h| h.to_str().ok())
                .unwrap_or("unknown");

            tracing::warn!(
                target: "security",
                event = "FAILED_LOGIN_ATTEMPT",
                email = %email,
                reason = e.code(),
                ip = %ip,
                user_agent = %user_agent,
                "Signin rejected"
            );
            Err(e)
        }
    }
}

/// GET /api/auth/me
pub async fn get_current_user(
    identity: web::ReqData<Identity>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user = service.profile(identity.id()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "user": user })))
}

/// PATCH /api/auth/update-password
///
/// Returns a fresh token. Tokens issued before the change stay valid until
/// they expire.
///
/// # Errors
/// - 400: Validation error or incorrect current password
/// - 401: Token errors (handled by middleware)
pub async fn update_password(
    identity: web::ReqData<Identity>,
    form: web::Json<UpdatePasswordRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("update_password").with_user_id(identity.id().to_string());

    match service.update_password(identity.id(), form.into_inner()).await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(outcome)),
        Err(e) => {
            context.log_error(&e);
            Err(e)
        }
    }
}

/// POST /api/auth/logout
///
/// Advisory: tokens are stateless, so the client discards its copy.
pub async fn logout(identity: web::ReqData<Identity>) -> HttpResponse {
    tracing::info!(user_id = %identity.id(), "User logged out");
    HttpResponse::Ok().json(serde_json::json!({ "message": "Logged out successfully" }))
}

/// POST /api/auth/check-email
pub async fn check_email(
    form: web::Json<CheckEmailRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let available = service.email_available(&form.email).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "available": available })))
}
