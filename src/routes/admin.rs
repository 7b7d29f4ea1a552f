/// Administrative routes; mounted behind `RequireRole::new(vec![Role::Admin])`

use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::auth::AuthService;
use crate::error::AppError;
use crate::middleware::Identity;

/// GET /api/admin/users/{id}/lockout
pub async fn lockout_status(
    admin: web::ReqData<Identity>,
    path: web::Path<Uuid>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    let status = service.lockout_status(user_id).await?;

    tracing::info!(
        target: "security",
        admin_id = %admin.id(),
        user_id = %user_id,
        "Lockout status inspected"
    );
    Ok(HttpResponse::Ok().json(status))
}
