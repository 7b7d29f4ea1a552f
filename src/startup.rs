use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{AuthService, PasswordHasher, TokenIssuer};
use crate::clock::Clock;
use crate::configuration::Settings;
use crate::error::{AppError, ValidationErrors};
use crate::logger::LoggerMiddleware;
use crate::middleware::{AccessControl, Authenticate, RequireRole};
use crate::routes::{
    check_email, get_current_user, health_check, lockout_status, logout, signin, signup,
    update_password,
};
use crate::store::{CredentialStore, Role};

const JSON_LIMIT_BYTES: usize = 16 * 1024;

/// Everything the HTTP layer needs, wired from settings
pub struct Services {
    pub auth: web::Data<AuthService>,
    pub access: Arc<AccessControl>,
}

impl Services {
    pub fn new(settings: &Settings, store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        let tokens = Arc::new(TokenIssuer::new(&settings.jwt, clock.clone()));
        let auth = AuthService::new(
            store.clone(),
            PasswordHasher::new(settings.security.bcrypt_cost),
            tokens.clone(),
            settings.security.lockout_policy(),
            clock.clone(),
        );
        let access = AccessControl::new(tokens, store, clock);

        Self {
            auth: web::Data::new(auth),
            access: Arc::new(access),
        }
    }
}

/// Malformed or mistyped JSON bodies become a field-level validation error
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_LIMIT_BYTES)
        .error_handler(|err, _req| {
            AppError::from(ValidationErrors::single("body", err.to_string())).into()
        })
}

pub fn run(listener: TcpListener, services: Services) -> Result<Server, std::io::Error> {
    let Services { auth, access } = services;

    let server = HttpServer::new(move || {
        App::new()
            .wrap(LoggerMiddleware)
            .app_data(auth.clone())
            .app_data(json_config())
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(health_check))
                    .service(
                        web::scope("/auth")
                            .route("/signup", web::post().to(signup))
                            .route("/signin", web::post().to(signin))
                            .route("/check-email", web::post().to(check_email))
                            .service(
                                web::resource("/me")
                                    .wrap(Authenticate::new(access.clone()))
                                    .route(web::get().to(get_current_user)),
                            )
                            .service(
                                web::resource("/update-password")
                                    .wrap(Authenticate::new(access.clone()))
                                    .route(web::patch().to(update_password)),
                            )
                            .service(
                                web::resource("/logout")
                                    .wrap(Authenticate::new(access.clone()))
                                    .route(web::post().to(logout)),
                            ),
                    )
                    // Last wrap runs first: authenticate, then check the role.
                    .service(
                        web::scope("/admin")
                            .wrap(RequireRole::new(vec![Role::Admin]))
                            .wrap(Authenticate::new(access.clone()))
                            .route("/users/{id}/lockout", web::get().to(lockout_status)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
