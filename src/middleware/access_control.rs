/// Access Control Middleware
///
/// `Authenticate` resolves the bearer token to a live, unlocked account and
/// attaches its `Identity` to the request. `RequireRole` then admits only
/// the listed roles. Rejections are rendered through `AppError`, so they
/// carry the same body as every other failure.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::TokenIssuer;
use crate::clock::Clock;
use crate::error::{AppError, AuthError, StoreError};
use crate::store::{CredentialStore, Role, UserProfile};

/// The authenticated caller, available to handlers as `web::ReqData<Identity>`
#[derive(Debug, Clone)]
pub struct Identity {
    pub user: UserProfile,
}

impl Identity {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.role
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Admit the identity only if its role is listed.
/// A missing identity means authentication never ran for this request.
pub fn restrict_to(identity: Option<&Identity>, allowed: &[Role]) -> Result<(), AuthError> {
    let identity = identity.ok_or(AuthError::TokenMissing)?;
    if allowed.contains(&identity.role()) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

pub struct AccessControl {
    tokens: Arc<TokenIssuer>,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
}

impl AccessControl {
    pub fn new(
        tokens: Arc<TokenIssuer>,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tokens,
            store,
            clock,
        }
    }

    /// Resolve an `Authorization` header value to an identity
    ///
    /// # Errors
    /// - `TokenMissing` when there is no bearer token
    /// - `TokenInvalid` / `TokenExpired` when verification fails
    /// - `Store(NotFound)` when the subject no longer exists
    /// - `AccountLocked` inside an active lockout window
    pub async fn protect(&self, authorization: Option<&str>) -> Result<Identity, AppError> {
        let token = bearer_token(authorization).ok_or(AuthError::TokenMissing)?;
        let user_id = self.tokens.verify(token)?;

        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(StoreError::NotFound)?;

        if user.is_locked(self.clock.now()) {
            tracing::warn!(
                target: "security",
                user_id = %user.id,
                "Token presented for locked account"
            );
            return Err(AuthError::AccountLocked.into());
        }

        Ok(Identity {
            user: user.profile(),
        })
    }
}

/// Requires a valid bearer token on every request in the wrapped scope
pub struct Authenticate {
    access: Arc<AccessControl>,
}

impl Authenticate {
    pub fn new(access: Arc<AccessControl>) -> Self {
        Self { access }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authenticate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthenticateService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(AuthenticateService {
            service: Rc::new(service),
            access: self.access.clone(),
        }))
    }
}

pub struct AuthenticateService<S> {
    service: Rc<S>,
    access: Arc<AccessControl>,
}

impl<S, B> Service<ServiceRequest> for AuthenticateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let authorization = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        let service = self.service.clone();
        let access = self.access.clone();

        Box::pin(async move {
            let identity = access.protect(authorization.as_deref()).await?;

            tracing::debug!(user_id = %identity.id(), "Bearer token accepted");
            req.extensions_mut().insert(identity);

            service.call(req).await
        })
    }
}

/// Admits only identities whose role is listed; wrap inside `Authenticate`
pub struct RequireRole {
    allowed: Rc<Vec<Role>>,
}

impl RequireRole {
    pub fn new(allowed: Vec<Role>) -> Self {
        Self {
            allowed: Rc::new(allowed),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireRole
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireRoleService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RequireRoleService {
            service: Rc::new(service),
            allowed: self.allowed.clone(),
        }))
    }
}

pub struct RequireRoleService<S> {
    service: Rc<S>,
    allowed: Rc<Vec<Role>>,
}

impl<S, B> Service<ServiceRequest> for RequireRoleService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let verdict = {
            let extensions = req.extensions();
            restrict_to(extensions.get::<Identity>(), &self.allowed)
        };

        match verdict {
            Ok(()) => {
                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Err(e) => Box::pin(async move { Err(AppError::from(e).into()) }),
        }
    }
}
