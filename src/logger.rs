use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::LocalBoxFuture;
use log::{info, warn};
use std::rc::Rc;
use std::time::Instant;

/// Access log middleware
///
/// One line per request with client address, user agent, whether an
/// `Authorization` header was sent, status and latency. Header values and
/// bodies are never logged.
pub struct LoggerMiddleware;

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggerMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(LoggerMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
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
        let start_time = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let ip = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();
        let user_agent = req
            .headers()
            .get("User-Agent")
            .and_then(|h| h.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        let has_auth = req.headers().contains_key("Authorization");

        let service = self.service.clone();

        Box::pin(async move {
            let res = service.call(req).await;
            let elapsed = start_time.elapsed().as_millis();

            match &res {
                Ok(res) if res.status().is_client_error() || res.status().is_server_error() => {
                    warn!(
                        "{} {} - Status: {} ({}ms) ip={} ua=\"{}\" auth={}",
                        method,
                        path,
                        res.status().as_u16(),
                        elapsed,
                        ip,
                        user_agent,
                        has_auth
                    );
                }
                Ok(res) => {
                    info!(
                        "{} {} - Status: {} ({}ms) ip={} ua=\"{}\" auth={}",
                        method,
                        path,
                        res.status().as_u16(),
                        elapsed,
                        ip,
                        user_agent,
                        has_auth
                    );
                }
                Err(e) => {
                    warn!(
                        "{} {} - Status: {} ({}ms) ip={} ua=\"{}\" auth={}",
                        method,
                        path,
                        e.as_response_error().status_code().as_u16(),
                        elapsed,
                        ip,
                        user_agent,
                        has_auth
                    );
                }
            }

            res
        })
    }
}
