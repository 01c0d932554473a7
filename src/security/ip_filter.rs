use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use ipnetwork::IpNetwork;
use serde_json::json;
use std::{
    future::Future,
    net::{IpAddr, SocketAddr},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::warn;

#[derive(Clone)]
pub struct IpFilterLayer {
    allowed_networks: Arc<Vec<IpNetwork>>,
}

impl IpFilterLayer {
    pub fn new(allowed_networks: Vec<IpNetwork>) -> Self {
        Self {
            allowed_networks: Arc::new(allowed_networks),
        }
    }
}

impl<S> Layer<S> for IpFilterLayer {
    type Service = IpFilterService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IpFilterService {
            inner,
            allowed_networks: self.allowed_networks.clone(),
        }
    }
}

#[derive(Clone)]
pub struct IpFilterService<S> {
    inner: S,
    allowed_networks: Arc<Vec<IpNetwork>>,
}

impl<S> Service<Request<Body>> for IpFilterService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let allowed_networks = self.allowed_networks.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            // Try to get client IP from ConnectInfo extension
            let client_ip = req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip());

            // Also check X-Forwarded-For header (for proxied requests)
            let forwarded_ip = req
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse::<IpAddr>().ok());

            // Prefer forwarded IP, fallback to direct connection
            let ip_to_check = forwarded_ip.or(client_ip);

            match ip_to_check {
                Some(ip) if is_allowed(&allowed_networks, ip) => inner.call(req).await,
                Some(ip) => {
                    warn!("Rejected admin request from IP: {}", ip);
                    Ok(forbidden(format!("Access denied for IP address: {}", ip)))
                }
                None => {
                    // Couldn't determine IP, deny by default
                    warn!("Rejected admin request: could not determine client IP");
                    Ok(forbidden("Could not determine client IP".to_string()))
                }
            }
        })
    }
}

fn forbidden(message: String) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "forbidden", "message": message })),
    )
        .into_response()
}

fn is_allowed(allowed_networks: &[IpNetwork], ip: IpAddr) -> bool {
    ip.is_loopback() || allowed_networks.iter().any(|network| network.contains(ip))
}
