//! Request gate: credential check before every outbound API call.
//!
//! Each request first awaits [`CredentialCoordinator::ensure_valid`] and then
//! carries whatever access token is current as an `Authorization: Bearer`
//! header. Concurrent requests share the coordinator's single refresh.
//!
//! # Example
//!
//! ```ignore
//! use tower::ServiceBuilder;
//! use delivery_mp_session::middleware::RequestGate;
//!
//! let service = ServiceBuilder::new()
//!     .layer(RequestGate::new(coordinator))
//!     .service(api_client);
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue, Request};
use reqwest::Request as ReqwestRequest;
use tower::{Layer, Service};

use crate::token::CredentialCoordinator;

/// Layer that gates requests on a valid credential.
#[derive(Clone)]
pub struct RequestGate {
    coordinator: CredentialCoordinator,
}

impl RequestGate {
    pub fn new(coordinator: CredentialCoordinator) -> Self {
        Self { coordinator }
    }
}

impl<S> Layer<S> for RequestGate {
    type Service = RequestGateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestGateService {
            inner,
            coordinator: self.coordinator.clone(),
        }
    }
}

/// Service created by [`RequestGate`].
#[derive(Clone)]
pub struct RequestGateService<S> {
    inner: S,
    coordinator: CredentialCoordinator,
}

impl<S> RequestGateService<S> {
    /// Resolve the credential to attach, logging instead of failing.
    async fn current_token(coordinator: &CredentialCoordinator) -> Option<String> {
        if let Err(e) = coordinator.ensure_valid(false).await {
            log::warn!("Credential check failed before request: {}", e);
        }
        coordinator.current_access_token()
    }
}

fn insert_bearer(headers: &mut HeaderMap, token: &str) {
    match HeaderValue::from_str(&format!("Bearer {token}")) {
        Ok(mut value) => {
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Err(_) => log::warn!("Access token is not a valid header value; sending without it"),
    }
}

impl<S, B> Service<Request<B>> for RequestGateService<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Future: Send,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let coordinator = self.coordinator.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if let Some(token) = Self::current_token(&coordinator).await {
                insert_bearer(req.headers_mut(), &token);
            }
            inner.call(req).await
        })
    }
}

impl<S> Service<ReqwestRequest> for RequestGateService<S>
where
    S: Service<ReqwestRequest> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: ReqwestRequest) -> Self::Future {
        let coordinator = self.coordinator.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if let Some(token) = Self::current_token(&coordinator).await {
                insert_bearer(req.headers_mut(), &token);
            }
            inner.call(req).await
        })
    }
}
