//! Backend HTTP Client
//!
//! Provides the HTTP client wrapper used by the credential exchanges and by
//! gated API calls.

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};

use crate::error::{HttpError, SessionError};
use crate::types::response::unwrap_envelope;

pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

type MiddlewareFuture =
    Pin<Box<dyn Future<Output = Result<reqwest::Response, reqwest::Error>> + Send>>;
type MiddlewareExecutor = Arc<dyn Fn(reqwest::Request) -> MiddlewareFuture + Send + Sync>;

/// Backend API Client
///
/// Reusable HTTP client for calling the platform backend.
/// Built with reqwest for async HTTP requests.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    middleware_executor: Option<MiddlewareExecutor>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field(
                "middleware_executor",
                &self.middleware_executor.as_ref().map(|_| ".."),
            )
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a new client builder
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the underlying [`reqwest::Client`] for raw HTTP requests.
    ///
    /// Note: requests made through this client bypass the middleware pipeline.
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Route every request of the returned client through `layer`.
    ///
    /// The layer wraps a copy of this client without any previously
    /// installed layer; compose layers with `tower::ServiceBuilder` first.
    pub fn with_layer<L>(self, layer: L) -> Self
    where
        L: Layer<ApiClient>,
        L::Service: Service<reqwest::Request, Response = reqwest::Response, Error = reqwest::Error>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<reqwest::Request>>::Future: Send + 'static,
    {
        let plain = ApiClient {
            middleware_executor: None,
            ..self.clone()
        };
        let executor = make_middleware_executor(layer.layer(plain));
        self.with_middleware_executor(executor)
    }

    pub(crate) fn with_middleware_executor(mut self, executor: MiddlewareExecutor) -> Self {
        self.middleware_executor = Some(executor);
        self
    }

    pub(crate) async fn send_request(
        &self,
        request: reqwest::Request,
    ) -> Result<reqwest::Response, reqwest::Error> {
        if let Some(executor) = &self.middleware_executor {
            (executor)(request).await
        } else {
            self.http.execute(request).await
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::Request,
    ) -> Result<T, SessionError> {
        let response = self.send_request(request).await?;

        if let Err(e) = response.error_for_status_ref() {
            return Err(e.into());
        }

        let value: serde_json::Value = response.json().await?;
        let payload = unwrap_envelope(value)?;

        serde_json::from_value(payload)
            .map_err(|e| SessionError::Http(HttpError::Decode(e.to_string())))
    }

    /// Make a GET request to the backend
    ///
    /// # Errors
    /// - Returns `SessionError::Http` for non-2xx HTTP status codes or decode failures
    /// - Returns `SessionError::Api` when the response envelope carries an error code
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SessionError> {
        let url = format!("{}{}", self.base_url, path);
        let request = self.http.get(url).query(query).build()?;
        self.execute(request).await
    }

    /// Make a POST request to the backend
    ///
    /// # Errors
    /// - Returns `SessionError::Http` for non-2xx HTTP status codes or decode failures
    /// - Returns `SessionError::Api` when the response envelope carries an error code
    pub async fn post<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SessionError> {
        let url = format!("{}{}", self.base_url, path);
        let request = self.http.post(url).json(body).build()?;
        self.execute(request).await
    }
}

impl Service<reqwest::Request> for ApiClient {
    type Response = reqwest::Response;
    type Error = reqwest::Error;
    type Future = MiddlewareFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: reqwest::Request) -> Self::Future {
        let client = self.clone();
        Box::pin(async move { client.send_request(req).await })
    }
}

fn make_middleware_executor<S>(service: S) -> MiddlewareExecutor
where
    S: Service<reqwest::Request, Response = reqwest::Response, Error = reqwest::Error>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    let service = Arc::new(service);

    Arc::new(move |request: reqwest::Request| {
        let mut service = (*service).clone();
        Box::pin(async move { service.call(request).await })
    })
}

/// Builder for ApiClient
///
/// # Example
///
/// ```rust
/// use delivery_mp_session::client::ApiClient;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = ApiClient::builder()
///         .base_url("https://api.example.com")
///         .build()?;
///
///     assert_eq!(client.base_url(), "https://api.example.com");
///     Ok(())
/// }
/// ```
#[derive(Debug, Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl ApiClientBuilder {
    /// Set the backend base URL (`http://` or `https://`)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the total timeout for requests
    ///
    /// Default: 30 seconds
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connection timeout
    ///
    /// Default: 10 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Build the ApiClient
    ///
    /// # Errors
    /// Returns an error if the base URL is missing or not http(s)
    pub fn build(self) -> Result<ApiClient, SessionError> {
        let base_url = self
            .base_url
            .ok_or_else(|| SessionError::Config("base_url is required".to_string()))?;

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(SessionError::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                base_url
            )));
        }
        let base_url = base_url.trim_end_matches('/').to_string();

        let timeout = self
            .timeout
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let connect_timeout = self
            .connect_timeout
            .unwrap_or(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS));

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(ApiClient {
            http: client,
            base_url,
            middleware_executor: None,
        })
    }
}
