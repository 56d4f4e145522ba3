use std::sync::Arc;
use std::time::Duration;

use tower::ServiceBuilder;

use crate::api::{AuthApi, DeliveryApi};
use crate::error::SessionError;
use crate::login::NativeLogin;
use crate::middleware::{LoggingMiddleware, RequestGate};
use crate::session::{Connector, SessionConfig, TransportSession, WsConnector};
use crate::store::{CredentialStore, MemoryCredentialStore};
use crate::token::{CoordinatorConfig, CredentialCoordinator};
use crate::tracking::DeliveryTracker;

use super::api_client::{ApiClient, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS};
use super::MpClient;

/// Builder for [`MpClient`]
///
/// `base_url` and `native_login` are required. Everything else has a default:
/// an in-memory credential store, a WebSocket connector and the default
/// session and coordinator tuning.
#[must_use]
#[derive(Default)]
pub struct MpClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    store: Option<Arc<dyn CredentialStore>>,
    native_login: Option<Arc<dyn NativeLogin>>,
    coordinator_config: Option<CoordinatorConfig>,
    session_config: Option<Box<dyn FnOnce(SessionConfig) -> SessionConfig + Send>>,
    connector: Option<Arc<dyn Connector>>,
    verbose_logging: bool,
    poll_interval: Option<Duration>,
}

impl std::fmt::Debug for MpClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpClientBuilder")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("coordinator_config", &self.coordinator_config)
            .field("verbose_logging", &self.verbose_logging)
            .finish_non_exhaustive()
    }
}

impl MpClientBuilder {
    /// HTTP base of the backend; the socket endpoint is derived from it.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn native_login(mut self, login: Arc<dyn NativeLogin>) -> Self {
        self.native_login = Some(login);
        self
    }

    pub fn coordinator_config(mut self, config: CoordinatorConfig) -> Self {
        self.coordinator_config = Some(config);
        self
    }

    /// Adjust the session tuning. The base URL is filled in by the builder.
    pub fn session_config<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(SessionConfig) -> SessionConfig + Send + 'static,
    {
        self.session_config = Some(Box::new(configure));
        self
    }

    /// Replace the WebSocket connector, e.g. with an in-memory one.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Log requests at `debug` with status text.
    pub fn verbose_logging(mut self) -> Self {
        self.verbose_logging = true;
        self
    }

    /// Poll interval of the delivery tracker while the session is down.
    pub fn tracking_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Build the client and spawn its session driver.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    /// Returns `SessionError::Config` if `base_url` or `native_login` is
    /// missing, or `base_url` is not http(s)
    pub fn build(self) -> Result<MpClient, SessionError> {
        let base_url = self
            .base_url
            .ok_or_else(|| SessionError::Config("base_url is required".to_string()))?;
        let native_login = self
            .native_login
            .ok_or_else(|| SessionError::Config("native_login is required".to_string()))?;

        let timeout = self
            .timeout
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let connect_timeout = self
            .connect_timeout
            .unwrap_or(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS));

        let client = ApiClient::builder()
            .base_url(base_url)
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;

        let logging = if self.verbose_logging {
            LoggingMiddleware::new().verbose()
        } else {
            LoggingMiddleware::new()
        };

        // Credential exchanges must not pass through the gate they feed.
        let auth_client = client.clone().with_layer(logging.clone());

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let coordinator = CredentialCoordinator::with_config(
            AuthApi::new(auth_client),
            native_login,
            store,
            self.coordinator_config.unwrap_or_default(),
        );

        let gated = client.clone().with_layer(
            ServiceBuilder::new()
                .layer(RequestGate::new(coordinator.clone()))
                .layer(logging),
        );

        let mut session_config = SessionConfig::new(client.base_url());
        if let Some(configure) = self.session_config {
            session_config = configure(session_config);
        }
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WsConnector::new()));
        let session = TransportSession::new(session_config, coordinator.clone(), connector);

        let mut tracker = DeliveryTracker::new(session.clone(), DeliveryApi::new(gated.clone()));
        if let Some(interval) = self.poll_interval {
            tracker = tracker.poll_interval(interval);
        }

        Ok(MpClient::from_parts(coordinator, gated, session, tracker))
    }
}
