//! Unified session client for the delivery Mini Program

use crate::api::{DeliveryApi, RiderLocation};
use crate::error::SessionError;
use crate::session::{SessionStatus, TransportSession};
use crate::token::CredentialCoordinator;
use crate::tracking::DeliveryTracker;

use super::builder::MpClientBuilder;
use super::ApiClient;

/// Unified session client
///
/// Owns one [`CredentialCoordinator`], one gated [`ApiClient`] and one
/// [`TransportSession`], all sharing the same credential store.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use delivery_mp_session::{MpClient, login::{DeviceInfo, StaticLogin}};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = MpClient::builder()
///         .base_url("https://api.example.com")
///         .native_login(Arc::new(StaticLogin::new("code", DeviceInfo::new("dev-1", "ios"))))
///         .build()?;
///
///     client.login().await?;
///     client.connect().await?;
///
///     let mut order = client.tracker().track("A100");
///     let location = order.next().await;
///     println!("rider at {}, {}", location.latitude, location.longitude);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MpClient {
    coordinator: CredentialCoordinator,
    api: ApiClient,
    session: TransportSession,
    tracker: DeliveryTracker,
}

impl MpClient {
    pub fn builder() -> MpClientBuilder {
        MpClientBuilder::default()
    }

    pub(crate) fn from_parts(
        coordinator: CredentialCoordinator,
        api: ApiClient,
        session: TransportSession,
        tracker: DeliveryTracker,
    ) -> Self {
        Self {
            coordinator,
            api,
            session,
            tracker,
        }
    }

    pub fn coordinator(&self) -> &CredentialCoordinator {
        &self.coordinator
    }

    /// API client whose requests pass through the request gate.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn session(&self) -> &TransportSession {
        &self.session
    }

    pub fn tracker(&self) -> &DeliveryTracker {
        &self.tracker
    }

    pub fn delivery(&self) -> DeliveryApi {
        DeliveryApi::new(self.api.clone())
    }

    // Credentials

    /// Explicit login; lifts a previous authentication failure.
    pub async fn login(&self) -> Result<(), SessionError> {
        self.coordinator.login().await
    }

    /// Close the session and forget the stored credentials.
    pub async fn logout(&self) {
        self.session.close().await;
        self.coordinator.logout();
    }

    pub async fn access_token(&self) -> Result<String, SessionError> {
        self.coordinator.access_token().await
    }

    // Session

    /// Make sure the credentials are valid, then connect the session.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.coordinator.ensure_valid(false).await?;
        self.session.connect().await
    }

    pub async fn disconnect(&self) {
        self.session.close().await;
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    // Delivery

    pub async fn rider_location(&self, order_id: &str) -> Result<RiderLocation, SessionError> {
        self.delivery().rider_location(order_id).await
    }
}
