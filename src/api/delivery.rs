//! Delivery tracking API

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::error::SessionError;

/// A rider's position for an order.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RiderLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub rider_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl RiderLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            rider_id: None,
            updated_at: None,
        }
    }
}

/// Delivery tracking API
///
/// Expects a gated client so requests carry the bearer credential.
#[derive(Debug, Clone)]
pub struct DeliveryApi {
    client: ApiClient,
}

impl DeliveryApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// GET /v1/orders/{order_id}/rider-location
    pub async fn rider_location(&self, order_id: &str) -> Result<RiderLocation, SessionError> {
        let path = format!(
            "/v1/orders/{}/rider-location",
            utf8_percent_encode(order_id, NON_ALPHANUMERIC)
        );
        self.client.get(&path, &[]).await
    }
}
