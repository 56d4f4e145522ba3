//! Backend API modules
//!
//! - [`auth`] - Refresh-token and native-login credential exchanges
//! - [`delivery`] - Rider location lookup for order tracking

pub mod auth;
pub mod delivery;

pub use auth::{AuthApi, LoginRequest};
pub use delivery::{DeliveryApi, RiderLocation};
