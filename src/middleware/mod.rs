//! Middleware components for the backend client.
//!
//! Tower layers composed around [`ApiClient`](crate::client::ApiClient):
//!
//! - [`RequestGate`] - Awaits a valid credential and injects the bearer token
//! - [`LoggingMiddleware`] - Logs request/response lines with redaction
//!
//! ## Usage
//!
//! ```ignore
//! use tower::ServiceBuilder;
//! use delivery_mp_session::middleware::{LoggingMiddleware, RequestGate};
//!
//! let service = ServiceBuilder::new()
//!     .layer(LoggingMiddleware::new())
//!     .layer(RequestGate::new(coordinator))
//!     .service(api_client);
//! ```

pub use tower::{Layer, Service, ServiceBuilder};

mod auth;
mod logging;

pub use auth::{RequestGate, RequestGateService};
pub use logging::{LoggingMiddleware, LoggingMiddlewareService};
pub(crate) use logging::redact_url;
