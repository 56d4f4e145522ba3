//! Backend client module
//!
//! This module contains the HTTP [`ApiClient`] and the [`MpClient`] facade
//! that wires credentials, gated requests and the real-time session together.

mod api_client;
pub use api_client::{ApiClient, ApiClientBuilder};

mod mp_client;
pub use mp_client::MpClient;

mod builder;
pub use builder::MpClientBuilder;
