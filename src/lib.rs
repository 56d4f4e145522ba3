//! Client session layer for the delivery Mini Program
//!
//! Keeps two things healthy for the lifetime of the app: the user's
//! credentials and a real-time duplex connection to the backend.
//!
//! - A [`CredentialCoordinator`] refreshes credentials with at most one
//!   refresh in flight. It falls back from the refresh-token exchange to a
//!   native-login code exchange, and clears the store when both fail.
//! - A [`RequestGate`](middleware::RequestGate) tower layer makes every API
//!   call wait for a valid credential and attaches it as a bearer token.
//! - A [`TransportSession`] connects the real-time channel with the current
//!   token. It sends heartbeats, acknowledges messages, and reconnects with
//!   linear backoff.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use delivery_mp_session::{MpClient, SessionEvent};
//! use delivery_mp_session::login::{DeviceInfo, StaticLogin};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = MpClient::builder()
//!         .base_url("https://api.example.com")
//!         .native_login(Arc::new(StaticLogin::new("code", DeviceInfo::new("dev-1", "ios"))))
//!         .build()?;
//!
//!     let mut events = client.session().events();
//!     client.connect().await?;
//!     client.session().subscribe(["order:A100"]);
//!
//!     while let Some(event) = events.recv().await {
//!         if let SessionEvent::Message(message) = event {
//!             println!("{}: {}", message.kind.as_str(), message.data);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`api`] - Backend endpoints (credential exchanges, rider location)
//! - [`client`] - HTTP client and the [`MpClient`] facade
//! - [`error`] - Error types
//! - [`login`] - Native login primitive boundary
//! - [`middleware`] - Tower layers (request gate, logging)
//! - [`session`] - Real-time transport session
//! - [`store`] - Credential storage boundary
//! - [`token`] - Credential coordinator
//! - [`tracking`] - Rider tracking over push with polling fallback
//! - [`types`] - Credentials and wire envelopes
//!
//! ## Error Handling
//!
//! Everything returns [`SessionError`]. It is `Clone`, so every caller that
//! joined a shared refresh sees the same failure:
//!
//! ```rust,ignore
//! use delivery_mp_session::SessionError;
//!
//! match client.access_token().await {
//!     Ok(token) => { /* use token */ }
//!     Err(SessionError::Auth(reason)) => {
//!         // Credentials are gone; call `client.login()` after user action.
//!         eprintln!("Login required: {}", reason);
//!     }
//!     Err(e) if e.is_transient() => { /* retry later */ }
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade; install any logger in the host
//! application to see connection lifecycle and request lines. Credential
//! values are never logged.

pub mod api;
pub mod client;
pub mod error;
pub mod login;
pub mod middleware;
pub mod session;
pub mod store;
pub mod token;
pub mod tracking;
pub mod types;

mod utils;

pub use client::{ApiClient, MpClient, MpClientBuilder};
pub use error::{HttpError, SessionError};
pub use session::{
    ConnectionState, SessionConfig, SessionEvent, SessionEvents, SessionStatus, TransportSession,
};
pub use store::{CredentialStore, MemoryCredentialStore};
pub use token::{CoordinatorConfig, CredentialCoordinator};
pub use tracking::{DeliveryTracker, TrackedOrder};
pub use types::{Credentials, InboundMessage, MessageKind, OutboundEnvelope};
