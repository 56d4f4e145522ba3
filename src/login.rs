//! Native login primitive boundary.

use futures::future::{self, BoxFuture};
use serde::Serialize;

use crate::error::SessionError;

/// Device identity sent with the re-authentication exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_type: String,
}

impl DeviceInfo {
    pub fn new(device_id: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            device_type: device_type.into(),
        }
    }
}

/// The device's native login primitive (`wx.login` on the Mini Program host).
///
/// Produces a one-shot login code that the backend exchanges for credentials.
pub trait NativeLogin: Send + Sync {
    fn login_code(&self) -> BoxFuture<'_, Result<String, SessionError>>;

    fn device(&self) -> DeviceInfo;
}

/// A login primitive that hands out a fixed code, or none at all.
#[derive(Debug, Clone)]
pub struct StaticLogin {
    code: Option<String>,
    device: DeviceInfo,
}

impl StaticLogin {
    pub fn new(code: impl Into<String>, device: DeviceInfo) -> Self {
        Self {
            code: Some(code.into()),
            device,
        }
    }

    /// A primitive whose every call fails, for hosts without native login.
    pub fn unavailable(device: DeviceInfo) -> Self {
        Self { code: None, device }
    }
}

impl NativeLogin for StaticLogin {
    fn login_code(&self) -> BoxFuture<'_, Result<String, SessionError>> {
        let result = self
            .code
            .clone()
            .ok_or_else(|| SessionError::Auth("native login unavailable".to_string()));
        Box::pin(future::ready(result))
    }

    fn device(&self) -> DeviceInfo {
        self.device.clone()
    }
}
