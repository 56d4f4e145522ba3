//! Credential exchange API
//!
//! The two backend calls the credential coordinator falls through: the
//! refresh-token exchange and the native-login code exchange.

use serde::Serialize;

use crate::client::ApiClient;
use crate::error::SessionError;
use crate::login::DeviceInfo;
use crate::types::TokenGrant;

pub(crate) const REFRESH_PATH: &str = "/v1/auth/refresh";
pub(crate) const LOGIN_PATH: &str = "/v1/auth/wechat/login";

#[derive(Debug, Clone, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Body of the re-authentication exchange.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub code: String,
    pub device_id: String,
    pub device_type: String,
}

impl LoginRequest {
    pub fn new(code: impl Into<String>, device: DeviceInfo) -> Self {
        Self {
            code: code.into(),
            device_id: device.device_id,
            device_type: device.device_type,
        }
    }
}

/// Credential exchange API
#[derive(Debug, Clone)]
pub struct AuthApi {
    client: ApiClient,
}

impl AuthApi {
    /// Create a new AuthApi over an ungated client
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Exchange a refresh token for new credentials
    ///
    /// POST /v1/auth/refresh
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, SessionError> {
        let body = RefreshRequest { refresh_token };
        let grant: TokenGrant = self.client.post(REFRESH_PATH, &body).await?;
        Self::check_grant(grant)
    }

    /// Exchange a native login code for credentials
    ///
    /// POST /v1/auth/wechat/login
    pub async fn login(&self, request: &LoginRequest) -> Result<TokenGrant, SessionError> {
        let grant: TokenGrant = self.client.post(LOGIN_PATH, request).await?;
        Self::check_grant(grant)
    }

    fn check_grant(grant: TokenGrant) -> Result<TokenGrant, SessionError> {
        if grant.access_token.is_empty() {
            return Err(SessionError::InvalidAccessToken(
                "backend returned an empty access_token".to_string(),
            ));
        }
        Ok(grant)
    }
}
