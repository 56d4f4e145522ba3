use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};

/// Bearer access token issued by the backend
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Result<Self, String> {
        let token = token.into();
        if token.is_empty() {
            return Err("AccessToken must not be empty".to_string());
        }
        if token.chars().any(char::is_whitespace) {
            return Err("AccessToken must not contain whitespace".to_string());
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

impl TryFrom<String> for AccessToken {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccessToken> for String {
    fn from(token: AccessToken) -> Self {
        token.0
    }
}

/// Credentials as kept by the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_token: AccessToken,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Credentials {
    pub fn new(
        access_token: AccessToken,
        expires_at: DateTime<Utc>,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            access_token,
            expires_at,
            refresh_token,
        }
    }

    /// True when the token expires within `buffer` from now.
    pub fn is_expiring(&self, buffer: Duration) -> bool {
        let Ok(buffer) = chrono::Duration::from_std(buffer) else {
            return true;
        };
        match Utc::now().checked_add_signed(buffer) {
            Some(deadline) => deadline >= self.expires_at,
            None => true,
        }
    }
}

/// Expiry instant as returned by the backend: an RFC 3339 string or a Unix
/// timestamp in seconds or milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExpiresAt {
    Timestamp(DateTime<Utc>),
    Epoch(i64),
}

impl ExpiresAt {
    const MILLIS_THRESHOLD: i64 = 100_000_000_000;

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        match self {
            ExpiresAt::Timestamp(at) => Some(at),
            ExpiresAt::Epoch(value) if value >= Self::MILLIS_THRESHOLD => {
                Utc.timestamp_millis_opt(value).single()
            }
            ExpiresAt::Epoch(value) => Utc.timestamp_opt(value, 0).single(),
        }
    }
}

/// Unrecognized expiry formats read as absent so the default lifetime applies
/// instead of the whole grant being rejected.
fn lenient_expiry<'de, D>(deserializer: D) -> Result<Option<ExpiresAt>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match ExpiresAt::deserialize(&value) {
        Ok(at) => Some(at),
        Err(_) => {
            warn!("Ignoring unrecognized token expiry {}", value);
            None
        }
    }))
}

/// Credential shape returned by both the refresh and the login exchange.
#[non_exhaustive]
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default, deserialize_with = "lenient_expiry")]
    pub access_token_expires_at: Option<ExpiresAt>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenGrant {
    pub fn new(
        access_token: impl Into<String>,
        access_token_expires_at: Option<ExpiresAt>,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            access_token_expires_at,
            refresh_token,
        }
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}
