use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::error::SessionError;

pub(crate) const WS_PATH: &str = "/v1/ws";

/// Real-time endpoint for `base_url`, carrying the bearer credential.
///
/// `http` becomes `ws` and `https` becomes `wss`; the token is the only query
/// parameter. The server derives identity and permitted channels from it.
pub fn build_endpoint(base_url: &str, token: &str) -> Result<String, SessionError> {
    let (scheme, rest) = if let Some(rest) = base_url.strip_prefix("https://") {
        ("wss://", rest)
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        ("ws://", rest)
    } else if let Some(rest) = base_url.strip_prefix("wss://") {
        ("wss://", rest)
    } else if let Some(rest) = base_url.strip_prefix("ws://") {
        ("ws://", rest)
    } else {
        return Err(SessionError::Config(format!(
            "base_url must start with http:// or https://, got: {}",
            base_url
        )));
    };

    let rest = rest.trim_end_matches('/');
    if rest.is_empty() {
        return Err(SessionError::Config("base_url has no host".to_string()));
    }

    let encoded = utf8_percent_encode(token, NON_ALPHANUMERIC);
    Ok(format!("{scheme}{rest}{WS_PATH}?token={encoded}"))
}
