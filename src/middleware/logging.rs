use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use reqwest::{Request, Response};
use tower::{Layer, Service};

const SENSITIVE_PARAMS: &[&str] = &[
    "token",
    "access_token",
    "refresh_token",
    "code",
    "secret",
    "password",
    "authorization",
];

/// Layer that logs each request line and its outcome.
///
/// Query values of credential-bearing parameters are redacted.
#[derive(Clone, Default)]
pub struct LoggingMiddleware {
    verbose: bool,
}

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self { verbose: false }
    }

    /// Log at `debug` with status text instead of one `info` line each way.
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }
}

impl<S> Layer<S> for LoggingMiddleware {
    type Service = LoggingMiddlewareService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingMiddlewareService {
            inner,
            verbose: self.verbose,
        }
    }
}

#[derive(Clone)]
pub struct LoggingMiddlewareService<S> {
    inner: S,
    verbose: bool,
}

pub(crate) fn redact_url(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };

    let redacted: Vec<String> = query
        .split('&')
        .map(|param| match param.split_once('=') {
            Some((key, _)) if SENSITIVE_PARAMS.iter().any(|s| key.eq_ignore_ascii_case(s)) => {
                format!("{key}=[REDACTED]")
            }
            _ => param.to_string(),
        })
        .collect();

    format!("{}?{}", base, redacted.join("&"))
}

fn log_request(method: &str, url: &str, verbose: bool) {
    let safe_url = redact_url(url);
    if verbose {
        debug!("[MpClient] >>> {} {}", method, safe_url);
    } else {
        info!("[MpClient] {} {}", method, safe_url);
    }
}

fn log_response(status: u16, duration: Duration, verbose: bool) {
    if verbose {
        debug!("[MpClient] <<< {} - {} ({:?})", status, status_text(status), duration);
    } else {
        info!("[MpClient] {} ({:?})", status, duration);
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}

impl<S> Service<Request> for LoggingMiddlewareService<S>
where
    S: Service<Request, Response = Response> + Send + Clone + 'static,
    S::Future: Send,
    S::Error: std::fmt::Display + Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let method = req.method().as_str().to_string();
        let url = req.url().to_string();
        let verbose = self.verbose;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            log_request(&method, &url, verbose);

            let start = Instant::now();
            match inner.call(req).await {
                Ok(response) => {
                    log_response(response.status().as_u16(), start.elapsed(), verbose);
                    Ok(response)
                }
                Err(e) => {
                    warn!("[MpClient] {} {} failed: {}", method, redact_url(&url), e);
                    Err(e)
                }
            }
        })
    }
}
