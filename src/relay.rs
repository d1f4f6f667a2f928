//! Fetch relay: forwards caller-specified requests and normalizes the outcome.

use std::error::Error as _;
use std::io;
use std::net::IpAddr;
use std::time::Duration;

use axum::http::StatusCode;
use once_cell::sync::Lazy;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Method, Url};

use crate::api::models::{FetchEnvelope, FetchRequest};
use crate::api::response;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 5;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";

// Create a static client to reuse connections. The timeout is applied per
// request, taken from RelayOptions.
static CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .redirect(Policy::limited(MAX_REDIRECTS))
        .pool_max_idle_per_host(10)
        .build()
        .expect("Failed to build HTTP client")
});

/// Relay behavior knobs taken from service configuration.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub block_loopback: bool,
    pub timeout: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        RelayOptions {
            block_loopback: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Forward a request upstream and normalize the outcome into an envelope.
///
/// Validation failures and transport errors come back as failure envelopes
/// with a mapped status. An upstream response of any status is a success.
pub async fn forward(request: &FetchRequest, options: &RelayOptions) -> (StatusCode, FetchEnvelope) {
    if let Err(reason) = validate(request, options) {
        return (
            StatusCode::BAD_REQUEST,
            FetchEnvelope::Failure(response::failure("EINVAL", reason)),
        );
    }

    let method = match Method::from_bytes(request.method.to_uppercase().as_bytes()) {
        Ok(method) => method,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                FetchEnvelope::Failure(response::failure(
                    "EINVAL",
                    format!("Unsupported HTTP method: {}", request.method),
                )),
            );
        }
    };

    let mut builder = CLIENT
        .request(method, &request.url)
        .timeout(options.timeout);
    if let Some(data) = &request.data {
        builder = builder.json(data);
    }
    // Caller headers land last so they override the defaults, including the
    // content type set by the JSON body.
    let builder = builder.headers(request_headers(request));

    let upstream = match builder.send().await {
        Ok(upstream) => upstream,
        Err(err) => return categorize(&err),
    };

    let url = upstream.url().to_string();
    let status = upstream.status();
    let headers = upstream.headers().clone();
    let content = match upstream.text().await {
        Ok(content) => content,
        Err(err) => return categorize(&err),
    };

    (
        StatusCode::OK,
        FetchEnvelope::Success(response::success(url, status, &headers, content)),
    )
}

fn validate(request: &FetchRequest, options: &RelayOptions) -> std::result::Result<(), String> {
    if !request.url.starts_with("http") {
        return Err("Valid URL is required (must start with http:// or https://)".to_string());
    }

    if options.block_loopback {
        if let Ok(url) = Url::parse(&request.url) {
            if let Some(host) = url.host_str() {
                if is_loopback_host(host) {
                    return Err(format!("Requests to {} are not allowed", host));
                }
            }
        }
    }

    Ok(())
}

pub fn is_loopback_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") || host == "0.0.0.0" {
        return true;
    }
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    bare.parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}

fn request_headers(request: &FetchRequest) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE));

    for (name, value) in &request.headers {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            tracing::debug!("Skipping invalid header name: {}", name);
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            tracing::debug!("Skipping invalid value for header {}", name);
            continue;
        };
        headers.insert(name, value);
    }

    headers
}

/// Map a transport error onto the relay's status/code taxonomy.
fn categorize(err: &reqwest::Error) -> (StatusCode, FetchEnvelope) {
    let (status, code, message) = classify(err);
    tracing::warn!("Proxy error ({}): {}", code, err);
    (status, FetchEnvelope::Failure(response::failure(code, message)))
}

fn classify(err: &reqwest::Error) -> (StatusCode, &'static str, String) {
    if err.is_timeout() {
        return (StatusCode::GATEWAY_TIMEOUT, "ETIMEDOUT", "Request timeout".to_string());
    }

    if let Some(kind) = io_error_kind(err) {
        match kind {
            io::ErrorKind::ConnectionRefused => {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "ECONNREFUSED",
                    "Connection refused".to_string(),
                );
            }
            io::ErrorKind::TimedOut => {
                return (StatusCode::GATEWAY_TIMEOUT, "ETIMEDOUT", "Request timeout".to_string());
            }
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => {
                return (StatusCode::BAD_GATEWAY, "ECONNRESET", "No response received".to_string());
            }
            _ => {}
        }
    }

    if is_dns_failure(err) {
        return (StatusCode::NOT_FOUND, "ENOTFOUND", "Domain not found".to_string());
    }

    if err.is_connect() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "ECONNREFUSED",
            "Connection refused".to_string(),
        );
    }

    if err.is_body() || err.is_decode() {
        return (StatusCode::BAD_GATEWAY, "ECONNRESET", "No response received".to_string());
    }

    (StatusCode::INTERNAL_SERVER_ERROR, "EUNKNOWN", err.to_string())
}

fn io_error_kind(err: &reqwest::Error) -> Option<io::ErrorKind> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        source = cause.source();
    }
    None
}

fn is_dns_failure(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if text.contains("dns error") || text.contains("failed to lookup") {
            return true;
        }
        source = cause.source();
    }
    false
}
