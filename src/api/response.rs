use std::collections::BTreeMap;

use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap};

use crate::api::models::{FetchFailure, FetchSuccess};

/// Build the success envelope for a proxied upstream response. The upstream
/// status is carried verbatim, whatever it was.
pub fn success(url: String, status: StatusCode, headers: &HeaderMap, content: String) -> FetchSuccess {
    let header_map: BTreeMap<String, String> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let size = content.len();

    FetchSuccess {
        success: true,
        url,
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or("").to_string(),
        content_type,
        content,
        headers: header_map,
        timestamp: Utc::now().to_rfc3339(),
        size,
    }
}

/// Build the failure envelope for a request that never produced an upstream
/// response.
pub fn failure(code: &str, message: impl Into<String>) -> FetchFailure {
    FetchFailure {
        success: false,
        error: message.into(),
        code: code.to_string(),
        timestamp: Utc::now().to_rfc3339(),
    }
}
