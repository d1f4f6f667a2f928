use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Body of `POST /fetch`: the request to forward on the caller's behalf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        FetchRequest {
            url: url.into(),
            method: default_method(),
            headers: HashMap::new(),
            data: None,
        }
    }
}

/// Normalized relay result: a proxied upstream response, or a categorized
/// failure when no upstream response was obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FetchEnvelope {
    Success(FetchSuccess),
    Failure(FetchFailure),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchSuccess {
    pub success: bool,
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub content_type: String,
    pub content: String,
    pub headers: BTreeMap<String, String>,
    pub timestamp: String,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchFailure {
    pub success: bool,
    pub error: String,
    pub code: String,
    pub timestamp: String,
}

/// Payload for `GET /fetch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub status: String,
    pub service: String,
    pub version: String,
    pub endpoint: String,
}
