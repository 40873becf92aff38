use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::error::{DashError, Result};

const USER_AGENT: &str = "screepsdash/0.1.0";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(8);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// One HTTP request against a Screeps-compatible server, expressed in the
/// normalized shape every transport implementation accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    pub base_url: String,
    pub endpoint: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<HashMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(base_url: &str, method: &str, endpoint: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            token: None,
            username: None,
            query: None,
            body: None,
        }
    }

    pub fn get(base_url: &str, endpoint: &str) -> Self {
        Self::new(base_url, "GET", endpoint)
    }

    pub fn post(base_url: &str, endpoint: &str) -> Self {
        Self::new(base_url, "POST", endpoint)
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn with_query(mut self, query: HashMap<String, Value>) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Full URL this request targets, best effort (used for logs and
    /// error-shaped responses).
    pub fn url(&self) -> String {
        let base = normalize_base_url(&self.base_url)
            .unwrap_or_else(|_| self.base_url.trim().trim_end_matches('/').to_string());
        format!("{}{}", base, normalize_endpoint(&self.endpoint))
    }
}

/// Outcome of one request. Non-2xx statuses are data, not errors: `ok` is
/// false and `data` carries whatever the server sent back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub status: u16,
    pub ok: bool,
    pub data: Value,
    pub url: String,
}

impl ApiResponse {
    /// Error-shaped response standing in for a failed transport attempt,
    /// used when a batch folds failures instead of aborting.
    pub fn from_failure(request: &ApiRequest, error: String) -> Self {
        Self {
            status: 0,
            ok: false,
            data: json!({ "error": error }),
            url: request.url(),
        }
    }
}

/// Canonicalize a server base URL.
///
/// Scheme-less input gets `https://` prepended; trailing slashes and a
/// trailing `/api` segment are stripped. Idempotent. Input that does not
/// parse as an http(s) URL is rejected.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DashError::InvalidUrl {
            input: raw.to_string(),
            reason: "empty".to_string(),
        });
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&with_scheme).map_err(|error| DashError::InvalidUrl {
        input: raw.to_string(),
        reason: error.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(DashError::InvalidUrl {
            input: raw.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    let Some(host) = parsed.host_str() else {
        return Err(DashError::InvalidUrl {
            input: raw.to_string(),
            reason: "missing host".to_string(),
        });
    };

    // The `/api` strip only applies to a trailing path segment; a host
    // that is literally named `api` stays intact.
    let mut path = parsed.path().trim_end_matches('/').to_string();
    if path.to_ascii_lowercase().ends_with("/api") {
        path.truncate(path.len() - "/api".len());
    }
    let path = path.trim_end_matches('/');

    let mut canonical = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        canonical.push_str(&format!(":{}", port));
    }
    canonical.push_str(path);
    Ok(canonical)
}

/// Guarantee a single leading slash on an endpoint path.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Flatten a query map into sorted string pairs. Null values are dropped;
/// arrays and objects are serialized as JSON text. Sorting keeps cache keys
/// stable regardless of map iteration order.
pub(crate) fn query_pairs(query: &HashMap<String, Value>) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .filter_map(|(key, value)| {
            let serialized = match value {
                Value::Null => None,
                Value::String(text) => Some(text.clone()),
                Value::Number(number) => Some(number.to_string()),
                Value::Bool(flag) => Some(flag.to_string()),
                Value::Array(_) | Value::Object(_) => Some(value.to_string()),
            };
            serialized.map(|text| (key.clone(), text))
        })
        .collect();
    pairs.sort_unstable();
    pairs
}

/// The seam between the probing/normalization logic and the network.
///
/// Two production implementations exist: [`HttpTransport`] (direct fetch)
/// and [`super::cache::CachedTransport`] (the same fetch behind a GET
/// response cache). Which one runs is a settings check made once at
/// startup, not a per-request fallback.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// Direct reqwest-backed transport.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(16)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| DashError::Transport(format!("failed to build http client: {}", error)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let base_url = normalize_base_url(&request.base_url)?;
        let endpoint = normalize_endpoint(&request.endpoint);
        let url = format!("{}{}", base_url, endpoint);

        let method_name = request.method.to_uppercase();
        let method = Method::from_bytes(method_name.as_bytes()).map_err(|error| {
            DashError::Transport(format!("invalid method {}: {}", method_name, error))
        })?;
        let is_get = method == Method::GET;

        let mut builder = self
            .client
            .request(method, &url)
            .header("Accept", "application/json");

        if let Some(pairs) = request.query.as_ref().map(query_pairs) {
            if !pairs.is_empty() {
                builder = builder.query(&pairs);
            }
        }

        // Server forks disagree on which header carries the credential, so
        // every auth header is sent. X-Username defaults to the token value
        // unless the request names a user explicitly.
        if let Some(token) = request.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            builder = builder
                .header("X-Token", token)
                .header("Authorization", format!("Bearer {}", token));
            let username = request
                .username
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .unwrap_or(token);
            builder = builder.header("X-Username", username);
        }

        if !is_get {
            if let Some(body) = request.body.as_ref() {
                builder = builder.json(body);
            }
        }

        debug!("{} {}", request.method, url);
        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() {
                DashError::Transport(format!("request to {} timed out", url))
            } else {
                DashError::Transport(format!("request to {} failed: {}", url, error))
            }
        })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| DashError::Transport(format!("failed to read response body: {}", error)))?;

        // Non-JSON bodies are wrapped rather than rejected; forks answer
        // some endpoints with bare text.
        let data = if bytes.is_empty() {
            json!({})
        } else {
            serde_json::from_slice::<Value>(&bytes).unwrap_or_else(|_| {
                json!({ "text": String::from_utf8_lossy(&bytes).to_string() })
            })
        };

        Ok(ApiResponse {
            status,
            ok: (200..300).contains(&status),
            data,
            url: final_url,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_variants_converge() {
        let expected = "https://screeps.example";
        for raw in [
            "screeps.example",
            "screeps.example/",
            "screeps.example/api",
            "https://screeps.example",
            "https://screeps.example/",
            "https://screeps.example/api",
            "https://screeps.example/api/",
        ] {
            assert_eq!(normalize_base_url(raw).unwrap(), expected, "input: {}", raw);
        }
    }

    #[test]
    fn base_url_is_idempotent() {
        let once = normalize_base_url("my.server.net:21025/api/").unwrap();
        let twice = normalize_base_url(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once, "https://my.server.net:21025");
    }

    #[test]
    fn base_url_keeps_non_api_paths() {
        assert_eq!(
            normalize_base_url("https://screeps.example/ptr").unwrap(),
            "https://screeps.example/ptr"
        );
    }

    #[test]
    fn host_named_api_survives_normalization() {
        let once = normalize_base_url("https://api").unwrap();
        assert_eq!(once, "https://api");
        assert_eq!(normalize_base_url(&once).unwrap(), once);
        assert_eq!(normalize_base_url("api/api").unwrap(), "https://api");
    }

    #[test]
    fn malformed_base_url_is_rejected() {
        for raw in ["", "   ", "http://", "not a url", "ftp://screeps.example"] {
            assert!(normalize_base_url(raw).is_err(), "input: {:?}", raw);
        }
    }

    #[test]
    fn endpoint_gets_leading_slash() {
        assert_eq!(normalize_endpoint("api/auth/me"), "/api/auth/me");
        assert_eq!(normalize_endpoint("/api/auth/me"), "/api/auth/me");
    }

    #[test]
    fn query_pairs_sorted_and_nulls_dropped() {
        let mut query = HashMap::new();
        query.insert("shard".to_string(), json!("shard0"));
        query.insert("interval".to_string(), json!(8));
        query.insert("skip".to_string(), Value::Null);
        let pairs = query_pairs(&query);
        assert_eq!(
            pairs,
            vec![
                ("interval".to_string(), "8".to_string()),
                ("shard".to_string(), "shard0".to_string()),
            ]
        );
    }

    #[test]
    fn failure_response_is_error_shaped() {
        let request = ApiRequest::get("screeps.example", "/api/auth/me");
        let response = ApiResponse::from_failure(&request, "boom".to_string());
        assert_eq!(response.status, 0);
        assert!(!response.ok);
        assert_eq!(response.data["error"], "boom");
        assert_eq!(response.url, "https://screeps.example/api/auth/me");
    }
}
