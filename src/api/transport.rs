//! HTTP transport for the tracker REST API.
//!
//! The `Transport` trait separates request mechanics from endpoint logic so
//! endpoint code can be exercised against `MockTransport` with canned
//! responses. Status codes are passed through raw; interpreting them is the
//! endpoint layer's job since the same status means different things on
//! different calls.

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::sync::Mutex;
use tracing::debug;

use crate::api::error::ApiError;
use crate::config::Config;

/// Environment variable holding the tracker API token
pub const TOKEN_ENV: &str = "TKT_TRACKER_TOKEN";
/// Environment variable holding the account email (enables Basic auth)
pub const EMAIL_ENV: &str = "TKT_TRACKER_EMAIL";

/// Raw response from the tracker
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    /// Parse the body as arbitrary JSON
    pub fn json(&self) -> Result<Value, ApiError> {
        serde_json::from_str(&self.body)
            .map_err(|e| ApiError::malformed(format!("invalid JSON body: {e}")))
    }

    /// Parse the body into a typed value
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body)
            .map_err(|e| ApiError::malformed(format!("unexpected response shape: {e}")))
    }
}

pub trait Transport {
    fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<&Value>,
        query: &[(String, String)],
    ) -> Result<ApiResponse, ApiError>;

    fn get(&self, path: &str, query: &[(String, String)]) -> Result<ApiResponse, ApiError> {
        self.request("GET", path, None, query)
    }

    fn post(&self, path: &str, body: &Value) -> Result<ApiResponse, ApiError> {
        self.request("POST", path, Some(body), &[])
    }

    fn put(&self, path: &str, body: &Value) -> Result<ApiResponse, ApiError> {
        self.request("PUT", path, Some(body), &[])
    }
}

/// Transport backed by a real HTTP client
pub struct HttpTransport {
    base_url: String,
    token: String,
    email: Option<String>,
    client: Client,
}

impl HttpTransport {
    pub fn new(url: &str, token: String, email: Option<String>) -> Self {
        Self {
            base_url: format!("{}/rest/api/2", url.trim_end_matches('/')),
            token,
            email,
            client: Client::new(),
        }
    }

    /// Build a transport from config plus credential environment variables.
    ///
    /// Required:
    /// - `tracker.url` in config
    /// - `TKT_TRACKER_TOKEN` in the environment
    ///
    /// Optional:
    /// - `tracker.email` in config or `TKT_TRACKER_EMAIL`; when present the
    ///   token is sent as Basic auth, otherwise as a Bearer header
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        if config.tracker.url.is_empty() {
            return Err(ApiError::not_configured("tracker.url"));
        }

        let token = env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::not_configured(TOKEN_ENV))?;

        let email = config
            .tracker
            .email
            .clone()
            .or_else(|| env::var(EMAIL_ENV).ok())
            .filter(|e| !e.is_empty());

        Ok(Self::new(&config.tracker.url, token, email))
    }

    fn auth_header(&self) -> String {
        match &self.email {
            Some(email) => {
                let credentials = format!("{}:{}", email, self.token);
                let encoded = simple_base64_encode(credentials.as_bytes());
                format!("Basic {encoded}")
            }
            None => format!("Bearer {}", self.token),
        }
    }
}

impl Transport for HttpTransport {
    fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<&Value>,
        query: &[(String, String)],
    ) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Tracker {}: {}", method, url);

        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| ApiError::malformed(format!("invalid HTTP method: {method}")))?;

        let mut request = self
            .client
            .request(method, &url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json");

        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .map_err(|e| ApiError::Connection(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| ApiError::Connection(e.to_string()))?;

        Ok(ApiResponse { status, body })
    }
}

/// Simple Base64 encoding implementation (for Basic Auth only)
fn simple_base64_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    let mut result = String::new();
    let mut chunks = data.chunks_exact(3);

    for chunk in chunks.by_ref() {
        let n = ((chunk[0] as u32) << 16) | ((chunk[1] as u32) << 8) | (chunk[2] as u32);
        result.push(ALPHABET[(n >> 18 & 0x3F) as usize] as char);
        result.push(ALPHABET[(n >> 12 & 0x3F) as usize] as char);
        result.push(ALPHABET[(n >> 6 & 0x3F) as usize] as char);
        result.push(ALPHABET[(n & 0x3F) as usize] as char);
    }

    let remainder = chunks.remainder();
    if remainder.len() == 1 {
        let n = (remainder[0] as u32) << 16;
        result.push(ALPHABET[(n >> 18 & 0x3F) as usize] as char);
        result.push(ALPHABET[(n >> 12 & 0x3F) as usize] as char);
        result.push_str("==");
    } else if remainder.len() == 2 {
        let n = ((remainder[0] as u32) << 16) | ((remainder[1] as u32) << 8);
        result.push(ALPHABET[(n >> 18 & 0x3F) as usize] as char);
        result.push(ALPHABET[(n >> 12 & 0x3F) as usize] as char);
        result.push(ALPHABET[(n >> 6 & 0x3F) as usize] as char);
        result.push('=');
    }

    result
}

/// Transport with canned responses for tests.
///
/// Routes are keyed by "METHOD path". Requests for unregistered routes get a
/// 404 response rather than an error, which mirrors a tracker without that
/// endpoint and lets fallback paths be exercised.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, ApiResponse>>,
    /// Every request as "METHOD path", in call order
    pub request_log: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a canned response for a method/path pair
    pub fn respond(&self, method: &str, path: &str, status: u16, body: &Value) {
        self.routes.lock().unwrap().insert(
            format!("{method} {path}"),
            ApiResponse {
                status,
                body: body.to_string(),
            },
        );
    }

    pub fn requests(&self) -> Vec<String> {
        self.request_log.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    fn request(
        &self,
        method: &str,
        path: &str,
        _body: Option<&Value>,
        _query: &[(String, String)],
    ) -> Result<ApiResponse, ApiError> {
        let key = format!("{method} {path}");
        self.request_log.lock().unwrap().push(key.clone());

        let routes = self.routes.lock().unwrap();
        match routes.get(&key) {
            Some(response) => Ok(response.clone()),
            None => Ok(ApiResponse {
                status: 404,
                body: String::new(),
            }),
        }
    }
}
