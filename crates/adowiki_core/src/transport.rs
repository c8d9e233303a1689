use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;

use crate::error::WikiError;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_USER_AGENT: &str = "adowiki/0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    Raw(Vec<u8>),
}

/// A fully prepared request: the URL already carries every query
/// parameter and the header list already carries authentication.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn new(method: Method, url: String) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(value));
        self
    }

    pub fn raw(mut self, bytes: Vec<u8>) -> Self {
        self.body = Some(RequestBody::Raw(bytes));
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network seam. Implementations perform exactly one exchange per call:
/// no retries, no redirect policy beyond the underlying client default.
pub trait HttpTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, WikiError>;
}

pub struct ReqwestTransport {
    client: Client,
    user_agent: String,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let timeout_ms = env::var("ADO_HTTP_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, WikiError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
            Method::Delete => self.client.delete(&request.url),
        };
        builder = builder.header("User-Agent", self.user_agent.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = match request.body {
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Raw(bytes)) => builder.body(bytes),
            None => builder,
        };

        let response = builder.send().map_err(WikiError::transport)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(WikiError::transport)?;
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::{HttpRequest, HttpResponse, Method};

    #[test]
    fn method_names_match_the_wire() {
        assert_eq!(Method::Get.as_str(), "GET");
        assert_eq!(Method::Put.as_str(), "PUT");
        assert_eq!(Method::Delete.as_str(), "DELETE");
        assert_eq!(Method::Post.as_str(), "POST");
    }

    #[test]
    fn request_builder_accumulates_headers() {
        let request = HttpRequest::new(Method::Put, "https://example.test".to_string())
            .header("If-Match", "etag-1")
            .header("Content-Type", "application/json");
        assert_eq!(request.headers.len(), 2);
        assert_eq!(request.headers[0].0, "If-Match");
    }

    #[test]
    fn success_covers_the_2xx_range_only() {
        let ok = HttpResponse {
            status: 201,
            body: String::new(),
        };
        let redirect = HttpResponse {
            status: 304,
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(!redirect.is_success());
    }
}
