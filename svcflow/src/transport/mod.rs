//! HTTP transport seam.
//!
//! This module provides:
//! - The request and response shapes every stage speaks
//! - The [`Transport`] trait the pipeline issues calls through
//! - The token-attachment convention ([`TokenScheme`])
//! - A `reqwest`-backed implementation (feature `http`)
//!
//! A transport only reports failure when no response arrived. Any HTTP
//! status, 4xx and 5xx included, comes back as an [`HttpResponse`].

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::{ReqwestTransport, DEFAULT_REQUEST_TIMEOUT};

use crate::auth::Token;
use crate::errors::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest response body kept in failure reports.
pub const MAX_REPORTED_BODY: usize = 512;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET.
    Get,
    /// POST.
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// How a token is placed in the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenScheme {
    /// The token as is.
    #[default]
    Raw,
    /// `Bearer <token>`.
    Bearer,
}

impl TokenScheme {
    /// Renders the header value for a token.
    #[must_use]
    pub fn authorization_value(&self, token: &Token) -> String {
        match self {
            Self::Raw => token.as_str().to_string(),
            Self::Bearer => format!("Bearer {}", token.as_str()),
        }
    }
}

impl std::str::FromStr for TokenScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "bearer" => Ok(Self::Bearer),
            other => Err(format!("unknown token scheme '{other}' (expected raw or bearer)")),
        }
    }
}

/// A request to the remote API.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// The method.
    pub method: HttpMethod,
    /// The absolute URL, without query string.
    pub url: String,
    /// Query parameters, in order.
    pub query: Vec<(String, String)>,
    /// Extra headers, in order.
    pub headers: Vec<(String, String)>,
    /// The JSON body, if any.
    pub body: Option<serde_json::Value>,
    /// The token to attach, if any.
    pub token: Option<Token>,
}

impl HttpRequest {
    /// Creates a request with no query, headers, body or token.
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            token: None,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Creates a POST request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets the token.
    #[must_use]
    pub fn with_token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }

    /// Returns a header value, matching the name case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a query parameter value.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A response body, parsed as JSON when possible.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// The body parsed as JSON.
    Json(serde_json::Value),
    /// The raw body, when it is not JSON.
    Text(String),
}

/// A response from the remote API.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub status_code: u16,
    /// The body.
    pub body: ResponseBody,
}

impl HttpResponse {
    /// Creates a response with a JSON body.
    #[must_use]
    pub fn json(status_code: u16, body: serde_json::Value) -> Self {
        Self {
            status_code,
            body: ResponseBody::Json(body),
        }
    }

    /// Creates a response from raw text, parsing it as JSON if it is JSON.
    #[must_use]
    pub fn from_text(status_code: u16, text: impl Into<String>) -> Self {
        let text = text.into();
        let body = match serde_json::from_str(&text) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Text(text),
        };
        Self { status_code, body }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Returns the JSON body, if the body is JSON.
    #[must_use]
    pub fn json_body(&self) -> Option<&serde_json::Value> {
        match &self.body {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Text(_) => None,
        }
    }

    /// Returns the body as text, truncated for reporting.
    #[must_use]
    pub fn body_excerpt(&self) -> String {
        let text = match &self.body {
            ResponseBody::Json(value) => value.to_string(),
            ResponseBody::Text(text) => text.clone(),
        };
        truncate(&text, MAX_REPORTED_BODY)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Issues HTTP requests on behalf of stages.
///
/// Implementations must be shareable across concurrent pipeline runs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` only when no response was received.
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}
