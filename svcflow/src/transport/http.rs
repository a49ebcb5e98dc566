//! `reqwest`-backed transport.

use super::{HttpMethod, HttpRequest, HttpResponse, TokenScheme, Transport};
use crate::errors::TransportError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A [`Transport`] over a shared `reqwest::Client`.
///
/// The client pools connections, so one transport should be shared (via
/// `Arc`) by every pipeline run in a process.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: ::reqwest::Client,
    scheme: TokenScheme,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Creates a transport.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidRequest` if the HTTP client cannot
    /// be initialised.
    pub fn new(scheme: TokenScheme, timeout: Duration) -> Result<Self, TransportError> {
        let client = ::reqwest::Client::builder()
            .user_agent(concat!("svcflow/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            client,
            scheme,
            timeout,
        })
    }

    /// Returns the token scheme.
    #[must_use]
    pub fn scheme(&self) -> TokenScheme {
        self.scheme
    }

    fn map_error(&self, err: &::reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }

    fn prepare(&self, request: &HttpRequest) -> ::reqwest::RequestBuilder {
        let method = match request.method {
            HttpMethod::Get => ::reqwest::Method::GET,
            HttpMethod::Post => ::reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, &request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &request.token {
            builder = builder.header(
                ::reqwest::header::AUTHORIZATION,
                self.scheme.authorization_value(token),
            );
        }
        // Keeps an explicit content type (the login call sends its own).
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let builder = self.prepare(&request);

        debug!(method = %request.method, url = %request.url, "Sending request");

        let response = builder.send().await.map_err(|e| self.map_error(&e))?;
        let status_code = response.status().as_u16();
        let text = response.text().await.map_err(|e| self.map_error(&e))?;

        debug!(url = %request.url, status_code, "Received response");

        Ok(HttpResponse::from_text(status_code, text))
    }
}
