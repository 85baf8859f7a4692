//! Client for the Gemini REST API.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

use crate::completion::GenerativeModel;
use crate::error::GeminiError;

/// Public Gemini API base URL
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Header carrying the API key
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Client for Google Gemini models.
#[derive(Clone)]
pub struct Client {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl Client {
    /// Create a client for the public endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self, GeminiError> {
        Self::builder(api_key).build()
    }

    /// Start building a client with a custom timeout or base URL.
    pub fn builder(api_key: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
        }
    }

    /// Get a generative model handle for the specified model id.
    pub fn model(&self, model: &str) -> GenerativeModel {
        GenerativeModel::new(self.clone(), model.to_string())
    }

    /// Build the endpoint URL for a given model and operation.
    pub(crate) fn endpoint_url(&self, model: &str, operation: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{}",
            self.base_url.trim_end_matches('/'),
            model,
            operation
        )
    }

    /// Build headers with authentication.
    pub(crate) fn build_headers(&self) -> Result<HeaderMap, GeminiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            API_KEY_HEADER,
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| GeminiError::ConfigError(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    pub(crate) fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Client`].
#[derive(Debug)]
pub struct ClientBuilder {
    api_key: String,
    base_url: String,
    timeout: Option<Duration>,
}

impl ClientBuilder {
    /// Override the API base URL (useful for proxies and tests).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set a whole-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Client, GeminiError> {
        if self.api_key.trim().is_empty() {
            return Err(GeminiError::ConfigError("API key is empty".to_string()));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build().map_err(GeminiError::HttpError)?;

        Ok(Client {
            http_client,
            api_key: self.api_key,
            base_url: self.base_url,
        })
    }
}
