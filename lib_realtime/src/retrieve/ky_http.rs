//! # HTTP Retrieval Utilities
//!
//! A small asynchronous API client around `reqwest` with transient-failure
//! retries and JSON decoding.

use anyhow::Context;
use reqwest::{header::HeaderMap, Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;

/// Retries applied to transient failures (connect errors, 5xx, 408, 429).
pub const MAX_RETRIES: u32 = 3;

/// Outcome of one request.
///
/// Non-2xx responses are not errors at this level; `success` is false and
/// the raw body is kept in `error_body`.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The decoded body of a successful response.
    pub data: Option<T>,
    /// The raw body of an unsuccessful response, if it could be read.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Whether the status was in the 2xx range.
    pub success: bool,
    /// Response headers.
    pub headers: HeaderMap,
}

impl<T> ApiResponse<T> {
    /// The decoded body, or an error describing the failed status.
    pub fn into_data(self) -> anyhow::Result<T> {
        match self.data {
            Some(data) if self.success => Ok(data),
            _ => anyhow::bail!(
                "HTTP {}: {}",
                self.status,
                self.error_body.unwrap_or_else(|| "no body".to_string())
            ),
        }
    }
}

/// JSON API client rooted at a base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    inner: ClientWithMiddleware,
    base_url: Url,
}

impl ApiClient {
    /// Creates a client for `base_url` (absolute, e.g. `http://localhost:8000/`).
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url).with_context(|| format!("Invalid base URL '{base_url}'"))?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);
        let inner = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { inner, base_url })
    }

    /// The base URL relative paths are joined onto.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Sends `method` to `path` and decodes a successful body as `T`.
    ///
    /// # Errors
    /// URL joining, network failures after all retries, and undecodable
    /// success bodies.
    pub async fn request<T>(&self, method: Method, path: &str, headers: Option<HeaderMap>) -> anyhow::Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
    {
        let full_url = self.base_url.join(path)?;
        let mut req = self.inner.request(method, full_url.clone());
        if let Some(h) = headers {
            req = req.headers(h);
        }

        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        let headers = response.headers().clone();

        if status.is_success() {
            let data = response
                .json::<T>()
                .await
                .with_context(|| format!("Undecodable body from {full_url}"))?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers,
            })
        } else {
            log::warn!("{} answered {}", full_url, status);
            Ok(ApiResponse {
                data: None,
                error_body: response.text().await.ok(),
                status: status.as_u16(),
                success: false,
                headers,
            })
        }
    }

    /// GETs `path` and returns the decoded body, failing on a non-2xx status.
    pub async fn get<T>(&self, path: &str) -> anyhow::Result<T>
    where
        T: DeserializeOwned,
    {
        self.request::<T>(Method::GET, path, None).await?.into_data()
    }
}
