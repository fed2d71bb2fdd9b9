//! Middleware-enabled HTTP client shared by all source adapters.
//!
//! Wraps `reqwest` with exponential-backoff retry middleware and a
//! per-request timeout, and normalizes transport failures into the
//! fetch error taxonomy so adapters can stay declarative.

use std::time::Duration;

use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::core::errors::FetchError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// A standardized container for API responses.
///
/// Wraps the deserialized data along with metadata about the HTTP
/// transaction.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully deserialized response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

impl<T> ApiResponse<T> {
    /// Collapse into the body, mapping non-2xx statuses and missing
    /// bodies to fetch errors.
    pub fn into_data(self) -> Result<T, FetchError> {
        if !self.success {
            if self.status == 429 {
                return Err(FetchError::RateLimited);
            }
            return Err(FetchError::Status {
                status: self.status,
                body: self.error_body.unwrap_or_default(),
            });
        }
        self.data
            .ok_or_else(|| FetchError::Malformed("empty response body".into()))
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base URL: {0}")]
    BadBaseUrl(#[from] url::ParseError),
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles base URLs,
/// authentication tokens, and automatic retries.
pub struct ApiClient {
    inner: ClientWithMiddleware,
    base_url: Url,
    auth_token: Option<String>,
    timeout: Duration,
}

impl ApiClient {
    /// Creates a new `ApiClient` with a retry policy.
    ///
    /// # Errors
    /// Fails if `base_url` is not a valid absolute URL.
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, ClientError> {
        let url = Url::parse(base_url)?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
            auth_token,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Performs a generic HTTP request and handles the response.
    ///
    /// Manages URL joining, header injection, authentication, and JSON
    /// serialization on both sides. Transport failures come back as
    /// [`FetchError`] variants; HTTP-level failures are carried in the
    /// returned [`ApiResponse`].
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> Result<ApiResponse<T>, FetchError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let full_url = self
            .base_url
            .join(path)
            .map_err(|e| FetchError::Malformed(format!("bad request path {path:?}: {e}")))?;
        let mut req = self.inner.request(method, full_url).timeout(self.timeout);

        if let Some(h) = headers {
            req = req.headers(h);
        }

        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        if let Some(b) = body {
            let json_body = serde_json::to_string(&b)
                .map_err(|e| FetchError::Malformed(format!("unserializable body: {e}")))?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        let response: reqwest::Response = req.send().await.map_err(classify_middleware_error)?;
        let status = response.status();
        let resp_headers = response.headers().clone();

        if status.is_success() {
            let data = response
                .json::<T>()
                .await
                .map_err(|e| FetchError::Malformed(e.to_string()))?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
            })
        }
    }

    /// Convenience wrapper for JSON GETs that only care about the body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        self.request::<T, ()>(Method::GET, path, None, None)
            .await?
            .into_data()
    }

    /// Convenience wrapper for JSON POSTs that only care about the
    /// body (GraphQL endpoints and RPC-style APIs).
    pub async fn post_json<T, B>(
        &self,
        path: &str,
        headers: Option<HeaderMap>,
        body: &B,
    ) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        self.request::<T, &B>(Method::POST, path, headers, Some(body))
            .await?
            .into_data()
    }
}

fn classify_middleware_error(e: reqwest_middleware::Error) -> FetchError {
    match e {
        reqwest_middleware::Error::Reqwest(e) if e.is_timeout() => {
            FetchError::Timeout(DEFAULT_TIMEOUT)
        }
        other => FetchError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_success_status_maps_to_fetch_error() {
        let resp: ApiResponse<serde_json::Value> = ApiResponse {
            data: None,
            error_body: Some("nope".into()),
            status: 503,
            success: false,
            headers: HeaderMap::new(),
        };
        assert!(matches!(
            resp.into_data(),
            Err(FetchError::Status { status: 503, .. })
        ));
    }

    #[test]
    fn status_429_maps_to_rate_limited() {
        let resp: ApiResponse<serde_json::Value> = ApiResponse {
            data: None,
            error_body: None,
            status: 429,
            success: false,
            headers: HeaderMap::new(),
        };
        assert!(matches!(resp.into_data(), Err(FetchError::RateLimited)));
    }

    #[test]
    fn rejects_relative_base_url() {
        assert!(ApiClient::new("not-a-url", None).is_err());
    }
}
