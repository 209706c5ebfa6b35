//! Request descriptors and raw responses.

use crate::classify;
use crate::error::ApiResult;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// An outbound API request.
///
/// The descriptor is kept intact across the first attempt so that it can be
/// replayed verbatim after a token refresh. `retried` is the one-shot marker
/// that bounds replays to one.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the API base URL.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// Extra headers set by the caller.
    pub headers: HeaderMap,
    /// JSON body.
    pub body: Option<serde_json::Value>,
    /// Set once the request has been replayed after a refresh.
    pub retried: bool,
    /// Authorization failures are final for this request (login, refresh, ...).
    pub skip_auth_refresh: bool,
    encode_error: Option<String>,
}

impl ApiRequest {
    /// Create a request with no body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            retried: false,
            skip_auth_refresh: false,
            encode_error: None,
        }
    }

    /// GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// PUT request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// PATCH request.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    ///
    /// A body that cannot be serialized is not attached; sending the request
    /// then fails without touching the network.
    #[must_use]
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => {
                self.body = Some(value);
                self.encode_error = None;
            }
            Err(err) => {
                self.body = None;
                self.encode_error = Some(err.to_string());
            }
        }
        self
    }

    /// Why the last [`json`](Self::json) body could not be serialized.
    pub fn encode_error(&self) -> Option<&str> {
        self.encode_error.as_deref()
    }

    /// Add a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Never refresh and replay this request on an authorization failure.
    #[must_use]
    pub fn without_auth_refresh(mut self) -> Self {
        self.skip_auth_refresh = true;
        self
    }
}

/// A received response with its body fully read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw body.
    pub body: Bytes,
}

impl ApiResponse {
    /// Read a reqwest response to completion.
    pub async fn read(response: reqwest::Response) -> ApiResult<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as UTF-8 text, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the `data` member of the response envelope.
    pub fn data<T: DeserializeOwned>(&self) -> ApiResult<T> {
        classify::decode_data(self.status.as_u16(), &self.body)
    }

    /// Decode the whole body without envelope unwrapping.
    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        classify::decode_raw(self.status.as_u16(), &self.body)
    }
}
