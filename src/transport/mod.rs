//! HTTP transport seam.
//!
//! Everything the client sends goes through [`HttpTransport`]. Production uses
//! [`ReqwestTransport`]; the record/replay layer and unit tests substitute
//! their own implementations.

use crate::errors::{OktaError, OktaResult};
use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// HTTP method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Upper-case method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = OktaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(OktaError::serialization(format!("unsupported HTTP method: {}", other))),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Outgoing request.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Option<String>,
    /// Deadline for this request, `None` for no deadline.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Creates a request with no headers or body.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Adds a header. Invalid names or values are rejected.
    pub fn with_header(mut self, name: &str, value: &str) -> OktaResult<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| OktaError::serialization(format!("invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| OktaError::serialization(format!("invalid header value: {}", e)))?;
        self.headers.append(name, value);
        Ok(self)
    }

    /// Sets a JSON body and content type.
    pub fn with_json_body(mut self, body: String) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(body);
        self
    }

    /// Sets a raw body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the per-request deadline.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Path component of the URL, or the whole URL if it does not parse.
    pub fn path(&self) -> String {
        url::Url::parse(&self.url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| self.url.clone())
    }

    /// Content type header, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }
}

/// Received response.
#[derive(Clone, Debug, Default)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: String,
}

impl HttpResponse {
    /// Creates a response with the given status and body.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Creates a JSON response.
    pub fn json_body(status: u16, body: &serde_json::Value) -> Self {
        let mut response = Self::new(status, body.to_string());
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }

    /// Adds a header, silently skipping invalid input.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Returns true for 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of a header as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> OktaResult<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            OktaError::serialization(format!("failed to decode response body: {}", e)).with_cause(e)
        })
    }
}

/// HTTP transport interface.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and returns the response, whatever its status.
    async fn send(&self, request: HttpRequest) -> OktaResult<HttpResponse>;
}

/// Swappable transport shared between the client and its token exchange.
#[derive(Clone)]
pub struct TransportHandle(Arc<RwLock<Arc<dyn HttpTransport>>>);

impl TransportHandle {
    /// Wraps a transport.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self(Arc::new(RwLock::new(transport)))
    }

    /// Transport currently installed.
    pub fn current(&self) -> Arc<dyn HttpTransport> {
        self.0.read().clone()
    }

    /// Installs `transport` and returns the previous one.
    pub fn replace(&self, transport: Arc<dyn HttpTransport>) -> Arc<dyn HttpTransport> {
        std::mem::replace(&mut *self.0.write(), transport)
    }

    /// Sends through the current transport.
    pub async fn send(&self, request: HttpRequest) -> OktaResult<HttpResponse> {
        let transport = self.current();
        transport.send(request).await
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransportHandle")
    }
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a transport, optionally routed through `proxy`.
    pub fn new(proxy: Option<&str>) -> OktaResult<Self> {
        let mut builder = reqwest::Client::builder().user_agent(crate::USER_AGENT);

        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            let parsed = url::Url::parse(proxy).map_err(|e| {
                OktaError::client_initialization(format!("invalid http_proxy {:?}: {}", proxy, e))
            })?;
            let proxy = reqwest::Proxy::all(parsed.as_str()).map_err(|e| {
                OktaError::client_initialization(format!("invalid http_proxy: {}", e)).with_cause(e)
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            OktaError::client_initialization(format!("failed to build HTTP client: {}", e))
                .with_cause(e)
        })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> OktaResult<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method.into(), &request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!("request timed out: {}", e)
            } else {
                format!("request failed: {}", e)
            };
            OktaError::transport(message).with_cause(e)
        })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(|e| {
            OktaError::transport(format!("failed to read response body: {}", e)).with_cause(e)
        })?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Scripted transport for unit tests. Responses are returned in queue order.
#[derive(Default)]
pub struct MockHttpTransport {
    responses: Mutex<VecDeque<OktaResult<HttpResponse>>>,
    history: Mutex<Vec<HttpRequest>>,
}

impl MockHttpTransport {
    /// Creates an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn queue_response(&self, response: HttpResponse) -> &Self {
        self.responses.lock().push_back(Ok(response));
        self
    }

    /// Queues a JSON response.
    pub fn queue_json(&self, status: u16, body: serde_json::Value) -> &Self {
        self.queue_response(HttpResponse::json_body(status, &body))
    }

    /// Queues a transport failure.
    pub fn queue_error(&self, error: OktaError) -> &Self {
        self.responses.lock().push_back(Err(error));
        self
    }

    /// All requests seen so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.history.lock().clone()
    }

    /// Number of requests seen.
    pub fn request_count(&self) -> usize {
        self.history.lock().len()
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn send(&self, request: HttpRequest) -> OktaResult<HttpResponse> {
        self.history.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(OktaError::transport("no mock response available")))
    }
}
