//! Okta management API client and the factory that builds it.

use crate::auth::{AccessTokenSource, AuthManager, AuthStrategy};
use crate::config::{ProviderConfig, DEFAULT_BASE_URL};
use crate::errors::{OktaError, OktaResult};
use crate::observability::TracingHooks;
use crate::resilience::{
    reset_from_headers, CapacityGovernor, ProductionTime, RetryExecutor, RetryPolicy,
    TimeOperations,
};
use crate::transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportHandle,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};
use url::Url;

/// Okta request id header.
const REQUEST_ID_HEADER: &str = "x-okta-request-id";

/// Okta error response format.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct OktaErrorResponse {
    error_code: Option<String>,
    error_summary: Option<String>,
    #[serde(default)]
    error_causes: Vec<OktaErrorCause>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct OktaErrorCause {
    error_summary: String,
}

/// Connection parameters for one client.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Organization name, the first label of the org host.
    pub org_name: String,
    /// Domain suffix.
    pub base_url: String,
    /// Optional proxy URL.
    pub http_proxy: Option<String>,
    /// Retry and backoff parameters.
    pub retry: RetryPolicy,
    /// Fan-out bound for callers.
    pub parallelism: usize,
}

impl ConnectionSettings {
    /// Extracts connection settings from a configuration with defaults
    /// already applied.
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            org_name: config.org_name.clone().unwrap_or_default(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            http_proxy: config.http_proxy.clone().filter(|p| !p.is_empty()),
            retry: config.retry_policy(),
            parallelism: config.parallelism(),
        }
    }

    /// `https://{org_name}.{base_url}/`.
    pub fn org_url(&self) -> OktaResult<Url> {
        let org = self.org_name.trim();
        let base = self.base_url.trim().trim_end_matches('/');
        if org.is_empty() {
            return Err(OktaError::client_initialization("org_name is required"));
        }
        if base.is_empty() {
            return Err(OktaError::client_initialization("base_url is required"));
        }

        let raw = format!("https://{}.{}/", org, base);
        let url = Url::parse(&raw).map_err(|e| {
            OktaError::client_initialization(format!("malformed org URL {:?}: {}", raw, e))
        })?;
        if url.path() != "/" || url.query().is_some() {
            return Err(OktaError::client_initialization(format!(
                "malformed org URL {:?}: base_url must be a bare domain",
                raw
            )));
        }
        Ok(url)
    }
}

/// Builds [`OktaClient`]s. Opens no connections.
#[derive(Default)]
pub struct ClientFactory {
    transport: Option<Arc<dyn HttpTransport>>,
    token_source: Option<Arc<dyn AccessTokenSource>>,
    time: Option<Arc<dyn TimeOperations>>,
    org_url: Option<Url>,
}

impl ClientFactory {
    /// Creates a factory using the reqwest transport and the real clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `transport` instead of building a reqwest transport.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Source of access tokens for the `OAuthAccessToken` strategy.
    pub fn with_token_source(mut self, source: Arc<dyn AccessTokenSource>) -> Self {
        self.token_source = Some(source);
        self
    }

    /// Uses `time` for sleeping and expiry checks.
    pub fn with_time(mut self, time: Arc<dyn TimeOperations>) -> Self {
        self.time = Some(time);
        self
    }

    /// Talks to `url` instead of the URL composed from org name and base URL.
    pub fn with_org_url(mut self, url: Url) -> Self {
        self.org_url = Some(url);
        self
    }

    /// Builds a client for `strategy`.
    ///
    /// Fails with a client initialization error when no strategy was
    /// resolved, the org URL or proxy is malformed, or an
    /// `OAuthAccessToken` strategy has no token source.
    pub fn build(
        &self,
        strategy: Option<AuthStrategy>,
        settings: &ConnectionSettings,
    ) -> OktaResult<OktaClient> {
        let strategy = strategy.ok_or_else(|| {
            OktaError::client_initialization(
                "no credentials configured: set one of access_token, api_token or client_id",
            )
        })?;

        let org_url = match &self.org_url {
            Some(url) => url.clone(),
            None => settings.org_url()?,
        };

        let transport: Arc<dyn HttpTransport> = match &self.transport {
            Some(transport) => transport.clone(),
            None => Arc::new(ReqwestTransport::new(settings.http_proxy.as_deref())?),
        };
        let transport = TransportHandle::new(transport);
        let time: Arc<dyn TimeOperations> = self
            .time
            .clone()
            .unwrap_or_else(|| Arc::new(ProductionTime));

        let auth = AuthManager::new(
            strategy,
            &org_url,
            transport.clone(),
            self.token_source.clone(),
            time.clone(),
        )?
        .with_request_timeout(settings.retry.request_timeout);

        tracing::debug!(
            org_url = %org_url,
            strategy = auth.strategy().name(),
            max_retries = settings.retry.max_retries,
            max_api_capacity = settings.retry.max_api_capacity,
            "Okta client configured"
        );

        let parallelism = settings.parallelism.max(1);
        Ok(OktaClient {
            org_url,
            auth: Arc::new(auth),
            transport,
            governor: CapacityGovernor::new(settings.retry.max_api_capacity, time.clone()),
            retry: RetryExecutor::new(settings.retry.clone(), time.clone()),
            request_timeout: settings.retry.request_timeout,
            parallelism,
            slots: Semaphore::new(parallelism),
            time,
        })
    }
}

/// Authenticated, rate-limit aware Okta management API client.
pub struct OktaClient {
    org_url: Url,
    auth: Arc<AuthManager>,
    transport: TransportHandle,
    governor: CapacityGovernor,
    retry: RetryExecutor,
    request_timeout: Option<Duration>,
    parallelism: usize,
    slots: Semaphore,
    time: Arc<dyn TimeOperations>,
}

impl std::fmt::Debug for OktaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OktaClient")
            .field("org_url", &self.org_url.as_str())
            .field("auth", &self.auth)
            .field("parallelism", &self.parallelism)
            .finish()
    }
}

impl OktaClient {
    /// Org base URL.
    pub fn org_url(&self) -> &Url {
        &self.org_url
    }

    /// Authentication manager.
    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    /// Retry policy in force.
    pub fn retry_policy(&self) -> &RetryPolicy {
        self.retry.policy()
    }

    /// Capacity governor.
    pub fn governor(&self) -> &CapacityGovernor {
        &self.governor
    }

    /// Configured parallelism for fan-out.
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Waits for one of `parallelism` slots.
    pub async fn slot(&self) -> OktaResult<SemaphorePermit<'_>> {
        self.slots
            .acquire()
            .await
            .map_err(|e| OktaError::client_initialization(format!("client closed: {}", e)))
    }

    /// Installs a different transport and returns the previous one. Token
    /// exchanges go through the new transport as well.
    pub fn reset_transport(&self, transport: Arc<dyn HttpTransport>) -> Arc<dyn HttpTransport> {
        self.transport.replace(transport)
    }

    /// Transport currently installed.
    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        self.transport.current()
    }

    /// GET and decode.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> OktaResult<T> {
        self.send(HttpMethod::Get, path, Option::<&()>::None)
            .await?
            .json()
    }

    /// POST a JSON body and decode.
    pub async fn post<T, B>(&self, path: &str, body: &B) -> OktaResult<T>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        self.send(HttpMethod::Post, path, Some(body)).await?.json()
    }

    /// PUT a JSON body and decode.
    pub async fn put<T, B>(&self, path: &str, body: &B) -> OktaResult<T>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        self.send(HttpMethod::Put, path, Some(body)).await?.json()
    }

    /// DELETE, discarding the response body.
    pub async fn delete(&self, path: &str) -> OktaResult<()> {
        self.send(HttpMethod::Delete, path, Option::<&()>::None).await?;
        Ok(())
    }

    /// Sends a request through the retry executor and returns the successful
    /// response. Every attempt, retries included, waits on the governor.
    pub async fn send<B: Serialize>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
    ) -> OktaResult<HttpResponse> {
        let url = self.build_url(path)?;
        let body = body
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| {
                OktaError::serialization(format!("failed to encode request body: {}", e))
                    .with_cause(e)
            })?;

        let url = url.as_str();
        let body = body.as_deref();

        self.retry
            .execute(method.as_str(), url, move || self.attempt(method, url, body))
            .await
    }

    async fn attempt(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<&str>,
    ) -> OktaResult<HttpResponse> {
        self.governor.acquire(url).await;
        let authorization = self.auth.authorization_header().await?;

        let mut request = HttpRequest::new(method, url)
            .with_header("authorization", &authorization)?
            .with_header("accept", "application/json")?
            .with_timeout(self.request_timeout);
        if let Some(body) = body {
            request = request.with_json_body(body.to_string());
        }
        TracingHooks::on_request_headers(method.as_str(), url, &request.headers);

        let started = Instant::now();
        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                TracingHooks::on_request_error(method.as_str(), url, &e.to_string());
                return Err(e);
            }
        };
        TracingHooks::on_request_complete(method.as_str(), url, response.status, started.elapsed());

        self.governor.observe(url, &response.headers);

        if response.is_success() {
            return Ok(response);
        }
        if response.status == 401 && self.auth.strategy().is_oauth() {
            self.auth.invalidate().await;
        }
        Err(self.error_from_response(&response))
    }

    fn error_from_response(&self, response: &HttpResponse) -> OktaError {
        let message = match serde_json::from_str::<OktaErrorResponse>(&response.body) {
            Ok(body) => {
                let mut message = match (body.error_code, body.error_summary) {
                    (Some(code), Some(summary)) => format!("{}: {}", code, summary),
                    (None, Some(summary)) => summary,
                    (Some(code), None) => code,
                    (None, None) => format!("HTTP {}", response.status),
                };
                let causes: Vec<String> = body
                    .error_causes
                    .into_iter()
                    .map(|c| c.error_summary)
                    .collect();
                if !causes.is_empty() {
                    message = format!("{} ({})", message, causes.join("; "));
                }
                message
            }
            Err(_) => format!("HTTP {}", response.status),
        };

        let mut error = OktaError::from_status(response.status, message);
        if let Some(id) = response.header(REQUEST_ID_HEADER) {
            error = error.with_request_id(id);
        }
        if response.status == 429 {
            if let Some(reset_at) = reset_from_headers(&response.headers) {
                let reset_in = (reset_at - self.time.now()).num_seconds().max(0) as u64;
                error = error.with_reset_in(reset_in);
            }
        }
        error
    }

    fn build_url(&self, path: &str) -> OktaResult<Url> {
        if path.starts_with("https://") || path.starts_with("http://") {
            return Url::parse(path)
                .map_err(|e| OktaError::configuration(format!("invalid URL {:?}: {}", path, e)));
        }
        self.org_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| OktaError::configuration(format!("invalid path {:?}: {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OktaErrorKind;
    use crate::resilience::{Bucket, TestTime};
    use crate::transport::MockHttpTransport;
    use secrecy::SecretString;
    use serde_json::{json, Value};

    fn settings(org: &str, base: &str) -> ConnectionSettings {
        ConnectionSettings {
            org_name: org.to_string(),
            base_url: base.to_string(),
            http_proxy: None,
            retry: RetryPolicy {
                min_wait: Duration::from_secs(1),
                max_wait: Duration::from_secs(4),
                max_retries: 2,
                ..RetryPolicy::default()
            },
            parallelism: 2,
        }
    }

    fn api_token() -> Option<AuthStrategy> {
        Some(AuthStrategy::ApiToken(SecretString::new("00abc".to_string())))
    }

    fn client(mock: Arc<MockHttpTransport>, time: Arc<TestTime>) -> OktaClient {
        ClientFactory::new()
            .with_transport(mock)
            .with_time(time)
            .build(api_token(), &settings("dev-1", "okta.com"))
            .unwrap()
    }

    #[test]
    fn test_org_url() {
        let url = settings("dev-1", "oktapreview.com").org_url().unwrap();
        assert_eq!(url.as_str(), "https://dev-1.oktapreview.com/");
    }

    #[test]
    fn test_malformed_org_url_rejected() {
        for (org, base) in [("dev 1", "okta.com"), ("", "okta.com"), ("dev-1", "okta.com/path")] {
            let err = settings(org, base).org_url().unwrap_err();
            assert_eq!(*err.kind(), OktaErrorKind::ClientInitialization, "{} {}", org, base);
        }
    }

    #[test]
    fn test_factory_requires_strategy() {
        let err = ClientFactory::new()
            .with_transport(Arc::new(MockHttpTransport::new()))
            .build(None, &settings("dev-1", "okta.com"))
            .unwrap_err();
        assert_eq!(*err.kind(), OktaErrorKind::ClientInitialization);
    }

    #[test]
    fn test_factory_rejects_bad_proxy() {
        let mut settings = settings("dev-1", "okta.com");
        settings.http_proxy = Some("::not a proxy::".to_string());
        let err = ClientFactory::new().build(api_token(), &settings).unwrap_err();
        assert_eq!(*err.kind(), OktaErrorKind::ClientInitialization);
    }

    #[tokio::test]
    async fn test_factory_opens_no_connection() {
        let mock = Arc::new(MockHttpTransport::new());
        let _client = client(mock.clone(), Arc::new(TestTime::default()));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_get_sends_authorization() {
        let mock = Arc::new(MockHttpTransport::new());
        mock.queue_json(200, json!({"id": "00u1", "status": "ACTIVE"}));
        let client = client(mock.clone(), Arc::new(TestTime::default()));

        let user: Value = client.get("/api/v1/users/00u1").await.unwrap();
        assert_eq!(user["status"], "ACTIVE");

        let request = &mock.requests()[0];
        assert_eq!(request.url, "https://dev-1.okta.com/api/v1/users/00u1");
        assert_eq!(request.headers["authorization"], "SSWS 00abc");
    }

    #[tokio::test]
    async fn test_retries_then_exhausts() {
        let mock = Arc::new(MockHttpTransport::new());
        for _ in 0..3 {
            mock.queue_response(HttpResponse::json_body(
                500,
                &json!({"errorCode": "E0000009", "errorSummary": "Internal Server Error"}),
            ));
        }
        let time = Arc::new(TestTime::default());
        let client = client(mock.clone(), time.clone());

        let err = client.get::<Value>("/api/v1/groups").await.unwrap_err();
        assert_eq!(*err.kind(), OktaErrorKind::RetryExhausted);
        assert!(err.message().contains("E0000009"));
        assert_eq!(mock.request_count(), 3);
        assert_eq!(time.sleeps(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn test_rate_limited_uses_reset_header() {
        let mock = Arc::new(MockHttpTransport::new());
        let time = Arc::new(TestTime::default());
        let reset = (time.now().timestamp() + 3).to_string();
        mock.queue_response(
            HttpResponse::json_body(
                429,
                &json!({"errorCode": "E0000047", "errorSummary": "API call exceeded rate limit"}),
            )
            .with_header("x-rate-limit-reset", &reset)
            .with_header("x-okta-request-id", "req-1"),
        );
        mock.queue_json(200, json!([]));
        let client = client(mock.clone(), time.clone());

        let groups: Vec<Value> = client.get("/api/v1/groups").await.unwrap();
        assert!(groups.is_empty());
        let slept = time.sleeps();
        assert_eq!(slept.len(), 1);
        assert!(slept[0] <= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_retry_waits_on_governor() {
        use chrono::TimeZone;

        let mock = Arc::new(MockHttpTransport::new());
        let time = Arc::new(TestTime::starting_at(
            chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let reset = (time.now().timestamp() + 20).to_string();
        mock.queue_response(
            HttpResponse::new(503, String::new())
                .with_header("x-rate-limit-limit", "100")
                .with_header("x-rate-limit-remaining", "10")
                .with_header("x-rate-limit-reset", &reset),
        );
        mock.queue_json(200, json!({"id": "00u1"}));

        let mut settings = settings("dev-1", "okta.com");
        settings.retry.max_api_capacity = 50;
        let client = ClientFactory::new()
            .with_transport(mock.clone())
            .with_time(time.clone())
            .build(api_token(), &settings)
            .unwrap();

        let me: Value = client.get("/api/v1/users/me").await.unwrap();
        assert_eq!(me["id"], "00u1");
        assert_eq!(mock.request_count(), 2);
        // Backoff first, then the rest of the quota window before the retry.
        assert_eq!(time.sleeps(), vec![Duration::from_secs(1), Duration::from_secs(19)]);
        assert!(client.governor().snapshot(Bucket::Users).is_none());
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let mock = Arc::new(MockHttpTransport::new());
        mock.queue_response(
            HttpResponse::json_body(
                400,
                &json!({
                    "errorCode": "E0000001",
                    "errorSummary": "Api validation failed: login",
                    "errorCauses": [
                        {"errorSummary": "login: An object with this field already exists"}
                    ]
                }),
            )
            .with_header("x-okta-request-id", "req-2"),
        );
        let client = client(mock.clone(), Arc::new(TestTime::default()));

        let err = client
            .post::<Value, _>("/api/v1/users", &json!({"profile": {"login": "a@b.c"}}))
            .await
            .unwrap_err();
        assert_eq!(*err.kind(), OktaErrorKind::Http);
        assert_eq!(err.status_code(), Some(400));
        assert_eq!(err.request_id(), Some("req-2"));
        assert!(err.message().contains("already exists"));
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_reset_transport_swaps_future_requests() {
        let first = Arc::new(MockHttpTransport::new());
        let client = client(first.clone(), Arc::new(TestTime::default()));

        let second = Arc::new(MockHttpTransport::new());
        second.queue_response(HttpResponse::new(204, ""));
        client.reset_transport(second.clone());

        client.delete("/api/v1/groups/00g1").await.unwrap();
        assert_eq!(first.request_count(), 0);
        assert_eq!(second.request_count(), 1);
    }

    #[tokio::test]
    async fn test_parallelism_slots() {
        let client = client(Arc::new(MockHttpTransport::new()), Arc::new(TestTime::default()));
        assert_eq!(client.parallelism(), 2);
        let _a = client.slot().await.unwrap();
        let _b = client.slot().await.unwrap();
        assert!(client.slots.try_acquire().is_err());
    }
}
