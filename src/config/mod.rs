//! Provider configuration: raw attributes, environment defaults and the
//! derived connection settings and retry policy.

use crate::errors::{Diagnostic, Diagnostics};
use crate::observability::LogLevel;
use crate::provider::schema::{self, AttributeValue};
use crate::resilience::RetryPolicy;
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeSet;
use std::time::Duration;

/// Default Okta domain suffix.
pub const DEFAULT_BASE_URL: &str = "okta.com";

/// Default minimum wait between retries, in seconds.
pub const DEFAULT_MIN_WAIT_SECONDS: i64 = 30;

/// Default maximum wait between retries, in seconds.
pub const DEFAULT_MAX_WAIT_SECONDS: i64 = 300;

/// Default retry budget.
pub const DEFAULT_MAX_RETRIES: i64 = 5;

/// Default parallelism for bulk operations.
pub const DEFAULT_PARALLELISM: i64 = 1;

/// Default log level (ERROR).
pub const DEFAULT_LOG_LEVEL: i64 = 5;

/// Default share of the rate limit the provider may consume.
pub const DEFAULT_MAX_API_CAPACITY: i64 = 100;

/// Environment variable names consulted for defaults.
pub mod env {
    /// Organization name.
    pub const ORG_NAME: &str = "OKTA_ORG_NAME";
    /// Bearer access token.
    pub const ACCESS_TOKEN: &str = "OKTA_ACCESS_TOKEN";
    /// SSWS API token.
    pub const API_TOKEN: &str = "OKTA_API_TOKEN";
    /// OAuth client id.
    pub const CLIENT_ID: &str = "OKTA_API_CLIENT_ID";
    /// Comma separated OAuth scopes.
    pub const SCOPES: &str = "OKTA_API_SCOPES";
    /// PEM private key.
    pub const PRIVATE_KEY: &str = "OKTA_API_PRIVATE_KEY";
    /// Private key id.
    pub const PRIVATE_KEY_ID: &str = "OKTA_API_PRIVATE_KEY_ID";
    /// Domain suffix.
    pub const BASE_URL: &str = "OKTA_BASE_URL";
    /// HTTP proxy.
    pub const HTTP_PROXY: &str = "OKTA_HTTP_PROXY";
}

/// Raw provider configuration as supplied by the practitioner.
///
/// Every attribute is optional; unset attributes are filled from the
/// environment and built-in defaults by [`ProviderConfig::with_defaults`].
#[derive(Clone, Default)]
pub struct ProviderConfig {
    /// Organization to manage.
    pub org_name: Option<String>,
    /// Bearer token.
    pub access_token: Option<SecretString>,
    /// SSWS API token.
    pub api_token: Option<SecretString>,
    /// OAuth client id.
    pub client_id: Option<String>,
    /// OAuth scopes.
    pub scopes: BTreeSet<String>,
    /// PEM private key for the OAuth client.
    pub private_key: Option<SecretString>,
    /// Private key id (`kid`).
    pub private_key_id: Option<String>,
    /// Domain suffix, e.g. `okta.com` or `oktapreview.com`.
    pub base_url: Option<String>,
    /// Alternate HTTP proxy.
    pub http_proxy: Option<String>,
    /// Exponential backoff on rate limits.
    pub backoff: Option<bool>,
    /// Minimum wait seconds.
    pub min_wait_seconds: Option<i64>,
    /// Maximum wait seconds.
    pub max_wait_seconds: Option<i64>,
    /// Retry budget.
    pub max_retries: Option<i64>,
    /// Concurrent requests for non-bulk operations.
    pub parallelism: Option<i64>,
    /// Log level, 1 (TRACE) to 5 (ERROR).
    pub log_level: Option<i64>,
    /// Percentage of rate limit capacity to use.
    pub max_api_capacity: Option<i64>,
    /// Per-request timeout seconds, 0 means none.
    pub request_timeout: Option<i64>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("org_name", &self.org_name)
            .field("access_token", &self.access_token.is_some())
            .field("api_token", &self.api_token.is_some())
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("private_key", &self.private_key.is_some())
            .field("private_key_id", &self.private_key_id)
            .field("base_url", &self.base_url)
            .field("http_proxy", &self.http_proxy)
            .field("backoff", &self.backoff)
            .field("min_wait_seconds", &self.min_wait_seconds)
            .field("max_wait_seconds", &self.max_wait_seconds)
            .field("max_retries", &self.max_retries)
            .field("parallelism", &self.parallelism)
            .field("log_level", &self.log_level)
            .field("max_api_capacity", &self.max_api_capacity)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ProviderConfigBuilder {
        ProviderConfigBuilder::new()
    }

    /// Reads every attribute from the process environment, then applies
    /// built-in defaults.
    pub fn from_env() -> Self {
        Self::default().with_defaults(|key| std::env::var(key).ok())
    }

    /// Fills unset attributes from `lookup` (normally the environment) and
    /// built-in defaults.
    ///
    /// Each attribute is filled from its own variable. A credential taken
    /// from the environment may conflict with an explicit one; `validate`
    /// reports that.
    pub fn with_defaults<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if self.org_name.is_none() {
            self.org_name = lookup(env::ORG_NAME);
        }

        if self.access_token.is_none() {
            self.access_token = lookup(env::ACCESS_TOKEN).map(SecretString::new);
        }
        if self.api_token.is_none() {
            self.api_token = lookup(env::API_TOKEN).map(SecretString::new);
        }
        if self.client_id.is_none() {
            self.client_id = lookup(env::CLIENT_ID);
        }
        if self.private_key.is_none() {
            self.private_key = lookup(env::PRIVATE_KEY).map(SecretString::new);
        }
        if self.private_key_id.is_none() {
            self.private_key_id = lookup(env::PRIVATE_KEY_ID);
        }
        if self.scopes.is_empty() {
            if let Some(scopes) = lookup(env::SCOPES) {
                self.scopes = scopes
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
        }

        if self.base_url.is_none() {
            self.base_url =
                Some(lookup(env::BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()));
        }
        if self.http_proxy.is_none() {
            self.http_proxy = lookup(env::HTTP_PROXY);
        }

        self.backoff.get_or_insert(true);
        self.min_wait_seconds.get_or_insert(DEFAULT_MIN_WAIT_SECONDS);
        self.max_wait_seconds.get_or_insert(DEFAULT_MAX_WAIT_SECONDS);
        self.max_retries.get_or_insert(DEFAULT_MAX_RETRIES);
        self.parallelism.get_or_insert(DEFAULT_PARALLELISM);
        self.log_level.get_or_insert(DEFAULT_LOG_LEVEL);
        self.max_api_capacity.get_or_insert(DEFAULT_MAX_API_CAPACITY);
        self.request_timeout.get_or_insert(0);
        self
    }

    /// Gets an attribute by its schema name.
    pub fn attribute(&self, name: &str) -> AttributeValue {
        fn string(v: &Option<String>) -> AttributeValue {
            match v {
                Some(s) if !s.is_empty() => AttributeValue::String(s.clone()),
                _ => AttributeValue::Null,
            }
        }
        fn secret(v: &Option<SecretString>) -> AttributeValue {
            match v {
                Some(s) if !s.expose_secret().is_empty() => AttributeValue::Sensitive,
                _ => AttributeValue::Null,
            }
        }
        fn int(v: Option<i64>) -> AttributeValue {
            v.map_or(AttributeValue::Null, AttributeValue::Int)
        }

        match name {
            "org_name" => string(&self.org_name),
            "access_token" => secret(&self.access_token),
            "api_token" => secret(&self.api_token),
            "client_id" => string(&self.client_id),
            "scopes" if self.scopes.is_empty() => AttributeValue::Null,
            "scopes" => AttributeValue::Set(self.scopes.iter().cloned().collect()),
            "private_key" => secret(&self.private_key),
            "private_key_id" => string(&self.private_key_id),
            "base_url" => string(&self.base_url),
            "http_proxy" => string(&self.http_proxy),
            "backoff" => self.backoff.map_or(AttributeValue::Null, AttributeValue::Bool),
            "min_wait_seconds" => int(self.min_wait_seconds),
            "max_wait_seconds" => int(self.max_wait_seconds),
            "max_retries" => int(self.max_retries),
            "parallelism" => int(self.parallelism),
            "log_level" => int(self.log_level),
            "max_api_capacity" => int(self.max_api_capacity),
            "request_timeout" => int(self.request_timeout),
            _ => AttributeValue::Null,
        }
    }

    /// Runs the schema validators plus cross-attribute checks.
    pub fn validate(&self) -> Diagnostics {
        let mut diags = schema::validate(self);

        if let (Some(min), Some(max)) = (self.min_wait_seconds, self.max_wait_seconds) {
            if min > max {
                diags.push(
                    Diagnostic::error(
                        "Invalid Attribute Value",
                        format!(
                            "min_wait_seconds ({}) must not exceed max_wait_seconds ({})",
                            min, max
                        ),
                    )
                    .at("min_wait_seconds"),
                );
            }
        }
        for name in ["min_wait_seconds", "max_wait_seconds", "parallelism"] {
            if let AttributeValue::Int(v) = self.attribute(name) {
                if v < 0 || (name == "parallelism" && v == 0) {
                    diags.push(
                        Diagnostic::error(
                            "Invalid Attribute Value",
                            format!("{} must be positive, got {}", name, v),
                        )
                        .at(name),
                    );
                }
            }
        }

        diags
    }

    /// Derives the retry policy.
    ///
    /// Each attribute maps onto its namesake: `max_api_capacity` to the
    /// capacity ceiling, `min_wait_seconds`/`max_wait_seconds` to the wait
    /// bounds and `max_retries` to the retry count.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            enabled: self.backoff.unwrap_or(true),
            min_wait: secs(self.min_wait_seconds.unwrap_or(DEFAULT_MIN_WAIT_SECONDS)),
            max_wait: secs(self.max_wait_seconds.unwrap_or(DEFAULT_MAX_WAIT_SECONDS)),
            max_retries: self
                .max_retries
                .unwrap_or(DEFAULT_MAX_RETRIES)
                .clamp(0, 100) as u32,
            max_api_capacity: self
                .max_api_capacity
                .unwrap_or(DEFAULT_MAX_API_CAPACITY)
                .clamp(1, 100) as u8,
            request_timeout: self.request_timeout_duration(),
        }
    }

    /// Per-request deadline; `None` when the timeout is 0.
    pub fn request_timeout_duration(&self) -> Option<Duration> {
        match self.request_timeout.unwrap_or(0) {
            t if t <= 0 => None,
            t => Some(secs(t)),
        }
    }

    /// Parallelism as a usize, at least 1.
    pub fn parallelism(&self) -> usize {
        self.parallelism.unwrap_or(DEFAULT_PARALLELISM).max(1) as usize
    }

    /// Configured log level.
    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_provider_level(self.log_level.unwrap_or(DEFAULT_LOG_LEVEL))
    }
}

fn secs(value: i64) -> Duration {
    Duration::from_secs(value.max(0) as u64)
}

/// Builder for ProviderConfig.
#[derive(Debug, Default)]
pub struct ProviderConfigBuilder {
    config: ProviderConfig,
}

impl ProviderConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the organization name.
    pub fn org_name(mut self, org: impl Into<String>) -> Self {
        self.config.org_name = Some(org.into());
        self
    }

    /// Sets the bearer access token.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = Some(SecretString::new(token.into()));
        self
    }

    /// Sets the SSWS API token.
    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.config.api_token = Some(SecretString::new(token.into()));
        self
    }

    /// Sets the OAuth client id.
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.config.client_id = Some(id.into());
        self
    }

    /// Adds OAuth scopes.
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    /// Sets the PEM private key.
    pub fn private_key(mut self, pem: impl Into<String>) -> Self {
        self.config.private_key = Some(SecretString::new(pem.into()));
        self
    }

    /// Sets the private key id.
    pub fn private_key_id(mut self, kid: impl Into<String>) -> Self {
        self.config.private_key_id = Some(kid.into());
        self
    }

    /// Sets the domain suffix.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = Some(base_url.into());
        self
    }

    /// Sets the HTTP proxy.
    pub fn http_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.http_proxy = Some(proxy.into());
        self
    }

    /// Enables or disables backoff.
    pub fn backoff(mut self, enabled: bool) -> Self {
        self.config.backoff = Some(enabled);
        self
    }

    /// Sets the minimum wait seconds.
    pub fn min_wait_seconds(mut self, seconds: i64) -> Self {
        self.config.min_wait_seconds = Some(seconds);
        self
    }

    /// Sets the maximum wait seconds.
    pub fn max_wait_seconds(mut self, seconds: i64) -> Self {
        self.config.max_wait_seconds = Some(seconds);
        self
    }

    /// Sets the retry budget.
    pub fn max_retries(mut self, retries: i64) -> Self {
        self.config.max_retries = Some(retries);
        self
    }

    /// Sets the parallelism.
    pub fn parallelism(mut self, parallelism: i64) -> Self {
        self.config.parallelism = Some(parallelism);
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: i64) -> Self {
        self.config.log_level = Some(level);
        self
    }

    /// Sets the maximum API capacity percentage.
    pub fn max_api_capacity(mut self, percent: i64) -> Self {
        self.config.max_api_capacity = Some(percent);
        self
    }

    /// Sets the request timeout seconds.
    pub fn request_timeout(mut self, seconds: i64) -> Self {
        self.config.request_timeout = Some(seconds);
        self
    }

    /// Returns the raw configuration without defaults.
    pub fn build(self) -> ProviderConfig {
        self.config
    }
}
