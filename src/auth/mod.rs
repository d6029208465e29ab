//! Authentication for the Okta management API.
//!
//! [`resolve`] picks one [`AuthStrategy`] from the configured credentials.
//! [`AuthManager`] turns that strategy into `Authorization` header values,
//! performing the OAuth exchange on first use and caching the result.

mod oauth;
mod resolver;

pub use oauth::{client_assertion, ClientAssertionClaims, CLIENT_ASSERTION_TYPE};
pub use resolver::{resolve, CredentialInputs};

use crate::errors::{OktaError, OktaResult};
use crate::observability::TracingHooks;
use crate::resilience::TimeOperations;
use crate::transport::TransportHandle;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Access tokens are refreshed this long before they expire.
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// OAuth client authenticated with a private key held by the provider.
#[derive(Debug, Clone)]
pub struct PrivateKeyAuth {
    /// Client id.
    pub client_id: String,
    /// PEM private key.
    pub private_key: SecretString,
    /// Key id placed in the JWT `kid` header.
    pub private_key_id: Option<String>,
    /// Requested scopes.
    pub scopes: Vec<String>,
}

/// OAuth client whose key material lives outside the provider.
#[derive(Debug, Clone)]
pub struct AccessTokenAuth {
    /// Client id.
    pub client_id: String,
    /// Key id registered for the client.
    pub private_key_id: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
}

/// The single credential strategy in force.
#[derive(Debug, Clone)]
pub enum AuthStrategy {
    /// `Authorization: Bearer {access_token}`.
    BearerToken(SecretString),
    /// `Authorization: SSWS {api_token}`.
    ApiToken(SecretString),
    /// Client credentials with a signed client assertion.
    OAuthPrivateKey(PrivateKeyAuth),
    /// Client credentials with tokens from an [`AccessTokenSource`].
    OAuthAccessToken(AccessTokenAuth),
}

impl AuthStrategy {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BearerToken(_) => "access_token",
            Self::ApiToken(_) => "api_token",
            Self::OAuthPrivateKey(_) => "oauth_private_key",
            Self::OAuthAccessToken(_) => "oauth_access_token",
        }
    }

    /// Returns true if the strategy needs a token exchange.
    pub fn is_oauth(&self) -> bool {
        matches!(self, Self::OAuthPrivateKey(_) | Self::OAuthAccessToken(_))
    }
}

/// An OAuth access token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// Token value.
    pub token: SecretString,
    /// Token type, normally `Bearer`.
    pub token_type: String,
    /// Expiration time.
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Creates a bearer token.
    pub fn bearer(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: SecretString::new(token.into()),
            token_type: "Bearer".to_string(),
            expires_at,
        }
    }

    /// Returns true if the token should be replaced at `now`.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + Duration::minutes(REFRESH_MARGIN_MINUTES)
    }

    /// `Authorization` header value.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.token.expose_secret())
    }
}

/// Supplies access tokens for clients whose key the provider does not hold.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Fetches a token for `client_id` with `scopes`.
    async fn access_token(&self, client_id: &str, scopes: &[String]) -> OktaResult<AccessToken>;
}

/// Token source returning a fixed token.
#[derive(Debug, Clone)]
pub struct StaticAccessTokenSource {
    token: AccessToken,
}

impl StaticAccessTokenSource {
    /// Creates a source that always returns `token`.
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl AccessTokenSource for StaticAccessTokenSource {
    async fn access_token(&self, _client_id: &str, _scopes: &[String]) -> OktaResult<AccessToken> {
        Ok(self.token.clone())
    }
}

/// Produces `Authorization` headers for one strategy.
pub struct AuthManager {
    strategy: AuthStrategy,
    token_endpoint: String,
    transport: TransportHandle,
    token_source: Option<Arc<dyn AccessTokenSource>>,
    time: Arc<dyn TimeOperations>,
    request_timeout: Option<std::time::Duration>,
    cached: Mutex<Option<AccessToken>>,
}

impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("strategy", &self.strategy.name())
            .field("token_endpoint", &self.token_endpoint)
            .finish()
    }
}

impl AuthManager {
    /// Creates a manager. OAuth strategies exchange tokens against
    /// `{org_url}/oauth2/v1/token` through `transport`.
    ///
    /// Fails if an `OAuthAccessToken` strategy has no token source.
    pub fn new(
        strategy: AuthStrategy,
        org_url: &url::Url,
        transport: TransportHandle,
        token_source: Option<Arc<dyn AccessTokenSource>>,
        time: Arc<dyn TimeOperations>,
    ) -> OktaResult<Self> {
        if matches!(strategy, AuthStrategy::OAuthAccessToken(_)) && token_source.is_none() {
            return Err(OktaError::client_initialization(
                "client_id with private_key_id and no private_key requires an access token source",
            ));
        }
        let token_endpoint = org_url
            .join("oauth2/v1/token")
            .map_err(|e| {
                OktaError::client_initialization(format!("invalid token endpoint: {}", e))
            })?
            .to_string();

        Ok(Self {
            strategy,
            token_endpoint,
            transport,
            token_source,
            time,
            request_timeout: None,
            cached: Mutex::new(None),
        })
    }

    /// Applies the per-request deadline to token exchanges.
    pub fn with_request_timeout(mut self, timeout: Option<std::time::Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Strategy in force.
    pub fn strategy(&self) -> &AuthStrategy {
        &self.strategy
    }

    /// OAuth token endpoint.
    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    /// `Authorization` header value for the next request.
    pub async fn authorization_header(&self) -> OktaResult<String> {
        match &self.strategy {
            AuthStrategy::BearerToken(token) => Ok(format!("Bearer {}", token.expose_secret())),
            AuthStrategy::ApiToken(token) => Ok(format!("SSWS {}", token.expose_secret())),
            AuthStrategy::OAuthPrivateKey(_) | AuthStrategy::OAuthAccessToken(_) => {
                Ok(self.access_token().await?.authorization_header())
            }
        }
    }

    /// Cached OAuth token, exchanging a new one when missing or near expiry.
    async fn access_token(&self) -> OktaResult<AccessToken> {
        let mut cached = self.cached.lock().await;
        let now = self.time.now();
        if let Some(token) = cached.as_ref().filter(|t| !t.needs_refresh(now)) {
            return Ok(token.clone());
        }

        let token = match &self.strategy {
            AuthStrategy::OAuthPrivateKey(auth) => {
                oauth::exchange(
                    &self.transport,
                    &self.token_endpoint,
                    auth,
                    now,
                    self.request_timeout,
                )
                .await?
            }
            AuthStrategy::OAuthAccessToken(auth) => {
                let source = self.token_source.as_ref().ok_or_else(|| {
                    OktaError::authentication("no access token source configured")
                })?;
                source.access_token(&auth.client_id, &auth.scopes).await?
            }
            _ => return Err(OktaError::authentication("strategy does not use access tokens")),
        };

        if let AuthStrategy::OAuthPrivateKey(PrivateKeyAuth { client_id, .. })
        | AuthStrategy::OAuthAccessToken(AccessTokenAuth { client_id, .. }) = &self.strategy
        {
            let expires_in = (token.expires_at - now).num_seconds().max(0) as u64;
            TracingHooks::on_token_refresh(client_id, expires_in);
        }

        *cached = Some(token.clone());
        Ok(token)
    }

    /// Drops any cached token so the next request exchanges a new one.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
