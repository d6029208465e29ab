//! OAuth 2.0 client credentials with a `private_key_jwt` client assertion.

use super::{AccessToken, PrivateKeyAuth};
use crate::errors::{OktaError, OktaResult};
use crate::transport::{HttpMethod, HttpRequest, TransportHandle};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Client assertion lifetime.
const ASSERTION_LIFETIME_SECONDS: i64 = 3600;

/// Assertion type for signed JWT client authentication.
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Claims of the signed client assertion.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientAssertionClaims {
    /// Client id.
    pub iss: String,
    /// Client id.
    pub sub: String,
    /// Token endpoint.
    pub aud: String,
    /// Issued at.
    pub iat: i64,
    /// Expiration.
    pub exp: i64,
    /// Unique token id.
    pub jti: String,
}

/// Signs an RS256 client assertion for `auth` addressed to `token_endpoint`.
pub fn client_assertion(
    auth: &PrivateKeyAuth,
    token_endpoint: &str,
    now: DateTime<Utc>,
) -> OktaResult<String> {
    let claims = ClientAssertionClaims {
        iss: auth.client_id.clone(),
        sub: auth.client_id.clone(),
        aud: token_endpoint.to_string(),
        iat: now.timestamp(),
        exp: now.timestamp() + ASSERTION_LIFETIME_SECONDS,
        jti: uuid::Uuid::new_v4().to_string(),
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = auth.private_key_id.clone();

    let key = EncodingKey::from_rsa_pem(auth.private_key.expose_secret().as_bytes())
        .map_err(|e| {
            OktaError::authentication(format!("invalid private key: {}", e)).with_cause(e)
        })?;

    encode(&header, &claims, &key).map_err(|e| {
        OktaError::authentication(format!("failed to sign client assertion: {}", e)).with_cause(e)
    })
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    scope: &'a str,
    client_assertion_type: &'a str,
    client_assertion: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: i64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Exchanges a fresh client assertion for an access token.
pub async fn exchange(
    transport: &TransportHandle,
    token_endpoint: &str,
    auth: &PrivateKeyAuth,
    now: DateTime<Utc>,
    timeout: Option<std::time::Duration>,
) -> OktaResult<AccessToken> {
    let assertion = client_assertion(auth, token_endpoint, now)?;
    let scope = auth.scopes.join(" ");
    let form = serde_urlencoded::to_string(TokenRequest {
        grant_type: "client_credentials",
        scope: &scope,
        client_assertion_type: CLIENT_ASSERTION_TYPE,
        client_assertion: &assertion,
    })
    .map_err(|e| OktaError::serialization(format!("failed to encode token request: {}", e)))?;

    let request = HttpRequest::new(HttpMethod::Post, token_endpoint)
        .with_header("content-type", "application/x-www-form-urlencoded")?
        .with_header("accept", "application/json")?
        .with_body(form)
        .with_timeout(timeout);

    let response = transport.send(request).await?;

    if !response.is_success() {
        let detail = response
            .json::<TokenErrorResponse>()
            .map(|e| match e.error_description {
                Some(desc) => format!("{}: {}", e.error, desc),
                None => e.error,
            })
            .unwrap_or_else(|_| response.body.clone());
        return Err(OktaError::authentication(format!(
            "token exchange failed: {}",
            detail
        ))
        .with_status(response.status));
    }

    let token: TokenResponse = response.json()?;
    Ok(AccessToken {
        token: SecretString::new(token.access_token),
        token_type: token.token_type,
        expires_at: now + Duration::seconds(token.expires_in),
    })
}
