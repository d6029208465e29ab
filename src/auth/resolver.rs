//! Credential resolution.
//!
//! Turns the raw optional credential fields into exactly one
//! [`AuthStrategy`], or none when nothing was supplied.

use super::{AccessTokenAuth, AuthStrategy, PrivateKeyAuth};
use crate::config::ProviderConfig;
use crate::errors::{OktaError, OktaResult};
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeSet;

/// Raw credential fields as configured.
#[derive(Clone, Default)]
pub struct CredentialInputs {
    /// Bearer token.
    pub access_token: Option<SecretString>,
    /// SSWS API token.
    pub api_token: Option<SecretString>,
    /// OAuth client id.
    pub client_id: Option<String>,
    /// OAuth scopes.
    pub scopes: BTreeSet<String>,
    /// PEM private key.
    pub private_key: Option<SecretString>,
    /// Private key id.
    pub private_key_id: Option<String>,
}

impl std::fmt::Debug for CredentialInputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialInputs")
            .field("access_token", &self.access_token.is_some())
            .field("api_token", &self.api_token.is_some())
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("private_key", &self.private_key.is_some())
            .field("private_key_id", &self.private_key_id)
            .finish()
    }
}

impl From<&ProviderConfig> for CredentialInputs {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            access_token: config.access_token.clone(),
            api_token: config.api_token.clone(),
            client_id: config.client_id.clone(),
            scopes: config.scopes.clone(),
            private_key: config.private_key.clone(),
            private_key_id: config.private_key_id.clone(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

fn non_empty_secret(value: &Option<SecretString>) -> Option<SecretString> {
    value
        .as_ref()
        .filter(|v| !v.expose_secret().trim().is_empty())
        .cloned()
}

/// Resolves credential inputs into a single strategy.
///
/// Returns `Ok(None)` for empty input. Conflicting or incomplete inputs are
/// configuration errors. Pure: nothing is contacted or cached.
pub fn resolve(inputs: &CredentialInputs) -> OktaResult<Option<AuthStrategy>> {
    let access_token = non_empty_secret(&inputs.access_token);
    let api_token = non_empty_secret(&inputs.api_token);
    let client_id = non_empty(&inputs.client_id);
    let private_key = non_empty_secret(&inputs.private_key);
    let private_key_id = non_empty(&inputs.private_key_id);
    let scopes: Vec<String> = inputs
        .scopes
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    let mut strategies = Vec::new();
    if access_token.is_some() {
        strategies.push("access_token");
    }
    if api_token.is_some() {
        strategies.push("api_token");
    }
    if client_id.is_some() {
        strategies.push("client_id");
    }
    if strategies.len() > 1 {
        return Err(OktaError::configuration(format!(
            "only one of access_token, api_token or client_id may be set, got {}",
            strategies.join(" and ")
        )));
    }

    let Some(client_id) = client_id else {
        let mut orphans = Vec::new();
        if !scopes.is_empty() {
            orphans.push("scopes");
        }
        if private_key.is_some() {
            orphans.push("private_key");
        }
        if private_key_id.is_some() {
            orphans.push("private_key_id");
        }
        if !orphans.is_empty() {
            return Err(OktaError::configuration(format!(
                "{} requires client_id",
                orphans.join(", ")
            )));
        }

        return Ok(access_token
            .map(AuthStrategy::BearerToken)
            .or(api_token.map(AuthStrategy::ApiToken)));
    };

    match (private_key, private_key_id) {
        (Some(private_key), private_key_id) => {
            if scopes.is_empty() {
                return Err(OktaError::configuration(
                    "client_id with private_key requires at least one scope",
                ));
            }
            Ok(Some(AuthStrategy::OAuthPrivateKey(PrivateKeyAuth {
                client_id,
                private_key,
                private_key_id,
                scopes,
            })))
        }
        (None, Some(private_key_id)) => Ok(Some(AuthStrategy::OAuthAccessToken(AccessTokenAuth {
            client_id,
            private_key_id,
            scopes,
        }))),
        (None, None) => Err(OktaError::configuration(
            "client_id requires private_key or private_key_id",
        )),
    }
}
