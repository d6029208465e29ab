//! The `okta` provider: metadata, schema and configuration.

pub mod schema;

use crate::auth::{resolve, CredentialInputs};
use crate::client::{ClientFactory, ConnectionSettings, OktaClient};
use crate::config::ProviderConfig;
use crate::errors::{Diagnostic, Diagnostics, OktaError, OktaResult};
use crate::observability::LoggingConfig;
use std::sync::Arc;

/// Provider type name.
pub const TYPE_NAME: &str = "okta";

/// Resources served by the provider.
pub const RESOURCES: &[&str] = &[
    "okta_app_access_policy_assignment",
    "okta_app_oauth_role_assignment",
    "okta_brand",
    "okta_log_stream",
    "okta_policy_device_assurance_android",
    "okta_policy_device_assurance_chromeos",
    "okta_policy_device_assurance_ios",
    "okta_policy_device_assurance_macos",
    "okta_policy_device_assurance_windows",
    "okta_customized_signin_page",
    "okta_preview_signin_page",
];

/// Data sources served by the provider.
pub const DATA_SOURCES: &[&str] = &[
    "okta_org_metadata",
    "okta_default_signin_page",
    "okta_log_stream",
];

/// Provider metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMetadata {
    /// Type name, always `okta`.
    pub type_name: &'static str,
    /// Provider version.
    pub version: String,
}

/// Payload handed to resources and data sources.
#[derive(Debug, Clone, Default)]
pub enum ProviderData {
    /// Configuration has not run yet (e.g. during validation).
    #[default]
    Unconfigured,
    /// A ready client.
    Configured(Arc<OktaClient>),
}

impl ProviderData {
    /// The client, if configured.
    pub fn client(&self) -> Option<&Arc<OktaClient>> {
        match self {
            ProviderData::Configured(client) => Some(client),
            ProviderData::Unconfigured => None,
        }
    }

    /// The client, or an error naming the caller.
    pub fn require_client(&self, caller: &str) -> OktaResult<&Arc<OktaClient>> {
        self.client().ok_or_else(|| {
            OktaError::configuration(format!(
                "{} used before the provider was configured",
                caller
            ))
        })
    }
}

/// Result of [`Provider::configure`].
#[derive(Debug, Default)]
pub struct ConfigureResponse {
    /// Data for resources and data sources.
    pub data: ProviderData,
    /// Diagnostics raised along the way.
    pub diagnostics: Diagnostics,
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// The `okta` provider.
pub struct Provider {
    version: String,
    factory: ClientFactory,
    env: EnvLookup,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("version", &self.version)
            .finish()
    }
}

impl Provider {
    /// Creates a provider reading defaults from the process environment.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            factory: ClientFactory::new(),
            env: Arc::new(|key: &str| std::env::var(key).ok()),
        }
    }

    /// Builds clients with `factory`.
    pub fn with_factory(mut self, factory: ClientFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Reads defaults through `lookup` instead of the process environment.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Type name and version.
    pub fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            type_name: TYPE_NAME,
            version: self.version.clone(),
        }
    }

    /// Attribute schema.
    pub fn schema(&self) -> &'static [schema::Attribute] {
        schema::ATTRIBUTES
    }

    /// Resource type names.
    pub fn resources(&self) -> &'static [&'static str] {
        RESOURCES
    }

    /// Data source type names.
    pub fn data_sources(&self) -> &'static [&'static str] {
        DATA_SOURCES
    }

    /// Validates explicit configuration, before any defaults apply.
    pub fn validate(&self, config: &ProviderConfig) -> Diagnostics {
        schema::validate(config)
    }

    /// Validates, applies defaults, resolves credentials and builds the
    /// client. Nothing is built when any error diagnostic is raised.
    pub fn configure(&self, config: ProviderConfig) -> ConfigureResponse {
        let mut response = ConfigureResponse::default();

        response.diagnostics.extend(self.validate(&config));
        if response.diagnostics.has_error() {
            return response;
        }

        let config = config.with_defaults(|key| (self.env)(key));
        response.diagnostics.extend(config.validate());
        if response.diagnostics.has_error() {
            return response;
        }

        if let Err(e) = LoggingConfig::new().with_level(config.log_level()).init() {
            tracing::debug!(error = %e, "Global subscriber already installed");
        }

        match self.build_client(&config) {
            Ok(client) => response.data = ProviderData::Configured(Arc::new(client)),
            Err(e) => response.diagnostics.push(
                Diagnostic::error("Failed to configure the Okta client", e.message().to_string()),
            ),
        }
        response
    }

    /// Resolves credentials and builds a client from a configuration with
    /// defaults applied.
    pub fn build_client(&self, config: &ProviderConfig) -> OktaResult<OktaClient> {
        let strategy = resolve(&CredentialInputs::from(config))?;
        self.factory
            .build(strategy, &ConnectionSettings::from_config(config))
    }
}
