//! # Okta Provider Core
//!
//! Configuration and client bootstrap for the `okta` Terraform provider:
//! - Provider attribute schema with conflict and range validation
//! - Credential resolution (API token, bearer token, OAuth private key JWT)
//! - Rate-limit aware client with exponential backoff and capacity governor
//! - Record/replay of API traffic for acceptance tests
//! - Structured logging driven by the provider `log_level`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integrations_okta::{Provider, ProviderConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProviderConfig::builder()
//!         .org_name("dev-123456")
//!         .api_token("00xxxxxxxxxxxxxxxx")
//!         .build();
//!
//!     let response = Provider::new("0.1.0").configure(config);
//!     response.diagnostics.into_result()?;
//!
//!     let client = response.data.require_client("example")?;
//!     let me: serde_json::Value = client.get("/api/v1/users/me").await?;
//!     println!("{}", me["profile"]["login"]);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;

// Credentials
pub mod auth;

// HTTP client and transport
pub mod client;
pub mod transport;

// Provider surface
pub mod provider;

// Resilience patterns
pub mod resilience;

// Observability
pub mod observability;

// Record/replay for acceptance tests
pub mod vcr;

// Re-exports for convenience
pub use auth::{AuthManager, AuthStrategy};
pub use client::{ClientFactory, ConnectionSettings, OktaClient};
pub use config::{ProviderConfig, ProviderConfigBuilder};
pub use errors::{Diagnostic, Diagnostics, OktaError, OktaErrorKind, OktaResult};
pub use provider::{Provider, ProviderData};
pub use resilience::RetryPolicy;
pub use transport::{HttpTransport, ReqwestTransport};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("okta-terraform-provider-core/", env!("CARGO_PKG_VERSION"));
