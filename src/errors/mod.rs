//! Error types for the Okta provider core.

use std::fmt;
use thiserror::Error;

/// Result type alias for Okta operations.
pub type OktaResult<T> = Result<T, OktaError>;

/// Error kinds for categorizing Okta errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OktaErrorKind {
    // Configuration errors
    /// Invalid or conflicting provider configuration.
    Configuration,
    /// Client could not be constructed (bad URL, bad proxy, no credentials).
    ClientInitialization,

    // Authentication errors
    /// Token exchange or client assertion signing failed.
    Authentication,

    // Request errors
    /// Upstream kept failing past the retry budget.
    RetryExhausted,
    /// Upstream rejected the request with 429.
    RateLimited,
    /// Non-success HTTP status.
    Http,
    /// Connection failure or timeout.
    Transport,
    /// Failed to (de)serialize a payload.
    Serialization,

    // Record/replay errors
    /// No recorded interaction matched the outgoing request.
    CassetteMatch,
    /// Cassette write without a name, or over an existing file.
    CassetteConflict,
    /// Cassette could not be read or written.
    CassetteIo,
    /// Unknown value for the VCR mode switch.
    InvalidVcrMode,
}

impl fmt::Display for OktaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration_error"),
            Self::ClientInitialization => write!(f, "client_initialization_error"),
            Self::Authentication => write!(f, "authentication_error"),
            Self::RetryExhausted => write!(f, "retry_exhausted"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Http => write!(f, "http_error"),
            Self::Transport => write!(f, "transport_error"),
            Self::Serialization => write!(f, "serialization_error"),
            Self::CassetteMatch => write!(f, "cassette_match_error"),
            Self::CassetteConflict => write!(f, "cassette_conflict_error"),
            Self::CassetteIo => write!(f, "cassette_io_error"),
            Self::InvalidVcrMode => write!(f, "invalid_vcr_mode"),
        }
    }
}

/// Okta error with detailed information.
#[derive(Error, Debug)]
pub struct OktaError {
    kind: OktaErrorKind,
    message: String,
    status_code: Option<u16>,
    /// Okta request id (`X-Okta-Request-Id`).
    request_id: Option<String>,
    /// Seconds until the rate limit window resets, when known.
    reset_in: Option<u64>,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for OktaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(code) = self.status_code {
            write!(f, " (HTTP {})", code)?;
        }
        if let Some(ref id) = self.request_id {
            write!(f, " [request_id: {}]", id)?;
        }
        Ok(())
    }
}

impl OktaError {
    /// Creates a new Okta error.
    pub fn new(kind: OktaErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            request_id: None,
            reset_in: None,
            cause: None,
        }
    }

    /// Sets the HTTP status code.
    pub fn with_status(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Sets the Okta request id.
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Sets the number of seconds until the rate limit window resets.
    pub fn with_reset_in(mut self, seconds: u64) -> Self {
        self.reset_in = Some(seconds);
        self
    }

    /// Sets the underlying cause.
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Gets the error kind.
    pub fn kind(&self) -> &OktaErrorKind {
        &self.kind
    }

    /// Gets the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Gets the HTTP status code.
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// Gets the request id.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Seconds until the rate limit window resets.
    pub fn reset_in(&self) -> Option<u64> {
        self.reset_in
    }

    /// Returns true if this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            OktaErrorKind::RateLimited | OktaErrorKind::Transport => true,
            OktaErrorKind::Http => matches!(self.status_code, Some(500 | 502 | 503 | 504)),
            _ => false,
        }
    }

    /// Maps a non-success HTTP status to an error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = if status == 429 {
            OktaErrorKind::RateLimited
        } else {
            OktaErrorKind::Http
        };
        Self::new(kind, message).with_status(status)
    }

    // Convenience constructors

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(OktaErrorKind::Configuration, message)
    }

    /// Creates a client initialization error.
    pub fn client_initialization(message: impl Into<String>) -> Self {
        Self::new(OktaErrorKind::ClientInitialization, message)
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(OktaErrorKind::Authentication, message)
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(OktaErrorKind::Transport, message)
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(OktaErrorKind::Serialization, message)
    }

    /// Creates a retry exhausted error wrapping the last failure.
    pub fn retry_exhausted(attempts: u32, last: OktaError) -> Self {
        let status = last.status_code;
        let mut error = Self::new(
            OktaErrorKind::RetryExhausted,
            format!("giving up after {} attempts: {}", attempts, last),
        );
        error.status_code = status;
        error.with_cause(last)
    }

    /// Creates a cassette match error.
    pub fn cassette_match(message: impl Into<String>) -> Self {
        Self::new(OktaErrorKind::CassetteMatch, message)
    }

    /// Creates a cassette conflict error.
    pub fn cassette_conflict(message: impl Into<String>) -> Self {
        Self::new(OktaErrorKind::CassetteConflict, message)
    }

    /// Creates a cassette I/O error.
    pub fn cassette_io(message: impl Into<String>) -> Self {
        Self::new(OktaErrorKind::CassetteIo, message)
    }
}

/// Severity of a configuration diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Blocks configuration.
    Error,
    /// Reported but not blocking.
    Warning,
}

/// A user-facing configuration diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// One-line summary.
    pub summary: String,
    /// Detailed explanation.
    pub detail: String,
    /// Attribute the diagnostic points at, if any.
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// Creates an error diagnostic.
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    /// Creates a warning diagnostic.
    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    /// Points the diagnostic at an attribute.
    pub fn at(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attribute {
            Some(attr) => write!(f, "{} ({}): {}", self.summary, attr, self.detail),
            None => write!(f, "{}: {}", self.summary, self.detail),
        }
    }
}

/// Ordered collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    /// Appends all diagnostics from another collection.
    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    /// Returns true if any diagnostic is an error.
    pub fn has_error(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    /// Iterates over the diagnostics.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    /// Number of diagnostics.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no diagnostics.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts error diagnostics into a configuration error.
    pub fn into_result(self) -> OktaResult<()> {
        if !self.has_error() {
            return Ok(());
        }
        let message = self
            .0
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(OktaError::configuration(message))
    }
}

impl From<OktaError> for Diagnostics {
    fn from(error: OktaError) -> Self {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::error(error.kind().to_string(), error.message().to_string()));
        diags
    }
}
