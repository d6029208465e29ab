//! Logging setup and tracing hooks for provider operations.

use http::HeaderMap;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Trace level (most verbose).
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    Info,
    /// Warning level.
    Warn,
    /// Error level (least verbose).
    Error,
}

impl LogLevel {
    /// Maps the provider `log_level` attribute (1 = TRACE ... 5 = ERROR).
    ///
    /// Values outside the range clamp to the nearest end.
    pub fn from_provider_level(level: i64) -> Self {
        match level {
            i64::MIN..=1 => LogLevel::Trace,
            2 => LogLevel::Debug,
            3 => LogLevel::Info,
            4 => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        LevelFilter::from_level(level.into())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable.
    Pretty,
    /// One JSON object per line.
    Json,
    /// Single line per event.
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level captured.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
    /// Include the module target.
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Error,
            format: LogFormat::Compact,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Creates a logging configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the log level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the log format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets whether to include the module target.
    pub fn with_target(mut self, include: bool) -> Self {
        self.include_target = include;
        self
    }

    /// Builds the filter: `RUST_LOG` directives plus the configured level.
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::from(self.level).into())
            .from_env_lossy()
    }

    /// Installs the global subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber is already installed.
    pub fn init(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let filter = self.filter();

        match self.format {
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().pretty().with_target(self.include_target))
                    .try_init()?;
            }
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json())
                    .try_init()?;
            }
            LogFormat::Compact => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().compact().with_target(self.include_target))
                    .try_init()?;
            }
        }

        Ok(())
    }
}

/// Headers whose values never reach the logs.
pub const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie"];

/// Redacts sensitive header values for logging.
pub fn redact_header(name: &str, value: &str) -> String {
    if SENSITIVE_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
        "[REDACTED]".to_string()
    } else {
        value.to_string()
    }
}

/// Renders `headers` as `name: value` pairs with sensitive values redacted.
pub fn redacted_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            let value = value.to_str().unwrap_or("<binary>");
            format!("{}: {}", name, redact_header(name.as_str(), value))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Tracing hooks for Okta API operations.
pub struct TracingHooks;

impl TracingHooks {
    /// Logs one request attempt.
    pub fn on_request_start(method: &str, url: &str, attempt: u32) {
        debug!(method = %method, url = %url, attempt, "Okta API request started");
    }

    /// Logs the headers of an outgoing request.
    pub fn on_request_headers(method: &str, url: &str, headers: &HeaderMap) {
        trace!(
            method = %method,
            url = %url,
            headers = %redacted_headers(headers),
            "Okta API request headers"
        );
    }

    /// Logs a completed request.
    pub fn on_request_complete(method: &str, url: &str, status: u16, duration: Duration) {
        debug!(
            method = %method,
            url = %url,
            status,
            duration_ms = duration.as_millis() as u64,
            "Okta API request completed"
        );
    }

    /// Logs a failed request.
    pub fn on_request_error(method: &str, url: &str, error: &str) {
        error!(method = %method, url = %url, error = %error, "Okta API request failed");
    }

    /// Logs a retry.
    pub fn on_retry(method: &str, url: &str, attempt: u32, delay: Duration) {
        warn!(
            method = %method,
            url = %url,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Retrying Okta API request"
        );
    }

    /// Logs a request held back by the capacity governor.
    pub fn on_capacity_deferral(bucket: &str, used_percent: u64, delay: Duration) {
        warn!(
            bucket = %bucket,
            used_percent,
            delay_ms = delay.as_millis() as u64,
            "Deferring request until rate limit window resets"
        );
    }

    /// Logs an OAuth access token refresh.
    pub fn on_token_refresh(client_id: &str, expires_in: u64) {
        info!(client_id = %client_id, expires_in, "OAuth access token refreshed");
    }

    /// Logs the record/replay decision for a test.
    pub fn on_vcr_mode(test: &str, mode: &str, cassette: Option<&str>) {
        info!(
            test = %test,
            mode = %mode,
            cassette = cassette.unwrap_or("<all>"),
            "VCR mode selected"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_level_mapping() {
        assert_eq!(LogLevel::from_provider_level(1), LogLevel::Trace);
        assert_eq!(LogLevel::from_provider_level(2), LogLevel::Debug);
        assert_eq!(LogLevel::from_provider_level(3), LogLevel::Info);
        assert_eq!(LogLevel::from_provider_level(4), LogLevel::Warn);
        assert_eq!(LogLevel::from_provider_level(5), LogLevel::Error);
        assert_eq!(LogLevel::from_provider_level(0), LogLevel::Trace);
        assert_eq!(LogLevel::from_provider_level(9), LogLevel::Error);
    }

    #[test]
    fn test_level_filter_conversion() {
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::WARN);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_logging_config_builder_chain() {
        let config = LoggingConfig::new()
            .with_level(LogLevel::Debug)
            .with_format(LogFormat::Json)
            .with_target(false);

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.include_target);
    }

    #[test]
    fn test_redact_header() {
        assert_eq!(redact_header("Authorization", "SSWS 00abc"), "[REDACTED]");
        assert_eq!(redact_header("Accept", "application/json"), "application/json");
    }

    #[test]
    fn test_redacted_headers_hide_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "SSWS 00liveSecret".parse().unwrap());
        headers.insert("cookie", "sid=abc".parse().unwrap());
        headers.insert("accept", "application/json".parse().unwrap());

        let rendered = redacted_headers(&headers);
        assert!(!rendered.contains("00liveSecret"));
        assert!(!rendered.contains("sid=abc"));
        assert!(rendered.contains("authorization: [REDACTED]"));
        assert!(rendered.contains("accept: application/json"));
    }

    #[test]
    fn test_hooks_do_not_panic() {
        TracingHooks::on_request_start("GET", "https://dev-1.okta.com/api/v1/users", 0);
        TracingHooks::on_request_headers("GET", "/api/v1/users", &HeaderMap::new());
        TracingHooks::on_retry("GET", "/api/v1/users", 1, Duration::from_secs(30));
        TracingHooks::on_capacity_deferral("users", 80, Duration::from_secs(12));
        TracingHooks::on_vcr_mode("TestAccOktaUser", "play", None);
    }
}
