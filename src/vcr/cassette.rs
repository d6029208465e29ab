//! Cassette file format.
//!
//! A cassette is a YAML document holding the ordered HTTP interactions of one
//! recorded test run:
//!
//! ```yaml
//! version: 2
//! interactions:
//!   - request:
//!       method: GET
//!       url: https://classic-00.oktapreview.com/api/v1/users/me
//!       headers:
//!         Authorization:
//!           - SSWS REDACTED
//!     response:
//!       status: 200
//!       headers:
//!         Content-Type:
//!           - application/json
//!       body: '{"id":"00u1"}'
//! ```

use crate::errors::{OktaError, OktaResult};
use crate::transport::{HttpRequest, HttpResponse};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Cassette format version written by the recorder.
pub const CASSETTE_VERSION: u32 = 2;

/// Multi-valued headers keyed by canonical header name.
pub type Headers = BTreeMap<String, Vec<String>>;

/// A recorded request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRequest {
    /// Upper-case method.
    pub method: String,
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    #[serde(default)]
    pub headers: Headers,
    /// Request body, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl From<&HttpRequest> for RecordedRequest {
    fn from(request: &HttpRequest) -> Self {
        Self {
            method: request.method.as_str().to_string(),
            url: request.url.clone(),
            headers: headers_from_map(&request.headers),
            body: request.body.clone(),
        }
    }
}

/// A recorded response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    #[serde(default)]
    pub headers: Headers,
    /// Response body.
    #[serde(default)]
    pub body: String,
}

impl RecordedResponse {
    /// Rebuilds the response for playback.
    pub fn to_response(&self) -> HttpResponse {
        HttpResponse {
            status: self.status,
            headers: headers_to_map(&self.headers),
            body: self.body.clone(),
        }
    }
}

impl From<&HttpResponse> for RecordedResponse {
    fn from(response: &HttpResponse) -> Self {
        Self {
            status: response.status,
            headers: headers_from_map(&response.headers),
            body: response.body.clone(),
        }
    }
}

/// One request and the response it received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    /// The request.
    pub request: RecordedRequest,
    /// The response.
    pub response: RecordedResponse,
}

impl Interaction {
    /// Captures a live exchange.
    pub fn capture(request: &HttpRequest, response: &HttpResponse) -> Self {
        Self {
            request: request.into(),
            response: response.into(),
        }
    }
}

/// Ordered interactions of one recorded run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cassette {
    /// Format version.
    pub version: u32,
    /// Interactions, in the order they happened.
    #[serde(default)]
    pub interactions: Vec<Interaction>,
}

impl Default for Cassette {
    fn default() -> Self {
        Self {
            version: CASSETTE_VERSION,
            interactions: Vec::new(),
        }
    }
}

impl Cassette {
    /// Creates an empty cassette.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a cassette file.
    pub fn load(path: &Path) -> OktaResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            OktaError::cassette_io(format!("failed to read cassette {}: {}", path.display(), e))
                .with_cause(e)
        })?;
        serde_yaml::from_str(&raw).map_err(|e| {
            OktaError::cassette_io(format!("failed to parse cassette {}: {}", path.display(), e))
                .with_cause(e)
        })
    }

    /// Writes the cassette, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> OktaResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                OktaError::cassette_io(format!("failed to create {}: {}", parent.display(), e))
                    .with_cause(e)
            })?;
        }
        let raw = serde_yaml::to_string(self).map_err(|e| {
            OktaError::serialization(format!("failed to encode cassette: {}", e)).with_cause(e)
        })?;
        fs::write(path, raw).map_err(|e| {
            OktaError::cassette_io(format!("failed to write cassette {}: {}", path.display(), e))
                .with_cause(e)
        })
    }

    /// Appends an interaction.
    pub fn push(&mut self, interaction: Interaction) {
        self.interactions.push(interaction);
    }

    /// Number of interactions.
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }
}

/// `x-rate-limit-reset` becomes `X-Rate-Limit-Reset`.
pub(crate) fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn headers_from_map(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        headers
            .entry(canonical_header_name(name.as_str()))
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    headers
}

fn headers_to_map(headers: &Headers) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, values) in headers {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            tracing::debug!(header = %name, "Skipping invalid recorded header name");
            continue;
        };
        for value in values {
            if let Ok(value) = HeaderValue::from_str(value) {
                map.append(name.clone(), value);
            }
        }
    }
    map
}
