//! Provider attribute schema and configuration-time validators.

use crate::config::ProviderConfig;
use crate::errors::{Diagnostic, Diagnostics};

/// Attribute value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    /// String.
    String,
    /// Boolean.
    Bool,
    /// 64-bit integer.
    Int64,
    /// Set of strings.
    StringSet,
}

/// A configured attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// Not set.
    Null,
    /// String value.
    String(String),
    /// Set, but sensitive; the value is not exposed.
    Sensitive,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// String set.
    Set(Vec<String>),
}

impl AttributeValue {
    /// Returns true if the attribute is unset.
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

/// Configuration-time check attached to an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validator {
    /// Must not be set together with any of these attributes.
    ConflictsWith(&'static [&'static str]),
    /// Integer lower bound, inclusive.
    AtLeast(i64),
    /// Integer upper bound, inclusive.
    AtMost(i64),
}

/// One provider attribute.
#[derive(Debug, Clone, Copy)]
pub struct Attribute {
    /// Attribute name.
    pub name: &'static str,
    /// Value type.
    pub kind: AttributeType,
    /// User-facing description.
    pub description: &'static str,
    /// Value must never be logged or shown.
    pub sensitive: bool,
    /// Validators.
    pub validators: &'static [Validator],
}

const fn attr(
    name: &'static str,
    kind: AttributeType,
    description: &'static str,
    validators: &'static [Validator],
) -> Attribute {
    Attribute {
        name,
        kind,
        description,
        sensitive: false,
        validators,
    }
}

const fn secret(
    name: &'static str,
    description: &'static str,
    validators: &'static [Validator],
) -> Attribute {
    Attribute {
        name,
        kind: AttributeType::String,
        description,
        sensitive: true,
        validators,
    }
}

use AttributeType::{Bool, Int64, String as Str, StringSet};
use Validator::{AtLeast, AtMost, ConflictsWith};

/// All provider attributes. Every one is optional.
pub static ATTRIBUTES: &[Attribute] = &[
    attr("org_name", Str, "The organization to manage in Okta.", &[]),
    secret(
        "access_token",
        "Bearer token granting privileges to Okta API.",
        &[ConflictsWith(&["api_token", "client_id", "scopes", "private_key"])],
    ),
    secret(
        "api_token",
        "API Token granting privileges to Okta API.",
        &[ConflictsWith(&["access_token", "client_id", "scopes", "private_key"])],
    ),
    attr(
        "client_id",
        Str,
        "OAuth client id of the API service application.",
        &[ConflictsWith(&["access_token", "api_token"])],
    ),
    attr(
        "scopes",
        StringSet,
        "OAuth scopes requested for the API service application.",
        &[ConflictsWith(&["access_token", "api_token"])],
    ),
    secret(
        "private_key",
        "PEM private key of the API service application.",
        &[ConflictsWith(&["access_token", "api_token"])],
    ),
    attr(
        "private_key_id",
        Str,
        "Key id (kid) of the API service application's private key.",
        &[ConflictsWith(&["api_token"])],
    ),
    attr(
        "base_url",
        Str,
        "The Okta url. (Use 'oktapreview.com' for Okta testing)",
        &[],
    ),
    attr(
        "http_proxy",
        Str,
        "Alternate HTTP proxy of scheme://hostname or scheme://hostname:port format",
        &[],
    ),
    attr(
        "backoff",
        Bool,
        "Use exponential back off strategy for rate limits.",
        &[],
    ),
    attr(
        "min_wait_seconds",
        Int64,
        "Minimum seconds to wait when rate limit is hit.",
        &[],
    ),
    attr(
        "max_wait_seconds",
        Int64,
        "Maximum seconds to wait when rate limit is hit.",
        &[],
    ),
    attr(
        "max_retries",
        Int64,
        "Maximum number of retries to attempt before erroring out.",
        &[AtMost(100)],
    ),
    attr(
        "parallelism",
        Int64,
        "Number of concurrent requests to make within a resource where bulk operations are not \
         possible.",
        &[],
    ),
    attr(
        "log_level",
        Int64,
        "Provider log level. Minimum is 1 (TRACE), and maximum is 5 (ERROR).",
        &[AtLeast(1), AtMost(5)],
    ),
    attr(
        "max_api_capacity",
        Int64,
        "Percentage of the rate limit the provider may use, between 1 and 100.",
        &[AtLeast(1), AtMost(100)],
    ),
    attr(
        "request_timeout",
        Int64,
        "Timeout in seconds for a single request; 0 means no limit, at most 300.",
        &[AtLeast(0), AtMost(300)],
    ),
];

/// Looks up an attribute by name.
pub fn attribute(name: &str) -> Option<&'static Attribute> {
    ATTRIBUTES.iter().find(|a| a.name == name)
}

/// Runs every attribute's validators against `config`.
pub fn validate(config: &ProviderConfig) -> Diagnostics {
    let mut diags = Diagnostics::new();

    for attribute in ATTRIBUTES {
        let value = config.attribute(attribute.name);
        if value.is_null() {
            continue;
        }

        for validator in attribute.validators {
            match (*validator, &value) {
                (ConflictsWith(others), _) => {
                    for other in others.iter().filter(|o| !config.attribute(o).is_null()) {
                        diags.push(
                            Diagnostic::error(
                                "Invalid Attribute Combination",
                                format!(
                                    "Attribute \"{}\" cannot be specified when \"{}\" is specified",
                                    other, attribute.name
                                ),
                            )
                            .at(attribute.name),
                        );
                    }
                }
                (AtLeast(min), AttributeValue::Int(v)) if *v < min => {
                    diags.push(
                        Diagnostic::error(
                            "Invalid Attribute Value",
                            format!(
                                "Attribute {} value must be at least {}, got: {}",
                                attribute.name, min, v
                            ),
                        )
                        .at(attribute.name),
                    );
                }
                (AtMost(max), AttributeValue::Int(v)) if *v > max => {
                    diags.push(
                        Diagnostic::error(
                            "Invalid Attribute Value",
                            format!(
                                "Attribute {} value must be at most {}, got: {}",
                                attribute.name, max, v
                            ),
                        )
                        .at(attribute.name),
                    );
                }
                _ => {}
            }
        }
    }

    diags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_config_attribute_is_in_schema() {
        assert_eq!(ATTRIBUTES.len(), 17);
        for name in ["org_name", "scopes", "private_key_id", "request_timeout"] {
            assert!(attribute(name).is_some(), "{}", name);
        }
        assert!(attribute("api_token").unwrap().sensitive);
        assert!(!attribute("client_id").unwrap().sensitive);
    }

    #[test]
    fn test_conflicting_attributes_reference_known_names() {
        for attribute in ATTRIBUTES {
            for validator in attribute.validators {
                if let ConflictsWith(others) = validator {
                    for other in *others {
                        assert!(super::attribute(other).is_some(), "{}", other);
                    }
                }
            }
        }
    }

    #[test]
    fn test_range_validators() {
        let config = ProviderConfig::builder()
            .log_level(0)
            .max_api_capacity(101)
            .request_timeout(301)
            .max_retries(101)
            .build();
        let diags = validate(&config);
        let attributes: Vec<_> = diags.iter().filter_map(|d| d.attribute.clone()).collect();
        assert_eq!(
            attributes,
            vec!["max_retries", "log_level", "max_api_capacity", "request_timeout"]
        );
    }

    #[test]
    fn test_in_range_values_pass() {
        let config = ProviderConfig::builder()
            .log_level(3)
            .max_api_capacity(50)
            .request_timeout(0)
            .max_retries(100)
            .build();
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn test_conflict_reported_on_both_sides() {
        let config = ProviderConfig::builder()
            .access_token("a")
            .api_token("b")
            .build();
        let diags = validate(&config);
        assert_eq!(diags.len(), 2);
        assert!(diags.has_error());
    }
}
