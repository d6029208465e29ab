//! Scrubbing of captured interactions before they reach disk.

use super::cassette::{Headers, Interaction};

/// Response headers dropped from recordings.
pub const VOLATILE_RESPONSE_HEADERS: &[&str] = &[
    "duration",
    "Content-Security-Policy",
    "Cache-Control",
    "Expect-Ct",
    "Expires",
    "P3p",
    "Pragma",
    "Public-Key-Pins-Report-Only",
    "Server",
    "Set-Cookie",
    "Strict-Transport-Security",
    "Vary",
];

/// Token endpoint response fields replaced with [`REDACTED`].
pub const TOKEN_RESPONSE_FIELDS: &[&str] = &["access_token", "id_token", "refresh_token"];

/// Token request form fields replaced with [`REDACTED`].
pub const TOKEN_REQUEST_FIELDS: &[&str] = &["client_assertion"];

/// Placeholder written over secrets.
pub const REDACTED: &str = "REDACTED";

/// Domain recordings are rewritten to.
pub const VCR_DOMAIN: &str = "oktapreview.com";

/// Host recorded for `cassette`.
pub fn vcr_host(cassette: &str) -> String {
    format!("{}.{}", cassette, VCR_DOMAIN)
}

/// Redacts `interaction` in place. Running it twice changes nothing further.
pub fn redact(interaction: &mut Interaction, cassette: &str) {
    redact_authorization(&mut interaction.request.headers);
    if is_token_exchange(&interaction.request.url) {
        redact_token_exchange(interaction);
    }

    interaction.response.headers.retain(|name, _| {
        !name.to_ascii_lowercase().starts_with("x-")
            && !VOLATILE_RESPONSE_HEADERS
                .iter()
                .any(|volatile| volatile.eq_ignore_ascii_case(name))
    });

    let Some(org_host) = host_of(&interaction.request.url) else {
        return;
    };
    let replacement = vcr_host(cassette);
    if org_host == replacement {
        return;
    }

    interaction.request.url = interaction.request.url.replace(&org_host, &replacement);
    interaction.response.body = interaction.response.body.replace(&org_host, &replacement);
    for (name, values) in interaction.response.headers.iter_mut() {
        if name.eq_ignore_ascii_case("link") {
            for value in values.iter_mut() {
                *value = value.replace(&org_host, &replacement);
            }
        }
    }
}

fn redact_authorization(headers: &mut Headers) {
    let Some(key) = headers
        .keys()
        .find(|name| name.eq_ignore_ascii_case("authorization"))
        .cloned()
    else {
        return;
    };

    if let Some(values) = headers.get_mut(&key) {
        let scheme = values
            .first()
            .and_then(|v| v.split(' ').next())
            .unwrap_or_default()
            .to_string();
        *values = vec![format!("{} {}", scheme, REDACTED)];
    }
}

fn is_token_exchange(url: &str) -> bool {
    url::Url::parse(url)
        .map(|parsed| parsed.path().ends_with("/v1/token"))
        .unwrap_or(false)
}

/// Scrubs the issued tokens from the response body and the signed client
/// assertion from the form-encoded request body.
fn redact_token_exchange(interaction: &mut Interaction) {
    if let Ok(mut body) = serde_json::from_str::<serde_json::Value>(&interaction.response.body) {
        let mut changed = false;
        if let Some(fields) = body.as_object_mut() {
            for name in TOKEN_RESPONSE_FIELDS {
                if let Some(value) = fields.get_mut(*name) {
                    if value.as_str() != Some(REDACTED) {
                        *value = serde_json::Value::String(REDACTED.to_string());
                        changed = true;
                    }
                }
            }
        }
        if changed {
            if let Ok(redacted) = serde_json::to_string(&body) {
                interaction.response.body = redacted;
            }
        }
    }

    let Some(raw) = interaction.request.body.as_deref() else {
        return;
    };
    let Ok(mut form) = serde_urlencoded::from_str::<Vec<(String, String)>>(raw) else {
        return;
    };
    let mut changed = false;
    for (name, value) in form.iter_mut() {
        if TOKEN_REQUEST_FIELDS.contains(&name.as_str()) && *value != REDACTED {
            *value = REDACTED.to_string();
            changed = true;
        }
    }
    if changed {
        if let Ok(redacted) = serde_urlencoded::to_string(&form) {
            interaction.request.body = Some(redacted);
        }
    }
}

/// Host and port, as it appears in the URL.
fn host_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
