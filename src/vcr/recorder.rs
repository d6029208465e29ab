//! Recording and playback transports.

use super::cassette::{Cassette, Interaction};
use super::{matcher, redaction};
use crate::errors::{OktaError, OktaResult};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Transport that forwards to a real transport and captures every exchange.
pub struct Recorder {
    inner: Arc<dyn HttpTransport>,
    cassette_name: String,
    path: PathBuf,
    cassette: Mutex<Cassette>,
}

impl Recorder {
    /// Creates a recorder writing to `path`. Fails if the cassette already
    /// exists.
    pub fn new(
        inner: Arc<dyn HttpTransport>,
        cassette_name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> OktaResult<Self> {
        let path = path.into();
        ensure_absent(&path)?;
        Ok(Self {
            inner,
            cassette_name: cassette_name.into(),
            path,
            cassette: Mutex::new(Cassette::new()),
        })
    }

    /// Cassette file this recorder writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Interactions captured so far, already redacted.
    pub fn interactions(&self) -> Vec<Interaction> {
        self.cassette.lock().interactions.clone()
    }

    /// Persists the captured interactions.
    pub fn stop(&self) -> OktaResult<()> {
        ensure_absent(&self.path)?;
        let cassette = self.cassette.lock().clone();
        cassette.save(&self.path)?;
        info!(
            cassette = %self.cassette_name,
            interactions = cassette.len(),
            path = %self.path.display(),
            "Cassette recorded"
        );
        Ok(())
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("cassette", &self.cassette_name)
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl HttpTransport for Recorder {
    async fn send(&self, request: HttpRequest) -> OktaResult<HttpResponse> {
        let captured = request.clone();
        let response = self.inner.send(request).await?;

        let mut interaction = Interaction::capture(&captured, &response);
        redaction::redact(&mut interaction, &self.cassette_name);
        self.cassette.lock().push(interaction);

        Ok(response)
    }
}

fn ensure_absent(path: &Path) -> OktaResult<()> {
    if path.exists() {
        return Err(OktaError::cassette_conflict(format!(
            "cassette {} already exists, delete it before recording",
            path.display()
        )));
    }
    Ok(())
}

/// Transport answering from a cassette. Never touches the network.
pub struct Replayer {
    cassette_name: String,
    interactions: Vec<Interaction>,
    consumed: Mutex<Vec<bool>>,
}

impl Replayer {
    /// Plays back `cassette`.
    pub fn new(cassette_name: impl Into<String>, cassette: Cassette) -> Self {
        let consumed = vec![false; cassette.interactions.len()];
        Self {
            cassette_name: cassette_name.into(),
            interactions: cassette.interactions,
            consumed: Mutex::new(consumed),
        }
    }

    /// Loads and plays back the cassette at `path`.
    pub fn load(cassette_name: impl Into<String>, path: &Path) -> OktaResult<Self> {
        Ok(Self::new(cassette_name, Cassette::load(path)?))
    }

    /// Interactions not played yet.
    pub fn remaining(&self) -> usize {
        self.consumed.lock().iter().filter(|c| !**c).count()
    }
}

impl std::fmt::Debug for Replayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replayer")
            .field("cassette", &self.cassette_name)
            .field("interactions", &self.interactions.len())
            .finish()
    }
}

#[async_trait]
impl HttpTransport for Replayer {
    async fn send(&self, request: HttpRequest) -> OktaResult<HttpResponse> {
        let mut consumed = self.consumed.lock();
        let found = self
            .interactions
            .iter()
            .enumerate()
            .find(|(i, interaction)| {
                !consumed[*i] && matcher::matches(&request, &interaction.request)
            });

        match found {
            Some((index, interaction)) => {
                consumed[index] = true;
                debug!(
                    cassette = %self.cassette_name,
                    index,
                    method = %request.method,
                    url = %request.url,
                    "Replaying interaction"
                );
                Ok(interaction.response.to_response())
            }
            None => Err(OktaError::cassette_match(format!(
                "no interaction in cassette {} matches {} {}",
                self.cassette_name, request.method, request.url
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OktaErrorKind;
    use crate::transport::{HttpMethod, MockHttpTransport};
    use serde_json::json;

    const ORG: &str = "https://dev-123.okta.com";

    fn get(path: &str) -> HttpRequest {
        HttpRequest::new(HttpMethod::Get, format!("{}{}", ORG, path))
            .with_header("authorization", "SSWS 00secret")
            .unwrap()
    }

    #[tokio::test]
    async fn test_recorder_captures_redacted_interactions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classic-00.yaml");
        let real = Arc::new(MockHttpTransport::new());
        real.queue_response(
            HttpResponse::json_body(
                200,
                &json!({"id": "00u1", "href": format!("{}/api/v1/users/00u1", ORG)}),
            )
            .with_header("x-rate-limit-remaining", "99"),
        );

        let recorder = Recorder::new(real.clone(), "classic-00", &path).unwrap();
        let response = recorder.send(get("/api/v1/users/me")).await.unwrap();

        // The caller sees the live response untouched.
        assert_eq!(response.header("x-rate-limit-remaining"), Some("99"));
        assert_eq!(real.request_count(), 1);

        let recorded = recorder.interactions();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].request.headers["Authorization"], vec!["SSWS REDACTED"]);
        assert_eq!(recorded[0].request.url, "https://classic-00.oktapreview.com/api/v1/users/me");
        assert!(!recorded[0].response.headers.contains_key("X-Rate-Limit-Remaining"));

        recorder.stop().unwrap();
        assert_eq!(Cassette::load(&path).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_recorder_refuses_existing_cassette() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classic-00.yaml");
        Cassette::new().save(&path).unwrap();

        let err =
            Recorder::new(Arc::new(MockHttpTransport::new()), "classic-00", &path).unwrap_err();
        assert_eq!(*err.kind(), OktaErrorKind::CassetteConflict);
    }

    #[tokio::test]
    async fn test_transport_errors_are_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let real = Arc::new(MockHttpTransport::new());
        real.queue_error(OktaError::transport("connection reset"));

        let recorder = Recorder::new(real, "classic-00", dir.path().join("c.yaml")).unwrap();
        assert!(recorder.send(get("/api/v1/users/me")).await.is_err());
        assert!(recorder.interactions().is_empty());
    }

    fn url(path: &str) -> String {
        format!("https://classic-00.oktapreview.com{}", path)
    }

    fn cassette() -> Cassette {
        let mut cassette = Cassette::new();
        for (path, id) in [
            ("/api/v1/users/me", "first"),
            ("/api/v1/users/me", "second"),
            ("/api/v1/groups", "groups"),
        ] {
            cassette.push(Interaction::capture(
                &HttpRequest::new(HttpMethod::Get, url(path)),
                &HttpResponse::json_body(200, &json!({ "id": id })),
            ));
        }
        cassette
    }

    #[tokio::test]
    async fn test_replay_consumes_in_order() {
        let replayer = Replayer::new("classic-00", cassette());
        let me = || HttpRequest::new(HttpMethod::Get, url("/api/v1/users/me"));

        let groups = replayer
            .send(HttpRequest::new(HttpMethod::Get, url("/api/v1/groups")))
            .await
            .unwrap();
        assert!(groups.body.contains("groups"));

        let first = replayer.send(me()).await.unwrap();
        let second = replayer.send(me()).await.unwrap();
        assert!(first.body.contains("first"));
        assert!(second.body.contains("second"));
        assert_eq!(replayer.remaining(), 0);

        let err = replayer.send(me()).await.unwrap_err();
        assert_eq!(*err.kind(), OktaErrorKind::CassetteMatch);
    }

    #[tokio::test]
    async fn test_replay_unknown_request() {
        let replayer = Replayer::new("classic-00", cassette());
        let err = replayer
            .send(HttpRequest::new(HttpMethod::Delete, url("/api/v1/groups")))
            .await
            .unwrap_err();
        assert_eq!(*err.kind(), OktaErrorKind::CassetteMatch);
        assert!(err.message().contains("DELETE"));
        assert_eq!(replayer.remaining(), 3);
    }
}
