//! Drives one acceptance test through the interception layer.

use super::cache::{CachedClient, CassetteKey, ClientCache};
use super::recorder::{Recorder, Replayer};
use super::redaction::VCR_DOMAIN;
use super::{VcrManager, VcrMode};
use crate::client::{ClientFactory, OktaClient};
use crate::config::ProviderConfig;
use crate::errors::{OktaError, OktaResult};
use crate::observability::TracingHooks;
use crate::provider::Provider;
use crate::resilience::TestTime;
use secrecy::SecretString;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// API token configured for playback. Recordings carry `SSWS REDACTED`, so
/// any value works.
pub const VCR_API_TOKEN: &str = "token";

/// How a test run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    /// Ran against a live org without interception.
    Live,
    /// Ran live and the named cassette was written.
    Recorded(String),
    /// Every listed cassette played back successfully.
    Replayed(Vec<String>),
    /// Not run, with the reason.
    Skipped(String),
}

/// Handle given to a test scenario for obtaining its client.
#[derive(Debug, Clone)]
pub struct VcrSession {
    mode: VcrMode,
    key: Option<CassetteKey>,
    cassette_path: PathBuf,
    provider: Arc<Provider>,
    config: ProviderConfig,
    cache: Arc<ClientCache>,
}

impl VcrSession {
    /// Mode of this run.
    pub fn mode(&self) -> VcrMode {
        self.mode
    }

    /// Cassette being recorded or played.
    pub fn cassette(&self) -> Option<&str> {
        self.key.as_ref().map(|k| k.cassette.as_str())
    }

    /// Configures the provider and returns its client.
    ///
    /// When intercepting, the first call builds the client and installs the
    /// recorder or replayer as its transport; later calls return that same
    /// client. Live runs configure a fresh client on every call.
    pub fn client(&self) -> OktaResult<Arc<OktaClient>> {
        let Some(key) = &self.key else {
            return self.configure();
        };
        self.cache
            .get_or_try_insert_with(key, || self.intercepted(key))
            .map(|entry| entry.client)
    }

    /// Recorder of the current recording, once a client was built.
    pub fn recorder(&self) -> Option<Arc<Recorder>> {
        let key = self.key.as_ref()?;
        self.cache.get(key)?.recorder
    }

    fn configure(&self) -> OktaResult<Arc<OktaClient>> {
        let response = self.provider.configure(self.config.clone());
        response.diagnostics.into_result()?;
        response
            .data
            .client()
            .cloned()
            .ok_or_else(|| OktaError::client_initialization("provider configured without a client"))
    }

    fn intercepted(&self, key: &CassetteKey) -> OktaResult<CachedClient> {
        let client = self.configure()?;
        let recorder = match self.mode {
            VcrMode::Replaying => {
                let replayer = Replayer::load(key.cassette.clone(), &self.cassette_path)?;
                client.reset_transport(Arc::new(replayer));
                None
            }
            VcrMode::Recording => {
                let recorder = Arc::new(Recorder::new(
                    client.transport(),
                    key.cassette.clone(),
                    self.cassette_path.clone(),
                )?);
                client.reset_transport(recorder.clone());
                Some(recorder)
            }
            VcrMode::Disabled => None,
        };
        Ok(CachedClient { client, recorder })
    }
}

/// Runs a scenario live, recording, or once per cassette in playback.
#[derive(Debug)]
pub struct VcrHarness {
    manager: VcrManager,
    config: ProviderConfig,
    provider: Arc<Provider>,
    replay_provider: Arc<Provider>,
    cache: Arc<ClientCache>,
}

impl VcrHarness {
    /// Creates a harness. `config` is used for live and recording runs;
    /// playback substitutes synthetic credentials.
    pub fn new(manager: VcrManager, config: ProviderConfig) -> Self {
        let version = env!("CARGO_PKG_VERSION");
        Self {
            manager,
            config,
            provider: Arc::new(Provider::new(version)),
            replay_provider: Arc::new(
                Provider::new(version)
                    .with_factory(ClientFactory::new().with_time(Arc::new(TestTime::default())))
                    .with_env_lookup(|_| None),
            ),
            cache: Arc::new(ClientCache::new()),
        }
    }

    /// Reads the mode and cassette from the environment.
    pub fn from_env(test_name: impl Into<String>, config: ProviderConfig) -> OktaResult<Self> {
        Ok(Self::new(VcrManager::from_env(test_name)?, config))
    }

    /// Provider used for live and recording runs.
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = Arc::new(provider);
        self
    }

    /// Provider used for playback.
    pub fn with_replay_provider(mut self, provider: Provider) -> Self {
        self.replay_provider = Arc::new(provider);
        self
    }

    /// Shares `cache` with other harnesses.
    pub fn with_cache(mut self, cache: Arc<ClientCache>) -> Self {
        self.cache = cache;
        self
    }

    /// The cassette manager.
    pub fn manager(&self) -> &VcrManager {
        &self.manager
    }

    /// The client cache.
    pub fn cache(&self) -> &Arc<ClientCache> {
        &self.cache
    }

    /// Runs `scenario` according to the mode.
    ///
    /// Playback without cassettes is skipped rather than failed. A recording
    /// is written only when the scenario succeeds. Cache entries are evicted
    /// when the scenario returns, whatever the result.
    pub async fn run<F, Fut>(&self, mut scenario: F) -> OktaResult<TestOutcome>
    where
        F: FnMut(VcrSession) -> Fut,
        Fut: Future<Output = OktaResult<()>>,
    {
        match self.manager.mode() {
            VcrMode::Disabled => {
                TracingHooks::on_vcr_mode(self.manager.test_name(), "disabled", None);
                let session = self.session(
                    VcrMode::Disabled,
                    None,
                    self.provider.clone(),
                    self.config.clone(),
                );
                scenario(session).await?;
                Ok(TestOutcome::Live)
            }
            VcrMode::Replaying => self.replay(&mut scenario).await,
            VcrMode::Recording => self.record(&mut scenario).await,
        }
    }

    async fn replay<F, Fut>(&self, scenario: &mut F) -> OktaResult<TestOutcome>
    where
        F: FnMut(VcrSession) -> Fut,
        Fut: Future<Output = OktaResult<()>>,
    {
        if !self.manager.has_cassettes_to_play() {
            return Ok(TestOutcome::Skipped(format!(
                "{} is missing VCR cassette(s) at {}",
                self.manager.test_name(),
                self.manager.cassettes_path().display()
            )));
        }

        let mut played = Vec::new();
        for cassette in self.manager.cassettes() {
            TracingHooks::on_vcr_mode(self.manager.test_name(), "play", Some(cassette.as_str()));
            let key = self.manager.key_for(&cassette);
            let session = self.session(
                VcrMode::Replaying,
                Some(key.clone()),
                self.replay_provider.clone(),
                self.replay_config(&cassette),
            );

            let result = scenario(session).await;
            self.cache.evict(&key);
            result?;
            played.push(cassette);
        }
        Ok(TestOutcome::Replayed(played))
    }

    async fn record<F, Fut>(&self, scenario: &mut F) -> OktaResult<TestOutcome>
    where
        F: FnMut(VcrSession) -> Fut,
        Fut: Future<Output = OktaResult<()>>,
    {
        let cassette = self.manager.check_record_target()?.to_string();
        TracingHooks::on_vcr_mode(self.manager.test_name(), "record", Some(cassette.as_str()));

        let key = self.manager.key_for(&cassette);
        let session = self.session(
            VcrMode::Recording,
            Some(key.clone()),
            self.provider.clone(),
            self.config.clone(),
        );

        let result = scenario(session).await;
        let entry = self.cache.evict(&key);
        result?;

        match entry.and_then(|e| e.recorder) {
            Some(recorder) => recorder.stop()?,
            None => warn!(
                test = %self.manager.test_name(),
                cassette = %cassette,
                "Scenario never configured a client, no cassette written"
            ),
        }
        Ok(TestOutcome::Recorded(cassette))
    }

    fn session(
        &self,
        mode: VcrMode,
        key: Option<CassetteKey>,
        provider: Arc<Provider>,
        config: ProviderConfig,
    ) -> VcrSession {
        let cassette_path = key
            .as_ref()
            .map(|k| self.manager.cassette_path(&k.cassette))
            .unwrap_or_default();
        VcrSession {
            mode,
            key,
            cassette_path,
            provider,
            config,
            cache: self.cache.clone(),
        }
    }

    /// Recordings address `{cassette}.oktapreview.com`, so playback points the
    /// org there and authenticates with a placeholder API token.
    fn replay_config(&self, cassette: &str) -> ProviderConfig {
        ProviderConfig {
            org_name: Some(cassette.to_string()),
            base_url: Some(VCR_DOMAIN.to_string()),
            api_token: Some(SecretString::new(VCR_API_TOKEN.to_string())),
            access_token: None,
            client_id: None,
            scopes: Default::default(),
            private_key: None,
            private_key_id: None,
            http_proxy: None,
            ..self.config.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OktaErrorKind;
    use crate::transport::{HttpResponse, MockHttpTransport};
    use crate::vcr::Cassette;
    use serde_json::{json, Value};

    fn live_provider(mock: Arc<MockHttpTransport>) -> Provider {
        Provider::new("test")
            .with_factory(ClientFactory::new().with_transport(mock))
            .with_env_lookup(|_| None)
    }

    fn live_config() -> ProviderConfig {
        ProviderConfig::builder()
            .org_name("dev-123")
            .base_url("okta.com")
            .api_token("00liveSecret")
            .build()
    }

    fn me_response() -> HttpResponse {
        HttpResponse::json_body(
            200,
            &json!({
                "id": "00u1",
                "_links": {"self": {"href": "https://dev-123.okta.com/api/v1/users/00u1"}}
            }),
        )
        .with_header("x-rate-limit-remaining", "599")
        .with_header("set-cookie", "sid=abc")
    }

    async fn fetch_me(session: VcrSession) -> OktaResult<()> {
        let client = session.client()?;
        assert!(Arc::ptr_eq(&client, &session.client()?));
        let me: Value = client.get("/api/v1/users/me").await?;
        assert_eq!(me["id"], "00u1");
        Ok(())
    }

    #[tokio::test]
    async fn test_record_then_replay() {
        let home = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockHttpTransport::new());
        mock.queue_response(me_response());

        let recording = VcrHarness::new(
            VcrManager::new("TestAccUser", VcrMode::Recording)
                .with_fixtures_home(home.path())
                .with_cassette(Some("classic-00".to_string())),
            live_config(),
        )
        .with_provider(live_provider(mock.clone()));

        let outcome = recording.run(fetch_me).await.unwrap();
        assert_eq!(outcome, TestOutcome::Recorded("classic-00".to_string()));
        assert_eq!(mock.request_count(), 1);
        assert!(recording.cache().is_empty());

        let path = recording.manager().cassette_path("classic-00");
        let cassette = Cassette::load(&path).unwrap();
        assert_eq!(cassette.len(), 1);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("00liveSecret"));
        assert!(!raw.contains("dev-123.okta.com"));
        assert!(!raw.contains("X-Rate-Limit-Remaining"));

        let playback = VcrHarness::new(
            VcrManager::new("TestAccUser", VcrMode::Replaying).with_fixtures_home(home.path()),
            ProviderConfig::default(),
        );
        let outcome = playback.run(fetch_me).await.unwrap();
        assert_eq!(outcome, TestOutcome::Replayed(vec!["classic-00".to_string()]));
        assert!(playback.cache().is_empty());
    }

    #[tokio::test]
    async fn test_recording_scrubs_oauth_token_exchange() {
        let home = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockHttpTransport::new());
        mock.queue_json(
            200,
            json!({
                "token_type": "Bearer",
                "expires_in": 3600,
                "access_token": "LIVE-ACCESS-TOKEN-SECRET",
                "scope": "okta.users.read"
            }),
        );
        mock.queue_response(me_response());

        let config = ProviderConfig::builder()
            .org_name("dev-123")
            .base_url("okta.com")
            .client_id("0oa1client")
            .private_key(include_str!("../../test/fixtures/test_rsa_key.pem"))
            .scopes(["okta.users.read"])
            .build();
        let harness = VcrHarness::new(
            VcrManager::new("TestAccUser", VcrMode::Recording)
                .with_fixtures_home(home.path())
                .with_cassette(Some("classic-00".to_string())),
            config,
        )
        .with_provider(live_provider(mock.clone()));

        let outcome = harness.run(fetch_me).await.unwrap();
        assert_eq!(outcome, TestOutcome::Recorded("classic-00".to_string()));

        let sent = mock.requests();
        assert_eq!(sent.len(), 2);
        let form: Vec<(String, String)> =
            serde_urlencoded::from_str(sent[0].body.as_deref().unwrap()).unwrap();
        let assertion = form
            .iter()
            .find(|(name, _)| name == "client_assertion")
            .map(|(_, value)| value.clone())
            .unwrap();

        let path = harness.manager().cassette_path("classic-00");
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("LIVE-ACCESS-TOKEN-SECRET"), "{}", raw);
        assert!(!raw.contains(&assertion), "{}", raw);

        let cassette = Cassette::load(&path).unwrap();
        assert_eq!(cassette.len(), 2);
        let exchange = &cassette.interactions[0];
        assert!(exchange.request.url.ends_with("/oauth2/v1/token"));
        assert!(exchange.request.body.as_deref().unwrap().contains("client_assertion=REDACTED"));
        assert!(exchange.response.body.contains(r#""access_token":"REDACTED""#));
        assert_eq!(
            cassette.interactions[1].request.headers["Authorization"],
            vec!["Bearer REDACTED"]
        );
    }

    #[tokio::test]
    async fn test_failed_recording_is_not_persisted() {
        let home = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockHttpTransport::new());
        mock.queue_response(me_response());

        let harness = VcrHarness::new(
            VcrManager::new("TestAccUser", VcrMode::Recording)
                .with_fixtures_home(home.path())
                .with_cassette(Some("classic-00".to_string())),
            live_config(),
        )
        .with_provider(live_provider(mock));

        let err = harness
            .run(|session| async move {
                session.client()?.get::<Value>("/api/v1/users/me").await?;
                Err(OktaError::configuration("check failed"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.message(), "check failed");
        assert!(!harness.manager().cassette_path("classic-00").exists());
        assert!(harness.cache().is_empty());
    }

    #[tokio::test]
    async fn test_recording_requires_cassette_name() {
        let home = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockHttpTransport::new());
        let harness = VcrHarness::new(
            VcrManager::new("TestAccUser", VcrMode::Recording).with_fixtures_home(home.path()),
            live_config(),
        )
        .with_provider(live_provider(mock.clone()));

        let err = harness.run(fetch_me).await.unwrap_err();
        assert_eq!(*err.kind(), OktaErrorKind::CassetteConflict);
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_replay_without_cassettes_skips() {
        let home = tempfile::tempdir().unwrap();
        let harness = VcrHarness::new(
            VcrManager::new("TestAccUser", VcrMode::Replaying).with_fixtures_home(home.path()),
            ProviderConfig::default(),
        );
        let outcome = harness
            .run(|_| async { Err(OktaError::configuration("scenario must not run")) })
            .await
            .unwrap();
        assert!(matches!(outcome, TestOutcome::Skipped(reason) if reason.contains("TestAccUser")));
    }

    #[tokio::test]
    async fn test_disabled_runs_live() {
        let mock = Arc::new(MockHttpTransport::new());
        mock.queue_response(me_response());
        let harness =
            VcrHarness::new(VcrManager::new("TestAccUser", VcrMode::Disabled), live_config())
                .with_provider(live_provider(mock.clone()));

        let outcome = harness
            .run(|session| async move {
                assert_eq!(session.mode(), VcrMode::Disabled);
                assert!(session.cassette().is_none());
                let me: Value = session.client()?.get("/api/v1/users/me").await?;
                assert_eq!(me["id"], "00u1");
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(outcome, TestOutcome::Live);
        assert_eq!(mock.request_count(), 1);
    }
}
