//! Integration tests for cassette recording and playback.

#[cfg(test)]
mod vcr_tests {
    use integrations_okta::vcr::{
        Cassette, TestOutcome, VcrHarness, VcrManager, VcrMode, VcrSession, CASSETTE_ENV, MODE_ENV,
    };
    use integrations_okta::{ClientFactory, OktaErrorKind, OktaResult, Provider, ProviderConfig};
    use serde_json::{json, Value};
    use serial_test::serial;
    use std::path::Path;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_NAME: &str = "TestAccGroup_crud";

    const GROUP_CASSETTE: &str = r#"version: 2
interactions:
  - request:
      method: POST
      url: https://classic-00.oktapreview.com/api/v1/groups
      headers:
        Authorization:
          - SSWS REDACTED
        Content-Type:
          - application/json
      body: '{"profile":{"name":"Engineering","description":"Engineers"}}'
    response:
      status: 200
      headers:
        Content-Type:
          - application/json
      body: '{"id":"00g1","profile":{"name":"Engineering"}}'
  - request:
      method: GET
      url: https://classic-00.oktapreview.com/api/v1/groups/00g1
      headers:
        Authorization:
          - SSWS REDACTED
    response:
      status: 200
      headers:
        Content-Type:
          - application/json
      body: '{"id":"00g1","profile":{"name":"Engineering"}}'
"#;

    fn write_cassette(home: &Path, test: &str, cassette: &str, raw: &str) {
        let dir = home.join(test);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{}.yaml", cassette)), raw).unwrap();
    }

    async fn group_scenario(session: VcrSession) -> OktaResult<()> {
        let client = session.client()?;
        // Key order differs from the recording; JSON bodies match structurally.
        let created: Value = client
            .post(
                "/api/v1/groups",
                &json!({"profile": {"name": "Engineering", "description": "Engineers"}}),
            )
            .await?;
        let id = created["id"].as_str().unwrap_or_default().to_string();

        let fetched: Value = session.client()?.get(&format!("/api/v1/groups/{}", id)).await?;
        assert_eq!(fetched["profile"]["name"], "Engineering");
        Ok(())
    }

    #[tokio::test]
    async fn test_replays_every_cassette_of_a_test() {
        let home = tempfile::tempdir().unwrap();
        write_cassette(home.path(), TEST_NAME, "classic-00", GROUP_CASSETTE);
        write_cassette(
            home.path(),
            TEST_NAME,
            "oie-00",
            &GROUP_CASSETTE.replace("classic-00", "oie-00"),
        );

        let harness = VcrHarness::new(
            VcrManager::new(TEST_NAME, VcrMode::Replaying).with_fixtures_home(home.path()),
            ProviderConfig::default(),
        );
        let outcome = harness.run(group_scenario).await.unwrap();

        assert_eq!(
            outcome,
            TestOutcome::Replayed(vec!["classic-00".to_string(), "oie-00".to_string()])
        );
        assert!(harness.cache().is_empty());
    }

    #[tokio::test]
    async fn test_replay_mismatch_fails() {
        let home = tempfile::tempdir().unwrap();
        write_cassette(home.path(), TEST_NAME, "classic-00", GROUP_CASSETTE);

        let harness = VcrHarness::new(
            VcrManager::new(TEST_NAME, VcrMode::Replaying).with_fixtures_home(home.path()),
            ProviderConfig::default(),
        );
        let err = harness
            .run(|session| async move {
                session.client()?.get::<Value>("/api/v1/users/me").await?;
                Ok(())
            })
            .await
            .unwrap_err();

        assert_eq!(*err.kind(), OktaErrorKind::CassetteMatch);
        assert!(harness.cache().is_empty());
    }

    #[tokio::test]
    async fn test_records_live_traffic() {
        let server = MockServer::start().await;
        let host = Url::parse(&server.uri()).unwrap();
        let host = format!("{}:{}", host.host_str().unwrap(), host.port().unwrap());

        Mock::given(method("GET"))
            .and(path("/api/v1/groups/00g1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-rate-limit-remaining", "599")
                    .insert_header("strict-transport-security", "max-age=315360000")
                    .insert_header(
                        "link",
                        format!("<{}/api/v1/groups/00g1>; rel=\"self\"", server.uri()).as_str(),
                    )
                    .set_body_json(json!({
                        "id": "00g1",
                        "_links": {"self": {"href": format!("{}/api/v1/groups/00g1", server.uri())}}
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let home = tempfile::tempdir().unwrap();
        let provider = Provider::new("test")
            .with_factory(ClientFactory::new().with_org_url(Url::parse(&server.uri()).unwrap()))
            .with_env_lookup(|_| None);
        let config = ProviderConfig::builder()
            .org_name("dev-123")
            .api_token("00liveSecret")
            .build();
        let harness = VcrHarness::new(
            VcrManager::new(TEST_NAME, VcrMode::Recording)
                .with_fixtures_home(home.path())
                .with_cassette(Some("classic-00".to_string())),
            config,
        )
        .with_provider(provider);

        let outcome = harness
            .run(|session| async move {
                let group: Value = session.client()?.get("/api/v1/groups/00g1").await?;
                assert_eq!(group["id"], "00g1");
                assert_eq!(session.recorder().map(|r| r.interactions().len()), Some(1));
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(outcome, TestOutcome::Recorded("classic-00".to_string()));

        let path = harness.manager().cassette_path("classic-00");
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains(&host), "{}", raw);
        assert!(!raw.contains("00liveSecret"));
        assert!(!raw.contains("X-Rate-Limit-Remaining"));
        assert!(!raw.contains("Strict-Transport-Security"));

        let cassette = Cassette::load(&path).unwrap();
        let interaction = &cassette.interactions[0];
        assert_eq!(interaction.request.headers["Authorization"], vec!["SSWS REDACTED"]);
        assert_eq!(
            interaction.request.url,
            "http://classic-00.oktapreview.com/api/v1/groups/00g1"
        );
        assert!(interaction.response.headers["Link"][0].contains("classic-00.oktapreview.com"));

        // A second recording of the same cassette is refused before any call.
        let err = harness.run(|_| async { Ok(()) }).await.unwrap_err();
        assert_eq!(*err.kind(), OktaErrorKind::CassetteConflict);
    }

    #[test]
    #[serial]
    fn test_manager_from_environment() {
        std::env::set_var(MODE_ENV, "play");
        std::env::set_var(CASSETTE_ENV, "oie-00");
        let manager = VcrManager::from_env(TEST_NAME).unwrap();
        std::env::remove_var(MODE_ENV);
        std::env::remove_var(CASSETTE_ENV);

        assert_eq!(manager.mode(), VcrMode::Replaying);
        assert_eq!(manager.cassettes(), vec!["oie-00"]);
    }

    #[test]
    #[serial]
    fn test_invalid_mode_from_environment() {
        std::env::set_var(MODE_ENV, "playback");
        let err = VcrHarness::from_env(TEST_NAME, ProviderConfig::default()).unwrap_err();
        std::env::remove_var(MODE_ENV);

        assert_eq!(*err.kind(), OktaErrorKind::InvalidVcrMode);
    }

    #[test]
    #[serial]
    fn test_unset_mode_is_disabled() {
        std::env::remove_var(MODE_ENV);
        let manager = VcrManager::from_env(TEST_NAME).unwrap();
        assert_eq!(manager.mode(), VcrMode::Disabled);
        assert!(!manager.mode().is_enabled());
    }
}
