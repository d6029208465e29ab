//! Record and replay of Okta API traffic for acceptance tests.
//!
//! `OKTA_VCR_TF_ACC=record` runs a test against a live org and captures every
//! HTTP exchange into `{fixtures_home}/{test}/{cassette}.yaml`, where the
//! cassette is named by `OKTA_VCR_CASSETTE`. `OKTA_VCR_TF_ACC=play` replays
//! all of a test's cassettes (or only the named one) without any network
//! access. With the variable unset tests run live.
//!
//! ```rust,no_run
//! use integrations_okta::config::ProviderConfig;
//! use integrations_okta::vcr::{TestOutcome, VcrHarness};
//!
//! # async fn run() -> integrations_okta::OktaResult<()> {
//! let harness = VcrHarness::from_env("TestAccBrand_read", ProviderConfig::default())?;
//! let outcome = harness
//!     .run(|session| async move {
//!         let client = session.client()?;
//!         let _: serde_json::Value = client.get("/api/v1/brands").await?;
//!         Ok(())
//!     })
//!     .await?;
//! if let TestOutcome::Skipped(reason) = outcome {
//!     eprintln!("skipped: {}", reason);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cassette;
pub mod harness;
pub mod matcher;
pub mod recorder;
pub mod redaction;

pub use cache::{CachedClient, CassetteKey, ClientCache};
pub use cassette::{Cassette, Interaction, RecordedRequest, RecordedResponse, CASSETTE_VERSION};
pub use harness::{TestOutcome, VcrHarness, VcrSession};
pub use recorder::{Recorder, Replayer};

use crate::errors::{OktaError, OktaErrorKind, OktaResult};
use std::fmt;
use std::path::{Path, PathBuf};

/// Selects the mode.
pub const MODE_ENV: &str = "OKTA_VCR_TF_ACC";
/// Names a single cassette.
pub const CASSETTE_ENV: &str = "OKTA_VCR_CASSETTE";
/// Cassette directory, relative to the crate root.
pub const DEFAULT_FIXTURES_HOME: &str = "test/fixtures/vcr";

/// Interception mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VcrMode {
    /// Live traffic, nothing intercepted.
    #[default]
    Disabled,
    /// Live traffic, captured to a cassette.
    Recording,
    /// Answers from cassettes, no network.
    Replaying,
}

impl VcrMode {
    /// Parses the value of `OKTA_VCR_TF_ACC`.
    pub fn parse(value: Option<&str>) -> OktaResult<Self> {
        match value {
            None | Some("") => Ok(VcrMode::Disabled),
            Some("record") => Ok(VcrMode::Recording),
            Some("play") => Ok(VcrMode::Replaying),
            Some(other) => Err(OktaError::new(
                OktaErrorKind::InvalidVcrMode,
                format!(
                    "ENV variable {} value should be \"play\" or \"record\" but was {:?}",
                    MODE_ENV, other
                ),
            )),
        }
    }

    /// The environment value selecting this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            VcrMode::Disabled => "",
            VcrMode::Recording => "record",
            VcrMode::Replaying => "play",
        }
    }

    /// Returns true unless disabled.
    pub fn is_enabled(&self) -> bool {
        *self != VcrMode::Disabled
    }
}

impl fmt::Display for VcrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VcrMode::Disabled => f.write_str("disabled"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Locates a test's cassettes and tracks the one in use.
#[derive(Debug, Clone)]
pub struct VcrManager {
    test_name: String,
    mode: VcrMode,
    fixtures_home: PathBuf,
    current_cassette: Option<String>,
}

impl VcrManager {
    /// Creates a manager with the default fixtures home and no cassette.
    pub fn new(test_name: impl Into<String>, mode: VcrMode) -> Self {
        Self {
            test_name: test_name.into(),
            mode,
            fixtures_home: PathBuf::from(DEFAULT_FIXTURES_HOME),
            current_cassette: None,
        }
    }

    /// Reads mode and cassette from the process environment.
    pub fn from_env(test_name: impl Into<String>) -> OktaResult<Self> {
        Self::from_lookup(test_name, |key| std::env::var(key).ok())
    }

    /// Reads mode and cassette through `lookup`.
    pub fn from_lookup<F>(test_name: impl Into<String>, lookup: F) -> OktaResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode = VcrMode::parse(lookup(MODE_ENV).as_deref())?;
        Ok(Self::new(test_name, mode).with_cassette(lookup(CASSETTE_ENV)))
    }

    /// Looks for cassettes under `home`.
    pub fn with_fixtures_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.fixtures_home = home.into();
        self
    }

    /// Names the cassette to record or the single one to play. Empty names
    /// count as unset.
    pub fn with_cassette(mut self, cassette: Option<String>) -> Self {
        self.current_cassette = cassette.filter(|c| !c.is_empty());
        self
    }

    /// Test name.
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Mode.
    pub fn mode(&self) -> VcrMode {
        self.mode
    }

    /// Fixtures home.
    pub fn fixtures_home(&self) -> &Path {
        &self.fixtures_home
    }

    /// Directory holding this test's cassettes.
    pub fn cassettes_path(&self) -> PathBuf {
        self.fixtures_home.join(&self.test_name)
    }

    /// Cassette file for `cassette`.
    pub fn cassette_path(&self, cassette: &str) -> PathBuf {
        self.cassettes_path().join(format!("{}.yaml", cassette))
    }

    /// Named cassette, if any.
    pub fn current_cassette(&self) -> Option<&str> {
        self.current_cassette.as_deref()
    }

    /// Cache key for `cassette` of this test.
    pub fn key_for(&self, cassette: &str) -> CassetteKey {
        CassetteKey::new(self.test_name.clone(), cassette)
    }

    /// Cassettes to play: the named one, or every cassette file of the
    /// test. Dotfiles are ignored and names are sorted.
    pub fn cassettes(&self) -> Vec<String> {
        if let Some(cassette) = &self.current_cassette {
            return vec![cassette.clone()];
        }

        let Ok(entries) = std::fs::read_dir(self.cassettes_path()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .filter_map(|name| name.split('.').next().map(str::to_string))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Returns true when replaying and at least one cassette file exists.
    pub fn has_cassettes_to_play(&self) -> bool {
        self.mode == VcrMode::Replaying
            && self
                .cassettes()
                .iter()
                .any(|c| self.cassette_path(c).is_file())
    }

    /// Checks that a recording can start: a cassette is named and its file
    /// does not exist yet. Returns the cassette name.
    pub fn check_record_target(&self) -> OktaResult<&str> {
        let cassette = self.current_cassette().ok_or_else(|| {
            OktaError::cassette_conflict(format!(
                "{} is attempting to write a cassette to {} but {} is not set",
                self.test_name,
                self.cassettes_path().display(),
                CASSETTE_ENV
            ))
        })?;

        let path = self.cassette_path(cassette);
        if path.exists() {
            return Err(OktaError::cassette_conflict(format!(
                "{} is attempting to write {}, delete it first before recording",
                self.test_name,
                path.display()
            )));
        }
        Ok(cassette)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use test_case::test_case;

    #[test_case(None, VcrMode::Disabled ; "unset")]
    #[test_case(Some(""), VcrMode::Disabled ; "empty")]
    #[test_case(Some("record"), VcrMode::Recording ; "record")]
    #[test_case(Some("play"), VcrMode::Replaying ; "play")]
    fn test_mode_parse(value: Option<&str>, expected: VcrMode) {
        assert_eq!(VcrMode::parse(value).unwrap(), expected);
    }

    #[test]
    fn test_invalid_mode() {
        let err = VcrMode::parse(Some("replay")).unwrap_err();
        assert_eq!(*err.kind(), OktaErrorKind::InvalidVcrMode);
        assert!(err.message().contains("replay"));
    }

    #[test]
    fn test_from_lookup() {
        let manager = VcrManager::from_lookup("TestAccBrand", |key| match key {
            MODE_ENV => Some("record".to_string()),
            CASSETTE_ENV => Some("classic-00".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(manager.mode(), VcrMode::Recording);
        assert_eq!(manager.current_cassette(), Some("classic-00"));
        assert_eq!(manager.key_for("classic-00").to_string(), "TestAccBrand-classic-00");
        assert_eq!(
            manager.cassette_path("classic-00"),
            PathBuf::from("test/fixtures/vcr/TestAccBrand/classic-00.yaml")
        );
    }

    #[test]
    fn test_cassettes_listing() {
        let home = tempfile::tempdir().unwrap();
        let manager =
            VcrManager::new("TestAccBrand", VcrMode::Replaying).with_fixtures_home(home.path());
        assert!(manager.cassettes().is_empty());
        assert!(!manager.has_cassettes_to_play());

        let dir = manager.cassettes_path();
        fs::create_dir_all(&dir).unwrap();
        for file in ["oie-00.yaml", "classic-00.yaml", ".DS_Store"] {
            fs::write(dir.join(file), "version: 2\n").unwrap();
        }

        assert_eq!(manager.cassettes(), vec!["classic-00", "oie-00"]);
        assert!(manager.has_cassettes_to_play());

        let single = manager.clone().with_cassette(Some("oie-00".to_string()));
        assert_eq!(single.cassettes(), vec!["oie-00"]);
    }

    #[test]
    fn test_record_target_checks() {
        let home = tempfile::tempdir().unwrap();
        let manager =
            VcrManager::new("TestAccBrand", VcrMode::Recording).with_fixtures_home(home.path());

        let err = manager.check_record_target().unwrap_err();
        assert_eq!(*err.kind(), OktaErrorKind::CassetteConflict);

        let manager = manager.with_cassette(Some("classic-00".to_string()));
        assert_eq!(manager.check_record_target().unwrap(), "classic-00");

        fs::create_dir_all(manager.cassettes_path()).unwrap();
        fs::write(manager.cassette_path("classic-00"), "version: 2\n").unwrap();
        let err = manager.check_record_target().unwrap_err();
        assert_eq!(*err.kind(), OktaErrorKind::CassetteConflict);
    }
}
