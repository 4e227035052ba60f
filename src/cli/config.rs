//! HS-014: `hotstack.toml`, holding the sealed connection profile and run settings.
//!
//! ```toml
//! [profile]
//! project = "ci"
//! url = "https://keystone.example.com:5000/v3"
//! v3 = true
//! domain = "Default"
//! user = "jenkins"
//! password = "<output of hotstack seal>"
//! region = "RegionOne"
//!
//! [run]
//! poll_interval_secs = 10
//! timeout_secs = 0
//! max_poll_failures = 3
//! ```

use crate::connection::profile::{ConnectionProfile, ProfileRecord};
use crate::connection::secret::SealingKey;
use crate::error::ConfigError;
use crate::orchestrator::api::StackAction;
use crate::orchestrator::runner::{
    RunOptions, DEFAULT_MAX_POLL_FAILURES, DEFAULT_POLL_INTERVAL_SECS,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub profile: ProfileRecord,
    #[serde(default)]
    pub run: RunSettings,
}

/// Polling behaviour of stack runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RunSettings {
    /// At least one second
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Zero or negative waits indefinitely
    #[serde(default)]
    pub timeout_secs: i64,
    #[serde(default = "default_max_poll_failures")]
    pub max_poll_failures: u32,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_max_poll_failures() -> u32 {
    DEFAULT_MAX_POLL_FAILURES
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            timeout_secs: 0,
            max_poll_failures: DEFAULT_MAX_POLL_FAILURES,
        }
    }
}

impl Config {
    /// Unseal the profile.
    pub fn profile(&self, key: &SealingKey) -> Result<ConnectionProfile, ConfigError> {
        Ok(self.profile.open(key)?)
    }

    pub fn run_options(&self, stack: &str, action: StackAction) -> RunOptions {
        RunOptions::new(stack, action)
            .with_poll_interval_secs(self.run.poll_interval_secs)
            .with_timeout_secs(self.run.timeout_secs)
            .with_max_poll_failures(self.run.max_poll_failures)
    }
}

/// Load and parse a config file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    parse_config(&content).map_err(|message| ConfigError::Parse {
        path: path.display().to_string(),
        message,
    })
}

/// Parse config text.
pub fn parse_config(toml_text: &str) -> Result<Config, String> {
    let config: Config = toml::from_str(toml_text).map_err(|e| e.to_string())?;
    if config.run.poll_interval_secs == 0 {
        return Err("run.poll_interval_secs must be at least 1".to_string());
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::profile::tests::valid_profile;
    use std::time::Duration;

    fn sealed_config(key: &SealingKey, run: &str) -> String {
        let record = ProfileRecord::seal(&valid_profile(), key).unwrap();
        format!(
            concat!(
                "[profile]\nproject = \"{}\"\nurl = \"{}\"\nv3 = true\n",
                "domain = \"{}\"\nuser = \"{}\"\npassword = \"{}\"\nregion = \"{}\"\n{}"
            ),
            record.project,
            record.url,
            record.domain,
            record.user,
            record.password,
            record.region,
            run
        )
    }

    #[test]
    fn test_hs014_defaults() {
        let key = SealingKey::from_passphrase("p");
        let config = parse_config(&sealed_config(&key, "")).unwrap();
        assert_eq!(config.run, RunSettings::default());
        let opts = config.run_options("web", StackAction::Create);
        assert_eq!(opts.poll_interval, Duration::from_secs(10));
        assert_eq!(opts.timeout, None);
        assert_eq!(opts.max_poll_failures, 3);
    }

    #[test]
    fn test_hs014_run_settings() {
        let key = SealingKey::from_passphrase("p");
        let text = sealed_config(&key, "\n[run]\npoll_interval_secs = 2\ntimeout_secs = 600\n");
        let config = parse_config(&text).unwrap();
        let opts = config.run_options("web", StackAction::Delete);
        assert_eq!(opts.poll_interval, Duration::from_secs(2));
        assert_eq!(opts.timeout, Some(Duration::from_secs(600)));
        assert_eq!(opts.max_poll_failures, 3);
        assert_eq!(opts.action, StackAction::Delete);
    }

    #[test]
    fn test_hs014_profile_unsealed() {
        let key = SealingKey::from_passphrase("p");
        let config = parse_config(&sealed_config(&key, "")).unwrap();
        assert_eq!(config.profile(&key).unwrap(), valid_profile());
        assert!(matches!(
            config.profile(&SealingKey::from_passphrase("other")),
            Err(ConfigError::Secret(_))
        ));
    }

    #[test]
    fn test_hs014_unknown_key_rejected() {
        let key = SealingKey::from_passphrase("p");
        let text = sealed_config(&key, "\n[run]\npoll_intervall_secs = 2\n");
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn test_hs014_zero_poll_interval_rejected() {
        let key = SealingKey::from_passphrase("p");
        let text = sealed_config(&key, "\n[run]\npoll_interval_secs = 0\n");
        let err = parse_config(&text).unwrap_err();
        assert!(err.contains("poll_interval_secs"), "{}", err);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hotstack.toml");
        std::fs::write(&path, text).unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_hs014_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_config(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[profile\n").unwrap();
        assert!(matches!(load_config(&bad), Err(ConfigError::Parse { .. })));
    }
}
