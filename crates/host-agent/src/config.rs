//! Agent configuration: an optional YAML file layered under environment variables.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Deserializer};

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("host_id is required. Please set it in config.yaml or env var HOST_ID")]
    MissingHostId,
}

/// Agent settings.
///
/// Keys match the environment variables upper-cased (`listen_port` is
/// `LISTEN_PORT`). `log_file` set to an empty string disables the file log.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default)]
    pub host_id: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_heartbeat_interval", deserialize_with = "deserialize_duration")]
    pub heartbeat_interval: Duration,
    #[serde(default = "default_exec_timeout_ms")]
    pub exec_timeout_ms: u64,
    #[serde(default = "default_log_file")]
    pub log_file: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            host_id: String::new(),
            secret_key: String::new(),
            heartbeat_interval: default_heartbeat_interval(),
            exec_timeout_ms: default_exec_timeout_ms(),
            log_file: default_log_file(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from `path` (or `./config.yaml` when present) and
    /// the environment. Environment variables win over the file.
    ///
    /// # Errors
    /// Returns error if an explicit file is missing or a value fails to parse.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, config::Environment::default())
    }

    // Values stay strings until deserialization so that numeric-looking
    // secrets and host ids keep their exact text.
    fn load_with_env(path: Option<&Path>, env: config::Environment) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path),
            None => config::File::with_name("config").required(false),
        };
        let cfg: Self = config::Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;
        Ok(cfg.normalize())
    }

    /// Reject configurations the agent cannot run with.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingHostId`] if no host id is set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host_id.is_empty() {
            return Err(ConfigError::MissingHostId);
        }
        Ok(())
    }

    /// Deadline for `EXEC_CMD` requests that carry none.
    #[must_use]
    pub const fn exec_timeout(&self) -> Duration {
        Duration::from_millis(self.exec_timeout_ms)
    }

    fn normalize(mut self) -> Self {
        self.host_id = self.host_id.trim().to_string();
        if self.heartbeat_interval.is_zero() {
            self.heartbeat_interval = default_heartbeat_interval();
        }
        if self.listen_port == 0 {
            self.listen_port = default_listen_port();
        }
        if self.exec_timeout_ms == 0 {
            self.exec_timeout_ms = default_exec_timeout_ms();
        }
        self.log_file = self
            .log_file
            .take()
            .filter(|path| !path.as_os_str().is_empty());
        self
    }
}

const fn default_listen_port() -> u16 {
    9090
}

const fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}

const fn default_exec_timeout_ms() -> u64 {
    60_000
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("host-agent.log"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DurationRepr {
    Seconds(u64),
    Text(String),
}

fn deserialize_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    match DurationRepr::deserialize(deserializer)? {
        DurationRepr::Seconds(secs) => Ok(Duration::from_secs(secs)),
        DurationRepr::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

/// Parse `"500ms"`, `"30s"`, `"5m"`, `"1h"` or a bare number of seconds.
///
/// # Errors
/// Returns a description of the problem if `text` is not a duration.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration: {text:?}"))?;
    match unit.trim() {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        other => Err(format!("unknown duration unit {other:?} in {text:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration(" 45 "), Ok(Duration::from_secs(45)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("10d").is_err());
    }

    #[test]
    fn test_defaults() {
        let cfg = AgentConfig::default();
        assert_eq!(cfg.listen_port, 9090);
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(cfg.exec_timeout(), Duration::from_secs(60));
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingHostId)));
    }

    #[test]
    fn test_load_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.yaml");
        std::fs::write(
            &path,
            "listen_port: 7001\nhost_id: host-42\nsecret_key: s3cret\nheartbeat_interval: 5s\nlog_file: \"\"\n",
        )
        .unwrap();

        let cfg = AgentConfig::load_with_env(Some(&path), env(&[])).unwrap();
        assert_eq!(cfg.listen_port, 7001);
        assert_eq!(cfg.host_id, "host-42");
        assert_eq!(cfg.secret_key, "s3cret");
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(cfg.log_file, None);
        assert!(cfg.validate().is_ok());
    }

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let vars = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        config::Environment::default().source(Some(vars))
    }

    #[test]
    fn test_env_values_keep_their_text() {
        let cfg = AgentConfig::load_with_env(
            None,
            env(&[
                ("SECRET_KEY", "007123"),
                ("HOST_ID", "0042"),
                ("LISTEN_PORT", "7002"),
                ("HEARTBEAT_INTERVAL", "15"),
                ("EXEC_TIMEOUT_MS", "5000"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.secret_key, "007123");
        assert_eq!(cfg.host_id, "0042");
        assert_eq!(cfg.listen_port, 7002);
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(cfg.exec_timeout_ms, 5000);
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.yaml");
        std::fs::write(&path, "host_id: from-file\nheartbeat_interval: 5s\n").unwrap();

        let cfg = AgentConfig::load_with_env(
            Some(&path),
            env(&[("HOST_ID", "from-env"), ("HEARTBEAT_INTERVAL", "500ms")]),
        )
        .unwrap();
        assert_eq!(cfg.host_id, "from-env");
        assert_eq!(cfg.heartbeat_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(matches!(AgentConfig::load(Some(&path)), Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_zero_values_fall_back_to_defaults() {
        let cfg = AgentConfig {
            listen_port: 0,
            heartbeat_interval: Duration::ZERO,
            exec_timeout_ms: 0,
            log_file: Some(PathBuf::new()),
            ..AgentConfig::default()
        }
        .normalize();
        assert_eq!(cfg.listen_port, 9090);
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(cfg.exec_timeout_ms, 60_000);
        assert_eq!(cfg.log_file, None);
    }
}
