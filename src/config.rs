//! `config.toml` deserialization, following `mqtt-broker::config::MqttConfig`'s
//! `TryFrom<&Path>` pattern: read the file, parse with `toml`, then run a
//! pass of sanity-check warnings over the result before handing it back.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use log::LevelFilter;
use serde::Deserialize;

use crate::err::{RrrError, RrrErrorKind};

#[derive(Deserialize, Clone)]
pub struct RrrConfig {
    #[serde(default)]
    logger: LoggerConfig,
    #[serde(default)]
    broker: BrokerConfig,
    #[serde(default)]
    instance: Vec<InstanceConfig>,
}

impl RrrConfig {
    pub fn log_level(&self) -> LevelFilter {
        return LevelFilter::from_str(&self.logger.level).unwrap_or_else(|_| {
            log::warn!(
                "Invalid log level '{}' in configuration, defaulting to Info",
                self.logger.level
            );
            LevelFilter::Info
        });
    }

    pub fn should_log_file(&self) -> bool {
        self.logger.file
    }

    pub fn should_log_console(&self) -> bool {
        self.logger.console
    }

    pub fn ratelimit_threshold(&self) -> u32 {
        self.broker.ratelimit_threshold
    }

    pub fn ratelimit_release(&self) -> u32 {
        self.broker.ratelimit_release
    }

    pub fn instances(&self) -> &[InstanceConfig] {
        &self.instance
    }
}

impl TryFrom<&Path> for RrrConfig {
    type Error = RrrError;

    fn try_from(value: &Path) -> Result<Self, RrrError> {
        let mut file = File::open(value).map_err(|err| {
            RrrError::new(
                RrrErrorKind::Config,
                format!("could not open config file {}: {err}", value.display()),
            )
        })?;

        let mut buf = String::new();
        file.read_to_string(&mut buf)?;

        let config: RrrConfig = toml::from_str(&buf)?;

        if config.broker.ratelimit_release >= config.broker.ratelimit_threshold {
            log::warn!(
                "broker.ratelimit_release ({}) is not below broker.ratelimit_threshold ({}); back-pressure will oscillate every read",
                config.broker.ratelimit_release,
                config.broker.ratelimit_threshold
            );
        }

        let mut seen = std::collections::HashSet::new();
        for instance in &config.instance {
            if !seen.insert(instance.name.clone()) {
                log::warn!("duplicate instance name '{}' in configuration", instance.name);
            }
        }

        return Ok(config);
    }
}

#[derive(Deserialize, Clone)]
pub struct LoggerConfig {
    #[serde(default = "default_true")]
    pub console: bool,
    #[serde(default)]
    pub file: bool,
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        return Self {
            console: true,
            file: false,
            level: default_level(),
        };
    }
}

#[derive(Deserialize, Clone)]
pub struct BrokerConfig {
    #[serde(default = "default_ratelimit_threshold")]
    pub ratelimit_threshold: u32,
    #[serde(default = "default_ratelimit_release")]
    pub ratelimit_release: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        return Self {
            ratelimit_threshold: default_ratelimit_threshold(),
            ratelimit_release: default_ratelimit_release(),
        };
    }
}

/// One `[[instance]]` table: name, kind, and the customer it reads from
/// (spec.md §6 instance contract, minus the plugin-specific fields that
/// individual modules like `p_blockdev`/`p_incrementer` would add — those
/// stay out of scope per spec.md §1).
#[derive(Deserialize, Clone)]
pub struct InstanceConfig {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub start_priority: i32,
}

fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

fn default_ratelimit_threshold() -> u32 {
    rrr_broker::RATELIMIT_THRESHOLD
}

fn default_ratelimit_release() -> u32 {
    rrr_broker::RATELIMIT_RELEASE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_minimal_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[logger]
console = true
level = "debug"

[[instance]]
name = "sink"
kind = "deadend"
customer = "sink_in"
"#
        )
        .unwrap();

        let config = RrrConfig::try_from(file.path()).unwrap();
        assert_eq!(config.log_level(), LevelFilter::Debug);
        assert_eq!(config.instances().len(), 1);
        assert_eq!(config.instances()[0].name, "sink");
    }

    #[test]
    fn defaults_ratelimit_when_absent() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        let config = RrrConfig::try_from(file.path()).unwrap();
        assert_eq!(config.ratelimit_threshold(), rrr_broker::RATELIMIT_THRESHOLD);
        assert_eq!(config.ratelimit_release(), rrr_broker::RATELIMIT_RELEASE);
    }
}
