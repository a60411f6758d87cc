//! First-run bootstrap, mirroring `mqtt-broker::init`: write a default
//! `config.toml` if none exists, and create `logs/` (with one empty file
//! per level sink) when file logging is requested.

use std::fs::{self, File};
use std::path::Path;

use crate::config::RrrConfig;
use crate::err::{RrrError, RrrErrorKind};
use crate::logger::RrrLogger;

const DEFAULT_CONFIG: &str = r#"
[logger]
console = true
file = false
level = "info"

[broker]
ratelimit_threshold = 1000
ratelimit_release = 500
"#;

pub struct RrrEnv {
    config: RrrConfig,
}

impl RrrEnv {
    pub fn load(config_path: &Path) -> Result<Self, RrrError> {
        if !config_path.exists() {
            init_config(config_path)?;
        }

        let config = RrrConfig::try_from(config_path)?;
        return Ok(Self { config });
    }

    pub fn init_logging(&self) -> Result<(), RrrError> {
        let logger = RrrLogger::new(&self.config);
        logger
            .init(self.config.log_level())
            .map_err(|err| RrrError::new(RrrErrorKind::Logger, err.to_string()))?;

        if self.config.should_log_file() {
            init_log_fs()?;
        }

        return Ok(());
    }

    pub fn config(&self) -> &RrrConfig {
        &self.config
    }

    pub fn into_config(self) -> RrrConfig {
        self.config
    }
}

fn init_config(path: &Path) -> Result<(), RrrError> {
    fs::write(path, DEFAULT_CONFIG)?;
    log::info!("Initialized new config file at {}", path.display());
    return Ok(());
}

const FILE_CREATE_ERR: &str = "Could not create log file: ";

fn init_log_fs() -> Result<(), RrrError> {
    let path = Path::new("logs");
    if path.exists() {
        return Ok(());
    }

    fs::create_dir(path)?;
    for name in ["debug.log", "error.log", "main.log"] {
        let file_path = path.join(name);
        if let Err(err) = File::create(&file_path) {
            log::error!("{FILE_CREATE_ERR}{}\n\t{err}", file_path.display());
        }
    }

    log::info!("Initialized log directory.");
    return Ok(());
}
