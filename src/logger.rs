//! Console/file logging sink modeled on `mqtt-broker::logger::BrokerLogger`:
//! colored level prefixes, UTC timestamps via `time`, and an optional
//! `logs/` file sink split by level.

use std::fs::{self};
use std::io::Write;

use colored::*;
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};
use time::format_description::FormatItem;
use time::OffsetDateTime;

use crate::config::RrrConfig;

const TIMESTAMP_FORMAT_UTC: &[FormatItem] = time::macros::format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
);

pub struct RrrLogger {
    write_file: bool,
    write_console: bool,
}

impl RrrLogger {
    pub fn new(config: &RrrConfig) -> Self {
        return Self {
            write_file: config.should_log_file(),
            write_console: config.should_log_console(),
        };
    }

    pub fn init(self, level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_max_level(level);
        log::set_boxed_logger(Box::new(self))
    }

    fn colorized_level(level: Level) -> String {
        let label = format!("{:<5}", level.to_string());
        match level {
            Level::Error => label.red().to_string(),
            Level::Warn => label.yellow().to_string(),
            Level::Info => label.cyan().to_string(),
            Level::Debug => label.purple().to_string(),
            Level::Trace => label.normal().to_string(),
        }
    }

    fn log_console(&self, record: &Record, colorized_level: &str, timestamp: &str) {
        println!("{colorized_level} - {} - {timestamp};", record.args());
    }

    fn log_file(&self, record: &Record, timestamp: &str) {
        let log_string = format!("{};{};{}\n", record.level(), record.args(), timestamp);
        let path = match record.level() {
            Level::Trace | Level::Debug => "logs/debug.log",
            Level::Error => "logs/error.log",
            Level::Warn | Level::Info => "logs/main.log",
        };

        match fs::OpenOptions::new().append(true).open(path) {
            Ok(mut file) => {
                let _ = file.write_all(log_string.as_bytes());
            }
            Err(err) => {
                eprintln!("could not write log entry to {path}: {err}");
            }
        }
    }
}

impl log::Log for RrrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let timestamp = OffsetDateTime::now_utc()
            .format(TIMESTAMP_FORMAT_UTC)
            .unwrap_or_else(|_| String::from("<unformattable-timestamp>"));
        let colorized_level = Self::colorized_level(record.level());

        if self.write_console {
            self.log_console(record, &colorized_level, &timestamp);
        }
        if self.write_file {
            self.log_file(record, &timestamp);
        }
    }

    fn flush(&self) {}
}
