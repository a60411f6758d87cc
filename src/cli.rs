//! Minimal `clap`-derived argument struct, in the spirit of `rdme-cli`'s
//! `clap::Parser` usage: a config path override, an instance allow-list,
//! and a verbosity bump.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "rrr")]
#[command(about = "Read Route Record core runtime", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short = 'c', long = "config", value_name = "PATH", default_value = "config.toml")]
    pub config: PathBuf,

    /// Only start the named instances (may be passed multiple times).
    /// An empty allow-list starts every instance in the configuration.
    #[arg(short = 'i', long = "instance", value_name = "NAME")]
    pub instance: Vec<String>,

    /// Raise log verbosity one level per occurrence, overriding the
    /// configured level.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn allows(&self, name: &str) -> bool {
        self.instance.is_empty() || self.instance.iter().any(|allowed| allowed == name)
    }
}
