//! Ambient wiring around the `rrr-*` component crates: the instance
//! contract (spec.md §6), configuration, logging, CLI parsing, and
//! first-run bootstrap. The `rrr` binary (`src/main.rs`) reads a
//! `config.toml`, installs the logger, builds the configured instances,
//! and spawns one OS thread per instance running its event loop until a
//! shared stop flag is set (spec.md §5 thread-per-instance model).

pub mod cli;
pub mod config;
pub mod err;
pub mod init;
pub mod instance;
pub mod logger;

pub use config::RrrConfig;
pub use err::{RrrError, RrrErrorKind};
pub use init::RrrEnv;
pub use instance::{Instance, InstanceContext, InstanceKind};
