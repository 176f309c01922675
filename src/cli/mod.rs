//! cli
//!
//! Command-line interface layer for lakeref.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install logging
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap, builds a
//! [`crate::engine::Client`] from the resolved configuration and hands each
//! command to the engine. It never talks to the service directly.

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::core::config::Overrides;
use crate::ui::output::Verbosity;

/// Execution context for commands.
///
/// Contains global settings derived from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Settings that override the config file and environment.
    pub overrides: Overrides,
    /// Print results as JSON.
    pub json: bool,
    pub verbosity: Verbosity,
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.debug);

    let ctx = Context {
        overrides: Overrides {
            uri: cli.uri.clone(),
            page_size: cli.page_size,
            token: None,
        },
        json: cli.json,
        verbosity: Verbosity::from_quiet(cli.quiet),
    };

    commands::dispatch(cli.command, &ctx)
}

/// Send logs to stderr, filtered by `RUST_LOG` (`--debug` forces debug).
fn init_tracing(debug: bool) {
    let default_level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let mut env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    if debug {
        env_filter = env_filter.add_directive(default_level.into());
    }

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter);

    // a subscriber may already be installed when embedded
    let _ = tracing_subscriber::registry().with(stderr_layer).try_init();
}
