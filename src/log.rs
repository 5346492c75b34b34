//! Logging setup for maestro.
//!
//! Log levels:
//! - ERROR: Failures the engine cannot recover from
//! - WARN: Task failures, retries and other recoverable conditions
//! - INFO: Workflow lifecycle (accepted, started, finished), server startup
//! - DEBUG: Batch and dispatch traces, config loading
//! - TRACE: Very detailed traces (HTTP internals)
//!
//! Debug mode can be enabled with `--debug` flag or `MAESTRO_DEBUG=1` env var.
//! `RUST_LOG` overrides both.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{Error, Result};

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

fn env_debug() -> bool {
    std::env::var("MAESTRO_DEBUG")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(debug: bool) -> &'static str {
    if debug {
        "maestro=debug,tower_http=debug,info"
    } else {
        "info"
    }
}

/// Install the global subscriber.
///
/// Logs go to stderr, or to `log_file` (truncated on startup) when given.
pub fn init(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let debug_enabled = debug || env_debug();
    DEBUG_ENABLED.store(debug_enabled, Ordering::SeqCst);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(debug_enabled)));

    let (stderr_layer, file_layer) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?;
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            (None, Some(layer))
        }
        None => (Some(fmt::layer().with_writer(std::io::stderr)), None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {}", e)))
}

/// Check if debug mode is enabled.
pub fn is_debug() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}
