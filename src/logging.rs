//! Logging setup for processes that drive imports.
//!
//! Two independent layers: a console layer on stderr whose level follows
//! `RUST_LOG` or the verbosity flags, and an optional JSON audit file. The
//! audit file keeps every per-record failure (persisters log them at `warn`)
//! and the duration of each partition and persistence span, whatever the
//! console shows.

use std::fs::File;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::{Mutex, Once};

use anyhow::{Context, Result};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

const CRATE_TARGET: &str = "project_import";

/// Filter of the audit file; independent of `RUST_LOG`.
const AUDIT_FILTER: &str = "warn,project_import=info,project_import::persist=debug";

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the log file cannot be created, a filter does not
/// parse, or a global subscriber is already installed.
pub fn init_logging(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(console_filter(verbosity, quiet)))?;
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity > 0)
        .with_thread_names(verbosity > 0)
        .with_ansi(std::io::stderr().is_terminal())
        .with_filter(filter);

    let audit = log_file.map(audit_layer).transpose()?;

    tracing_subscriber::registry()
        .with(audit)
        .with(console)
        .try_init()
        .context("a global tracing subscriber is already installed")
}

fn audit_layer(path: &Path) -> Result<Box<dyn Layer<Registry> + Send + Sync>> {
    let file = File::create(path)
        .with_context(|| format!("cannot create log file {}", path.display()))?;
    let layer = fmt::layer()
        .json()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(EnvFilter::try_new(AUDIT_FILTER)?);
    Ok(layer.boxed())
}

fn console_filter(verbosity: u8, quiet: bool) -> String {
    if quiet {
        return "error".to_string();
    }
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let mut filter = format!("warn,{CRATE_TARGET}={level}");
    if verbosity >= 2 {
        filter.push_str(",rusqlite=debug");
    }
    filter
}

/// Test subscriber writing through the test harness.
pub fn init_test_logging() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("project_import=debug")
            .with_test_writer()
            .with_thread_names(true)
            .try_init()
            .ok();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_wins_over_verbosity() {
        assert_eq!(console_filter(3, true), "error");
    }

    #[test]
    fn verbosity_raises_crate_level_only() {
        assert_eq!(console_filter(0, false), "warn,project_import=info");
        assert_eq!(console_filter(1, false), "warn,project_import=debug");
        assert_eq!(
            console_filter(7, false),
            "warn,project_import=trace,rusqlite=debug"
        );
    }

    #[test]
    fn audit_layer_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("import.log");
        assert!(audit_layer(&path).is_ok());
        assert!(path.is_file());
    }

    #[test]
    fn audit_layer_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = audit_layer(&dir.path().join("missing").join("import.log")).err().unwrap();
        assert!(err.to_string().contains("cannot create log file"));
    }
}
