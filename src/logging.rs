/*!
 * Logging setup for the connector and its transports
 *
 * Events from the bridge itself (`tether`) and from the HTTP transport
 * (`tether_connect`) share one filter. Stderr output is compact; a log file
 * receives flattened JSON lines, including one record per settled `invoke`
 * span carrying the method path, invoker name and elapsed time.
 */

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::ConnectorConfig;
use crate::error::{Result, TetherError};

/// Targets covered by the configured level
pub const LOG_TARGETS: [&str; 2] = ["tether", "tether_connect"];

/// Effective level for a configuration: `verbose` forces DEBUG
pub fn effective_level(config: &ConnectorConfig) -> Level {
    if config.verbose {
        Level::DEBUG
    } else {
        config.log_level.to_tracing_level()
    }
}

/// Filter directives applying `level` to every crate in [`LOG_TARGETS`]
pub fn filter_directives(level: Level) -> String {
    LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level.as_str().to_lowercase()))
        .collect::<Vec<_>>()
        .join(",")
}

/// `RUST_LOG` wins over the configured level
fn build_filter(config: &ConnectorConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directives(effective_level(config))))
        .map_err(|e| TetherError::Config(format!("Invalid log filter: {}", e)))
}

/// Install the global subscriber described by `config`
pub fn init_logging(config: &ConnectorConfig) -> Result<()> {
    let filter = build_filter(config)?;

    match config.log_file {
        Some(ref path) => init_file_logging(path, filter),
        None => {
            init_stderr_logging(filter);
            Ok(())
        }
    }
}

fn init_stderr_logging(filter: EnvFilter) {
    let layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    tracing_subscriber::registry().with(filter).with(layer).init();
}

fn init_file_logging(path: &Path, filter: EnvFilter) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        TetherError::Config(format!("Cannot create log file {}: {}", path.display(), e))
    })?;

    let layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_span_events(FmtSpan::CLOSE)
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(false);

    tracing_subscriber::registry().with(filter).with(layer).init();

    Ok(())
}

/// Route test output through the test harness
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter_directives(Level::DEBUG)));

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer().compact())
            .try_init()
            .ok();
    });
}
