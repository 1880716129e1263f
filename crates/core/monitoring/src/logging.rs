//! A set of utilities to enable logging configuration using tracing_subscriber.

use std::{io::IsTerminal, sync::Once};

use tracing_subscriber::{EnvFilter, filter::LevelFilter};

static RETAIL_ETL_LOG_ENV_VAR: &str = "RETAIL_ETL_LOG";

/// Initializes a tracing subscriber for logging.
pub fn init() {
    // Since we also use this function to enable logging in tests, wrap it in `Once` to prevent
    // multiple initializations.
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let (env_filter, log_level) = env_filter_and_log_level();

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
            .init();

        tracing::info!("log level: {}", log_level);
    });
}

/// Renders the chain of `source()` errors below `err`, outermost first.
///
/// Meant for structured log fields next to `error = %err`, which only shows the top-level
/// message. Returns an empty string when the error has no source.
pub fn error_source(err: &dyn std::error::Error) -> String {
    let mut chain = Vec::new();
    let mut current = err.source();
    while let Some(source) = current {
        chain.push(source.to_string());
        current = source.source();
    }
    chain.join(" -> ")
}

/// List of crates in the workspace.
const WORKSPACE_CRATES: &[&str] = &[
    "arrow_to_postgres",
    "monitoring",
    "retail_config",
    "retail_etl",
    "retail_object_store",
    "retail_source",
    "retail_transform",
    "retail_warehouse",
];

fn env_filter_and_log_level() -> (EnvFilter, String) {
    // Parse directives from RUST_LOG, ignoring the ones that do not parse
    let directive_string = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    let mut env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::ERROR.into())
        .parse_lossy(&directive_string);

    let log_level =
        std::env::var(RETAIL_ETL_LOG_ENV_VAR).unwrap_or_else(|_| "info".to_string());

    for crate_name in WORKSPACE_CRATES {
        // Add directives for each workspace crate, if not overriden by RUST_LOG
        if directive_string.contains(&format!("{crate_name}=")) {
            continue;
        }
        match format!("{crate_name}={log_level}").parse() {
            Ok(directive) => env_filter = env_filter.add_directive(directive),
            Err(err) => eprintln!("ignoring invalid {RETAIL_ETL_LOG_ENV_VAR} value: {err}"),
        }
    }

    (env_filter, log_level)
}
