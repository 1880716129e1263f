use std::path::PathBuf;

use retail_etl::pipeline;

#[derive(Debug, clap::Parser)]
#[command(version)]
struct Args {
    /// The configuration file to use. Defines the source location and the warehouse
    /// connection. Every setting can also be given through `RETAIL_ETL_CONFIG_*` variables.
    #[arg(long, env = "RETAIL_ETL_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = main_inner().await {
        // Manually print the error so we can control the format.
        let err = error_with_causes(&err);
        eprintln!("Exiting with error: {err}");
        std::process::exit(1);
    }
}

async fn main_inner() -> Result<(), Error> {
    monitoring::logging::init();

    let Args {
        config: config_path,
    } = clap::Parser::parse();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting retail-etl");

    if let Some(path) = &config_path
        && !path.is_file()
    {
        return Err(Error::ConfigNotAFile(path.clone()));
    }

    let config = retail_config::load(config_path.as_deref()).map_err(Error::LoadConfig)?;
    pipeline::run(&config).await.map_err(Error::Pipeline)?;
    Ok(())
}

/// Top-level error type for the `retail-etl` binary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Config path was given but does not point at a file.
    #[error("config path is not a file: {0}")]
    ConfigNotAFile(PathBuf),

    #[error("failed to load config")]
    LoadConfig(#[source] retail_config::LoadConfigError),

    #[error("pipeline run failed")]
    Pipeline(#[source] pipeline::Error),
}

/// Renders `err` followed by its `source()` chain.
fn error_with_causes(err: &dyn std::error::Error) -> String {
    let causes = monitoring::logging::error_source(err);
    if causes.is_empty() {
        err.to_string()
    } else {
        format!("{err} | Caused by: {causes}")
    }
}
