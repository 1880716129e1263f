//! Pipeline configuration loading.
//!
//! The [`Config`] is assembled with [Figment] from, highest priority first:
//!
//! | Priority | Source |
//! |----------|--------|
//! | 1 (highest) | `RETAIL_ETL_CONFIG_*` env vars, `__` separating nested keys |
//! | 2 | `postgres_username`, `postgres_password`, `postgres_host`, `postgres_port` env vars |
//! | 3 | TOML file (optional) |
//! | 4 (lowest) | serde defaults on the config structs |
//!
//! For example `RETAIL_ETL_CONFIG_WAREHOUSE__HOST` maps to `warehouse.host`.

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format as _, Toml},
};
use serde::Deserialize;

mod de;
mod redacted;

pub use self::redacted::Redacted;

/// Prefix of the environment variables that override any configuration key.
pub const ENV_PREFIX: &str = "RETAIL_ETL_CONFIG_";

/// Default local source directory, relative to the working directory.
pub const DEFAULT_SOURCE_LOCATION: &str = "data_source";
pub const DEFAULT_TRANSACTIONS_KEY: &str = "lf_cafe_data.csv";
pub const DEFAULT_CATALOG_KEY: &str = "product_cat.csv";
pub const DEFAULT_CUSTOMERS_KEY: &str = "customer_data_mockup.csv";

pub const DEFAULT_POSTGRES_PORT: u16 = 5432;
pub const DEFAULT_TRANSACTIONS_TABLE: &str = "lf_data";
pub const DEFAULT_CUSTOMERS_TABLE: &str = "lf_customer";

/// Environment variables read by the original job, mapped onto `warehouse.*` keys.
const LEGACY_POSTGRES_VARS: &[(&str, &str)] = &[
    ("postgres_username", "warehouse.username"),
    ("postgres_password", "warehouse.password"),
    ("postgres_host", "warehouse.host"),
    ("postgres_port", "warehouse.port"),
];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    pub warehouse: WarehouseConfig,
}

/// Where the three raw tables are read from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceConfig {
    /// Local directory path, or an `s3://bucket[/prefix]` URL (default: `data_source`)
    #[serde(default = "default_source_location")]
    pub location: String,
    /// Key of the point-of-sale transactions file, relative to `location`
    #[serde(default = "default_transactions_key")]
    pub transactions: String,
    /// Key of the product catalog file, relative to `location`
    #[serde(default = "default_catalog_key")]
    pub catalog: String,
    /// Key of the customer records file, relative to `location`
    #[serde(default = "default_customers_key")]
    pub customers: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            location: default_source_location(),
            transactions: default_transactions_key(),
            catalog: default_catalog_key(),
            customers: default_customers_key(),
        }
    }
}

/// Destination PostgreSQL database and table names.
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    #[serde(deserialize_with = "de::string")]
    pub username: String,
    #[serde(deserialize_with = "de::redacted_string")]
    pub password: Redacted<String>,
    #[serde(deserialize_with = "de::string")]
    pub host: String,
    /// (default: 5432)
    #[serde(default = "default_postgres_port")]
    pub port: u16,
    /// Database name. Falls back to the username when unset.
    #[serde(default, deserialize_with = "de::optional_string")]
    pub database: Option<String>,
    /// Destination of the enriched transactions (default: `lf_data`)
    #[serde(default = "default_transactions_table")]
    pub transactions_table: String,
    /// Destination of the raw customer records (default: `lf_customer`)
    #[serde(default = "default_customers_table")]
    pub customers_table: String,
}

impl WarehouseConfig {
    pub fn database(&self) -> &str {
        self.database.as_deref().unwrap_or(&self.username)
    }
}

fn default_source_location() -> String {
    DEFAULT_SOURCE_LOCATION.to_string()
}

fn default_transactions_key() -> String {
    DEFAULT_TRANSACTIONS_KEY.to_string()
}

fn default_catalog_key() -> String {
    DEFAULT_CATALOG_KEY.to_string()
}

fn default_customers_key() -> String {
    DEFAULT_CUSTOMERS_KEY.to_string()
}

fn default_postgres_port() -> u16 {
    DEFAULT_POSTGRES_PORT
}

fn default_transactions_table() -> String {
    DEFAULT_TRANSACTIONS_TABLE.to_string()
}

fn default_customers_table() -> String {
    DEFAULT_CUSTOMERS_TABLE.to_string()
}

/// Builds the Figment pipeline described in the module docs.
///
/// A missing `config_path` file is not an error; the TOML layer is then empty.
pub fn figment(config_path: Option<&Path>) -> Figment {
    let mut figment = Figment::new();
    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment
        .merge(legacy_postgres_env())
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Loads the pipeline configuration.
pub fn load(config_path: Option<&Path>) -> Result<Config, LoadConfigError> {
    figment(config_path).extract().map_err(LoadConfigError)
}

fn legacy_postgres_env() -> Env {
    Env::raw().filter_map(|key| {
        let key = key.as_str().to_ascii_lowercase();
        LEGACY_POSTGRES_VARS
            .iter()
            .find(|(var, _)| *var == key)
            .map(|(_, path)| (*path).into())
    })
}

/// Failed to assemble the configuration, e.g. a required warehouse key is missing or a
/// value has the wrong type.
#[derive(Debug, thiserror::Error)]
#[error("failed to load configuration")]
pub struct LoadConfigError(#[source] pub figment::Error);
