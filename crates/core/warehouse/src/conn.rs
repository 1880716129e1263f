//! Connection pool to the destination warehouse.

use std::time::Duration;

use sqlx::{
    Pool, Postgres,
    postgres::{PgConnectOptions, PgPoolOptions},
};

/// The writer issues its statements one after another on a single connection.
pub const POOL_SIZE: u32 = 1;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds connection options from discrete settings.
///
/// The password is passed as-is, so credentials never need URL encoding.
pub fn connect_options(
    host: &str,
    port: u16,
    username: &str,
    password: &str,
    database: &str,
) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(host)
        .port(port)
        .username(username)
        .password(password)
        .database(database)
}

/// A connection pool to the warehouse DB.
#[derive(Debug, Clone)]
pub struct DbConnPool(Pool<Postgres>);

impl DbConnPool {
    /// Opens the pool and establishes its connection. No retry is attempted.
    #[tracing::instrument(skip_all, err)]
    pub async fn connect(options: PgConnectOptions) -> Result<Self, ConnectError> {
        let host = options.get_host().to_string();
        let port = options.get_port();
        let database = options.get_database().unwrap_or_default().to_string();

        PgPoolOptions::new()
            .max_connections(POOL_SIZE)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await
            .map(Self)
            .map_err(|source| ConnectError {
                host,
                port,
                database,
                source,
            })
    }
}

impl std::ops::Deref for DbConnPool {
    type Target = Pool<Postgres>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Failed to connect to the warehouse: unreachable host, bad credentials or a missing
/// database.
#[derive(Debug, thiserror::Error)]
#[error("failed to connect to warehouse at {host}:{port}/{database}")]
pub struct ConnectError {
    pub host: String,
    pub port: u16,
    pub database: String,
    #[source]
    pub source: sqlx::Error,
}
