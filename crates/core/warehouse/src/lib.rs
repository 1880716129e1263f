//! Replaces warehouse tables with the contents of Arrow record batches.
//!
//! A replacement drops the destination table, recreates it from the batch schema and bulk
//! loads the rows with a binary `COPY`. [`Warehouse::write_all`] replaces several tables in
//! one transaction, so a failure leaves every destination as it was.

use arrow::array::RecordBatch;
use arrow_to_postgres::{ArrowToPostgresBinaryEncoder, pg_schema_mapper::PostgresSchema};
use bytes::BytesMut;
use monitoring::logging;

pub mod conn;
pub mod sql;

pub use self::conn::{ConnectError, DbConnPool, connect_options};
use self::sql::ValidateIdentifierError;

/// One destination table and the data that replaces it.
#[derive(Debug, Clone, Copy)]
pub struct TableWrite<'a> {
    pub table: &'a str,
    pub batch: &'a RecordBatch,
}

impl<'a> TableWrite<'a> {
    pub fn new(table: &'a str, batch: &'a RecordBatch) -> Self {
        Self { table, batch }
    }
}

#[derive(Debug, Clone)]
pub struct Warehouse {
    pool: DbConnPool,
    database: String,
}

impl Warehouse {
    /// `database` is only used to label log events.
    pub fn new(pool: DbConnPool, database: impl Into<String>) -> Self {
        Self {
            pool,
            database: database.into(),
        }
    }

    pub fn pool(&self) -> &DbConnPool {
        &self.pool
    }

    /// Replaces one table's schema and contents.
    pub async fn replace_table(&self, table: &str, batch: &RecordBatch) -> Result<(), WriteError> {
        self.write_all(&[TableWrite::new(table, batch)]).await
    }

    /// Replaces every listed table inside a single transaction.
    ///
    /// All names are validated and all batches encoded before the transaction starts.
    pub async fn write_all(&self, tables: &[TableWrite<'_>]) -> Result<(), WriteError> {
        let prepared = prepare_all(tables)?;

        let mut tx = self.pool.begin().await.map_err(WriteError::Begin)?;

        for table in &prepared {
            tracing::info!(
                database = %self.database,
                table = %table.name,
                rows = table.rows,
                "writing table"
            );

            sqlx::query(&table.drop_sql)
                .execute(&mut *tx)
                .await
                .map_err(|source| WriteError::DropTable {
                    table: table.name.clone(),
                    source,
                })?;

            sqlx::query(&table.create_sql)
                .execute(&mut *tx)
                .await
                .map_err(|source| WriteError::CreateTable {
                    table: table.name.clone(),
                    num_columns: table.num_columns,
                    source,
                })?;

            let copy_error = |source: sqlx::Error| WriteError::Copy {
                table: table.name.clone(),
                source,
            };
            let mut copy = tx.copy_in_raw(&table.copy_sql).await.map_err(copy_error)?;
            copy.send(table.payload.as_ref()).await.map_err(copy_error)?;
            let copied = copy.finish().await.map_err(copy_error)?;

            tracing::debug!(table = %table.name, copied, "table_copy_finished");
        }

        tx.commit().await.map_err(|source| {
            tracing::error!(
                error = %source,
                error_source = logging::error_source(&source),
                "warehouse_commit_failed"
            );
            WriteError::Commit(source)
        })?;

        for table in &prepared {
            tracing::info!(
                database = %self.database,
                table = %table.name,
                rows = table.rows,
                "write table successfully"
            );
        }
        Ok(())
    }
}

/// Statements and COPY payload for one table, built before any SQL is issued.
#[derive(Debug)]
struct PreparedTable {
    name: String,
    rows: usize,
    num_columns: usize,
    drop_sql: String,
    create_sql: String,
    copy_sql: String,
    payload: BytesMut,
}

fn prepare_all(tables: &[TableWrite<'_>]) -> Result<Vec<PreparedTable>, WriteError> {
    let mut prepared: Vec<PreparedTable> = Vec::with_capacity(tables.len());
    for write in tables {
        if prepared.iter().any(|p| p.name == write.table) {
            return Err(WriteError::DuplicateTable {
                table: write.table.to_string(),
            });
        }
        prepared.push(prepare(write)?);
    }
    Ok(prepared)
}

fn prepare(write: &TableWrite<'_>) -> Result<PreparedTable, WriteError> {
    let name = write.table;
    sql::validate_identifier(name).map_err(|source| WriteError::InvalidTableName {
        table: name.to_string(),
        source,
    })?;

    let encode_error = |source| WriteError::Encode {
        table: name.to_string(),
        source,
    };
    let encoder =
        ArrowToPostgresBinaryEncoder::try_new(&write.batch.schema()).map_err(encode_error)?;
    let schema: PostgresSchema = encoder.schema();
    let (payload, _finished) = encoder.encode_batch(write.batch).map_err(encode_error)?;

    Ok(PreparedTable {
        name: name.to_string(),
        rows: write.batch.num_rows(),
        num_columns: schema.columns.len(),
        drop_sql: sql::drop_table_if_exists(name),
        create_sql: sql::create_table(name, &schema),
        copy_sql: sql::copy_from_stdin(name),
        payload,
    })
}

/// Errors that occur while replacing warehouse tables.
///
/// Every variant after validation aborts the surrounding transaction, so no table is
/// partially replaced.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("invalid table name '{table}'")]
    InvalidTableName {
        table: String,
        #[source]
        source: ValidateIdentifierError,
    },

    #[error("table '{table}' is listed more than once")]
    DuplicateTable { table: String },

    /// A column type has no PostgreSQL mapping, or a value cannot be encoded.
    #[error("failed to encode rows for table '{table}'")]
    Encode {
        table: String,
        #[source]
        source: arrow_to_postgres::error::Error,
    },

    #[error("failed to begin warehouse transaction")]
    Begin(#[source] sqlx::Error),

    #[error("failed to drop table '{table}'")]
    DropTable {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to create table '{table}' with {num_columns} columns")]
    CreateTable {
        table: String,
        num_columns: usize,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to copy rows into table '{table}'")]
    Copy {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to commit warehouse transaction")]
    Commit(#[source] sqlx::Error),
}
