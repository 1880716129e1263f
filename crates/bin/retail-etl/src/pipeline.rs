//! Extract, transform and load, run once in sequence.

use std::sync::Arc;

use arrow::array::RecordBatch;
use object_store::ObjectStore;
use retail_config::Config;
use retail_object_store::url::{StoreUrl, StoreUrlError};
use retail_source::{ReadError, SourceKeys, SourceReader};
use retail_transform::TransformError;
use retail_warehouse::{ConnectError, DbConnPool, TableWrite, Warehouse, WriteError};

/// The two tables a run loads into the warehouse.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub enriched: RecordBatch,
    /// The raw customer table, loaded unchanged.
    pub customers: RecordBatch,
}

/// Runs the whole job against the configured source and warehouse.
pub async fn run(config: &Config) -> Result<(), Error> {
    let location = StoreUrl::new(config.source.location.as_str()).map_err(Error::SourceLocation)?;
    tracing::info!(location = %location, "reading sources");
    let store = retail_object_store::new(&location).map_err(Error::ObjectStore)?;

    let keys = SourceKeys {
        transactions: config.source.transactions.clone(),
        catalog: config.source.catalog.clone(),
        customers: config.source.customers.clone(),
    };
    let output = extract_and_transform(store, keys).await?;

    let warehouse_config = &config.warehouse;
    let options = retail_warehouse::connect_options(
        &warehouse_config.host,
        warehouse_config.port,
        &warehouse_config.username,
        &warehouse_config.password,
        warehouse_config.database(),
    );
    let pool = DbConnPool::connect(options).await.map_err(Error::Connect)?;
    let warehouse = Warehouse::new(pool, warehouse_config.database());

    warehouse
        .write_all(&[
            TableWrite::new(&warehouse_config.transactions_table, &output.enriched),
            TableWrite::new(&warehouse_config.customers_table, &output.customers),
        ])
        .await
        .map_err(Error::Write)?;

    tracing::info!("pipeline finished");
    Ok(())
}

/// Reads the three source tables from `store` and builds the enriched transactions.
pub async fn extract_and_transform(
    store: Arc<dyn ObjectStore>,
    keys: SourceKeys,
) -> Result<PipelineOutput, Error> {
    let reader = SourceReader::new(store, keys);
    let sources = reader.read_all().await.map_err(Error::Read)?;
    tracing::info!(
        transactions = sources.transactions.num_rows(),
        catalog = sources.catalog.num_rows(),
        customers = sources.customers.num_rows(),
        "sources_loaded"
    );

    let enriched = retail_transform::transform(
        &sources.transactions,
        &sources.catalog,
        &sources.customers,
    )
    .await
    .map_err(Error::Transform)?;

    tracing::info!(rows = enriched.num_rows(), "transform_finished");
    for field in enriched.schema().fields() {
        tracing::info!(column = %field.name(), data_type = %field.data_type(), "enriched_column");
    }

    Ok(PipelineOutput {
        enriched,
        customers: sources.customers,
    })
}

/// Errors that abort a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source location is neither a supported URL nor an existing directory.
    #[error("invalid source location")]
    SourceLocation(#[source] StoreUrlError),

    #[error("failed to open the source object store")]
    ObjectStore(#[source] retail_object_store::ObjectStoreCreationError),

    #[error("failed to read source tables")]
    Read(#[source] ReadError),

    #[error("failed to transform source tables")]
    Transform(#[source] TransformError),

    #[error("failed to connect to the warehouse")]
    Connect(#[source] ConnectError),

    /// No table was replaced.
    #[error("failed to write warehouse tables")]
    Write(#[source] WriteError),
}
