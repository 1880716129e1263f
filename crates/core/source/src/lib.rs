//! Reads the three raw pipeline tables from an object store.
//!
//! The store is rooted at the configured source location (a local directory or an S3 prefix),
//! so every table is addressed by a key relative to that root.

use std::{io::Cursor, sync::Arc};

use arrow::{
    array::RecordBatch,
    compute::concat_batches,
    csv::{ReaderBuilder, reader::Format},
    error::ArrowError,
};
use object_store::{ObjectStore, path::Path};
use retail_object_store::ext::{GetObjectError, ObjectStoreExt as _};

/// Object keys of the three source tables, relative to the store root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceKeys {
    pub transactions: String,
    pub catalog: String,
    pub customers: String,
}

/// The raw tables of one pipeline run, in the fixed order transactions, catalog, customers.
#[derive(Debug, Clone)]
pub struct SourceTables {
    pub transactions: RecordBatch,
    pub catalog: RecordBatch,
    pub customers: RecordBatch,
}

pub struct SourceReader {
    store: Arc<dyn ObjectStore>,
    keys: SourceKeys,
}

impl SourceReader {
    pub fn new(store: Arc<dyn ObjectStore>, keys: SourceKeys) -> Self {
        Self { store, keys }
    }

    /// Reads all three tables. The first failure aborts the read.
    pub async fn read_all(&self) -> Result<SourceTables, ReadError> {
        let transactions = self.read(&self.keys.transactions).await?;
        let catalog = self.read(&self.keys.catalog).await?;
        let customers = self.read(&self.keys.customers).await?;

        Ok(SourceTables {
            transactions,
            catalog,
            customers,
        })
    }

    /// Fetches one object, decodes it as UTF-8 and parses it as CSV.
    pub async fn read(&self, key: &str) -> Result<RecordBatch, ReadError> {
        let text = self
            .store
            .get_text(Path::from(key))
            .await
            .map_err(|err| ReadError::from_get(key, err))?;

        let batch = parse_csv(&text).map_err(|source| ReadError::Csv {
            key: key.to_string(),
            source,
        })?;

        tracing::debug!(key, rows = batch.num_rows(), columns = batch.num_columns(), "source_read");
        Ok(batch)
    }
}

/// Parses comma separated text with a header row into a single batch.
///
/// Column types are inferred from every row. Columns with no values at all are typed `Null`.
pub fn parse_csv(text: &str) -> Result<RecordBatch, ArrowError> {
    let format = Format::default().with_header(true).with_delimiter(b',');
    let (schema, _) = format.infer_schema(Cursor::new(text.as_bytes()), None)?;
    let schema = Arc::new(schema);

    let reader = ReaderBuilder::new(schema.clone())
        .with_format(format)
        .build(Cursor::new(text.as_bytes()))?;
    let batches = reader.collect::<Result<Vec<_>, _>>()?;

    concat_batches(&schema, &batches)
}

/// Errors that occur while reading a source table.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The object does not exist under the source location.
    #[error("source '{key}' not found")]
    NotFound {
        key: String,
        #[source]
        source: GetObjectError,
    },

    /// The store could not be reached or refused the request.
    #[error("failed to fetch source '{key}'")]
    Fetch {
        key: String,
        #[source]
        source: GetObjectError,
    },

    #[error("source '{key}' is not valid UTF-8")]
    NotUtf8 {
        key: String,
        #[source]
        source: GetObjectError,
    },

    /// The contents are not well-formed CSV, e.g. rows with differing field counts.
    #[error("failed to parse source '{key}' as CSV")]
    Csv {
        key: String,
        #[source]
        source: ArrowError,
    },
}

impl ReadError {
    fn from_get(key: &str, err: GetObjectError) -> Self {
        let key = key.to_string();
        match err {
            err @ GetObjectError::NotFound { .. } => ReadError::NotFound { key, source: err },
            err @ GetObjectError::NotUtf8 { .. } => ReadError::NotUtf8 { key, source: err },
            err => ReadError::Fetch { key, source: err },
        }
    }
}
