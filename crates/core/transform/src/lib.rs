//! Enriches point-of-sale transactions with customer attributes, product categories and
//! temporal features.
//!
//! The joins run as a single DataFusion query over in-memory tables. Feature derivation
//! happens afterwards on the collected Arrow arrays.

use std::{collections::HashSet, sync::Arc};

use arrow::{
    array::{Array, ArrayRef, AsArray as _, Int64Array, RecordBatch, StringBuilder},
    compute::{cast, concat_batches},
    datatypes::{DataType, Field, Int64Type, Schema, SchemaRef},
    error::ArrowError,
};
use datafusion::{error::DataFusionError, prelude::SessionContext};

mod dates;
pub mod features;

pub use self::dates::DateValueError;
use self::{
    dates::DateColumn,
    features::{DayLabelError, TimeOfDayError, day_label, time_of_day},
};

pub const MEMBER_ID: &str = "member_id";
pub const SKU_CODE: &str = "sku_code";
pub const BILL_DATE: &str = "bill_date";
pub const BILL_TIME: &str = "bill_time";
pub const CODE: &str = "code";

pub const CAT_CODE: &str = "cat_code";
pub const DAY_NAME: &str = "day_name";
pub const TIME_OF_DAY: &str = "time_of_day";

/// Length of the `sku_code` prefix that identifies the product category.
pub const CATEGORY_CODE_LEN: usize = 4;

const CUSTOMER_SUFFIX: &str = "_customer";
const PRODUCT_SUFFIX: &str = "_product";

const ROW_INDEX: &str = "__row_index";
const JOIN_CODE: &str = "__join_code";
const TRANSACTIONS_ROW: &str = "__transactions_row";
const CUSTOMERS_ROW: &str = "__customers_row";
const CATALOG_ROW: &str = "__catalog_row";

/// Joins the three raw tables and derives `cat_code`, `day_name` and `time_of_day`.
///
/// Every transaction row survives. Unmatched customers or categories give null columns, and
/// duplicate keys on the customer or catalog side fan a transaction out into adjacent rows.
/// Output rows follow the input transaction order.
///
/// Output columns, in order: the transaction columns, the customer columns except
/// `member_id`, `cat_code`, the catalog columns except `code`, `day_name`, `time_of_day`.
pub async fn transform(
    transactions: &RecordBatch,
    catalog: &RecordBatch,
    customers: &RecordBatch,
) -> Result<RecordBatch, TransformError> {
    for column in [MEMBER_ID, SKU_CODE, BILL_DATE, BILL_TIME] {
        require_column(transactions, "transactions", column)?;
    }
    require_column(customers, "customers", MEMBER_ID)?;
    require_column(catalog, "catalog", CODE)?;

    let layout = OutputLayout::new(
        &transactions.schema(),
        &customers.schema(),
        &catalog.schema(),
    );
    let joined = join(transactions, catalog, customers, &layout).await?;

    let source_rows = joined
        .column_by_name(TRANSACTIONS_ROW)
        .and_then(|column| column.as_primitive_opt::<Int64Type>())
        .map(|rows| rows.values().iter().map(|row| *row as usize).collect::<Vec<_>>())
        .unwrap_or_else(|| (0..joined.num_rows()).collect());

    let day_names = derive_day_names(joined_column(&joined, BILL_DATE)?, &source_rows)?;
    let times_of_day = derive_times_of_day(joined_column(&joined, BILL_TIME)?, &source_rows)?;

    let mut fields = Vec::with_capacity(layout.selections.len() + 2);
    let mut columns = Vec::with_capacity(layout.selections.len() + 2);
    for selection in &layout.selections {
        let column = normalize_strings(joined_column(&joined, &selection.alias)?)?;
        fields.push(Field::new(&selection.alias, column.data_type().clone(), true));
        columns.push(column);
    }
    for (name, column) in [(DAY_NAME, day_names), (TIME_OF_DAY, times_of_day)] {
        fields.push(Field::new(name, DataType::Utf8, true));
        columns.push(column);
    }

    let enriched = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
    tracing::debug!(
        transactions = transactions.num_rows(),
        enriched = enriched.num_rows(),
        "transform_complete"
    );
    Ok(enriched)
}

/// One projected column of the join query.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selection {
    relation: &'static str,
    source: String,
    alias: String,
}

/// Output column names and where each one comes from.
#[derive(Debug)]
struct OutputLayout {
    selections: Vec<Selection>,
}

impl OutputLayout {
    fn new(transactions: &Schema, customers: &Schema, catalog: &Schema) -> Self {
        let derived = [CAT_CODE, DAY_NAME, TIME_OF_DAY];
        let mut selections = Vec::new();
        let mut taken = HashSet::new();

        // Derived columns replace transaction columns of the same name.
        for field in transactions.fields() {
            let name = field.name();
            if derived.contains(&name.as_str()) {
                continue;
            }
            taken.insert(name.clone());
            selections.push(Selection {
                relation: "t",
                source: name.clone(),
                alias: name.clone(),
            });
        }
        taken.extend(derived.map(String::from));

        for field in customers.fields() {
            if field.name() == MEMBER_ID {
                continue;
            }
            selections.push(Selection {
                relation: "c",
                source: field.name().clone(),
                alias: unique_name(field.name(), CUSTOMER_SUFFIX, &mut taken),
            });
        }

        selections.push(Selection {
            relation: "t",
            source: JOIN_CODE.to_string(),
            alias: CAT_CODE.to_string(),
        });

        for field in catalog.fields() {
            if field.name() == CODE {
                continue;
            }
            selections.push(Selection {
                relation: "p",
                source: field.name().clone(),
                alias: unique_name(field.name(), PRODUCT_SUFFIX, &mut taken),
            });
        }

        Self { selections }
    }

    fn join_sql(&self) -> String {
        let projection = self
            .selections
            .iter()
            .map(|s| format!("{}.{} AS {}", s.relation, quote(&s.source), quote(&s.alias)))
            .chain([
                format!("t.{} AS {}", quote(ROW_INDEX), quote(TRANSACTIONS_ROW)),
                format!("c.{} AS {}", quote(ROW_INDEX), quote(CUSTOMERS_ROW)),
                format!("p.{} AS {}", quote(ROW_INDEX), quote(CATALOG_ROW)),
            ])
            .collect::<Vec<_>>()
            .join(", ");

        let member_id = quote(MEMBER_ID);
        let join_code = quote(JOIN_CODE);
        format!(
            "SELECT {projection} \
             FROM (SELECT *, substr(CAST({sku_code} AS VARCHAR), 1, {len}) AS {join_code} FROM transactions) AS t \
             LEFT JOIN customers AS c ON t.{member_id} = c.{member_id} \
             LEFT JOIN (SELECT *, CAST({code} AS VARCHAR) AS {join_code} FROM catalog) AS p \
             ON t.{join_code} = p.{join_code} \
             ORDER BY {t_row}, {c_row}, {p_row}",
            sku_code = quote(SKU_CODE),
            len = CATEGORY_CODE_LEN,
            code = quote(CODE),
            t_row = quote(TRANSACTIONS_ROW),
            c_row = quote(CUSTOMERS_ROW),
            p_row = quote(CATALOG_ROW),
        )
    }
}

/// Appends `suffix` until `name` no longer collides with a taken output name.
fn unique_name(name: &str, suffix: &str, taken: &mut HashSet<String>) -> String {
    let mut candidate = name.to_string();
    while taken.contains(&candidate) {
        candidate.push_str(suffix);
    }
    taken.insert(candidate.clone());
    candidate
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

async fn join(
    transactions: &RecordBatch,
    catalog: &RecordBatch,
    customers: &RecordBatch,
    layout: &OutputLayout,
) -> Result<RecordBatch, TransformError> {
    let ctx = SessionContext::new();
    for (name, batch) in [
        ("transactions", transactions),
        ("customers", customers),
        ("catalog", catalog),
    ] {
        ctx.register_batch(name, with_row_index(batch)?)
            .map_err(TransformError::Join)?;
    }

    let df = ctx
        .sql(&layout.join_sql())
        .await
        .map_err(TransformError::Join)?;
    let logical_schema: SchemaRef = df.schema().inner().clone();
    let batches = df.collect().await.map_err(TransformError::Join)?;

    let schema = batches
        .first()
        .map(RecordBatch::schema)
        .unwrap_or(logical_schema);
    Ok(concat_batches(&schema, &batches)?)
}

fn with_row_index(batch: &RecordBatch) -> Result<RecordBatch, ArrowError> {
    let mut fields = batch.schema().fields().iter().cloned().collect::<Vec<_>>();
    fields.push(Arc::new(Field::new(ROW_INDEX, DataType::Int64, false)));

    let mut columns = batch.columns().to_vec();
    let row_index = Int64Array::from_iter_values(0..batch.num_rows() as i64);
    columns.push(Arc::new(row_index));

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
}

fn derive_day_names(bill_date: &ArrayRef, source_rows: &[usize]) -> Result<ArrayRef, TransformError> {
    let dates = DateColumn::try_new(bill_date)?.ok_or_else(|| TransformError::UnsupportedType {
        column: BILL_DATE,
        data_type: bill_date.data_type().clone(),
    })?;

    let mut labels = StringBuilder::with_capacity(bill_date.len(), bill_date.len() * 10);
    for (i, row) in source_rows.iter().enumerate() {
        let label = dates
            .date(i)
            .map_err(FeatureError::from)
            .and_then(|date| Ok(day_label(&date.format("%A").to_string())?))
            .map_err(|source| TransformError::BillDate { row: *row, source })?;
        labels.append_value(label);
    }
    Ok(Arc::new(labels.finish()))
}

fn derive_times_of_day(bill_time: &ArrayRef, source_rows: &[usize]) -> Result<ArrayRef, TransformError> {
    let times = cast(bill_time, &DataType::Utf8)?;
    let times = times.as_string::<i32>();

    let mut labels = StringBuilder::with_capacity(times.len(), times.len() * 10);
    for (i, row) in source_rows.iter().enumerate() {
        let label = if times.is_null(i) {
            Err(FeatureError::Null)
        } else {
            time_of_day(times.value(i)).map_err(FeatureError::from)
        }
        .map_err(|source| TransformError::BillTime { row: *row, source })?;
        labels.append_value(label);
    }
    Ok(Arc::new(labels.finish()))
}

/// Casts `Utf8View` and `LargeUtf8` columns to `Utf8`.
fn normalize_strings(column: &ArrayRef) -> Result<ArrayRef, ArrowError> {
    match column.data_type() {
        DataType::Utf8View | DataType::LargeUtf8 => cast(column, &DataType::Utf8),
        _ => Ok(column.clone()),
    }
}

fn require_column(
    batch: &RecordBatch,
    table: &'static str,
    column: &'static str,
) -> Result<(), TransformError> {
    if batch.schema().column_with_name(column).is_none() {
        return Err(TransformError::MissingColumn { table, column });
    }
    Ok(())
}

fn joined_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef, TransformError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| TransformError::MissingJoinedColumn {
            column: name.to_string(),
        })
}

/// Errors that abort the transform step.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// A join key or feature source column is absent from its input table.
    #[error("{table} table has no '{column}' column")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },

    /// The join query could not be planned or executed, e.g. key types that cannot be
    /// compared.
    #[error("failed to join source tables")]
    Join(#[source] DataFusionError),

    /// The join result lacks a projected column.
    #[error("join result has no '{column}' column")]
    MissingJoinedColumn { column: String },

    #[error("{column} column of type {data_type} is not supported")]
    UnsupportedType {
        column: &'static str,
        data_type: DataType,
    },

    /// `row` is the zero-based position in the transactions table.
    #[error("invalid bill_date in transaction row {row}")]
    BillDate {
        row: usize,
        #[source]
        source: FeatureError,
    },

    #[error("invalid bill_time in transaction row {row}")]
    BillTime {
        row: usize,
        #[source]
        source: FeatureError,
    },

    #[error("failed to assemble enriched table")]
    Arrow(#[from] ArrowError),
}

/// A single field value a feature could not be derived from.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("value is null")]
    Null,

    #[error(transparent)]
    Date(#[from] DateValueError),

    #[error(transparent)]
    DayLabel(#[from] DayLabelError),

    #[error(transparent)]
    TimeOfDay(#[from] TimeOfDayError),
}
