//! Round trips against a throwaway PostgreSQL instance.

use std::sync::Arc;

use arrow::array::{ArrayRef, BinaryArray, Date32Array, Float64Array, RecordBatch, StringArray};
use pgtemp::PgTempDB;
use retail_warehouse::{DbConnPool, TableWrite, Warehouse, WriteError};
use sqlx::{Row as _, postgres::PgConnectOptions};

async fn warehouse(temp_db: &PgTempDB) -> Warehouse {
    let options = temp_db
        .connection_uri()
        .parse::<PgConnectOptions>()
        .expect("temp db uri should parse");
    let pool = DbConnPool::connect(options)
        .await
        .expect("Failed to connect to temp db");
    Warehouse::new(pool, "postgres")
}

fn enriched() -> RecordBatch {
    RecordBatch::try_from_iter(vec![
        ("member_id", Arc::new(StringArray::from(vec![Some("M001"), Some("M999")])) as ArrayRef),
        ("bill_date", Arc::new(Date32Array::from(vec![19_359, 19_365])) as ArrayRef),
        ("amount", Arc::new(Float64Array::from(vec![45.0, 12.5])) as ArrayRef),
        ("gender", Arc::new(StringArray::from(vec![Some("F"), None])) as ArrayRef),
        ("time_of_day", Arc::new(StringArray::from(vec!["0_Morning", "3_Evening "])) as ArrayRef),
    ])
    .expect("Failed to build test batch")
}

fn customers() -> RecordBatch {
    RecordBatch::try_from_iter(vec![(
        "member_id",
        Arc::new(StringArray::from(vec!["M001", "M002", "M003"])) as ArrayRef,
    )])
    .expect("Failed to build test batch")
}

async fn count_rows(warehouse: &Warehouse, table: &str) -> i64 {
    sqlx::query(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(&**warehouse.pool())
        .await
        .expect("count query should succeed")
        .get(0)
}

#[tokio::test]
#[ignore = "requires a local PostgreSQL installation"]
async fn write_all_replaces_both_tables() {
    //* Given
    let temp_db = PgTempDB::new();
    let warehouse = warehouse(&temp_db).await;
    sqlx::query("CREATE TABLE lf_data (legacy INTEGER)")
        .execute(&**warehouse.pool())
        .await
        .expect("Failed to create stale table");

    let enriched = enriched();
    let customers = customers();

    //* When
    warehouse
        .write_all(&[
            TableWrite::new("lf_data", &enriched),
            TableWrite::new("lf_customer", &customers),
        ])
        .await
        .expect("write should succeed");

    //* Then
    assert_eq!(count_rows(&warehouse, "lf_data").await, 2);
    assert_eq!(count_rows(&warehouse, "lf_customer").await, 3);

    let row = sqlx::query(
        "SELECT member_id, bill_date::text, amount, gender, time_of_day FROM lf_data \
         ORDER BY member_id DESC LIMIT 1",
    )
    .fetch_one(&**warehouse.pool())
    .await
    .expect("select should succeed");
    assert_eq!(row.get::<String, _>(0), "M999");
    assert_eq!(row.get::<String, _>(1), "2023-01-08");
    assert_eq!(row.get::<f64, _>(2), 12.5);
    assert_eq!(row.get::<Option<String>, _>(3), None);
    assert_eq!(row.get::<String, _>(4), "3_Evening ");
}

#[tokio::test]
#[ignore = "requires a local PostgreSQL installation"]
async fn failed_write_leaves_existing_tables_untouched() {
    //* Given
    let temp_db = PgTempDB::new();
    let warehouse = warehouse(&temp_db).await;
    let customers = customers();
    warehouse
        .replace_table("lf_customer", &customers)
        .await
        .expect("initial write should succeed");

    // Duplicate column names pass encoding but fail CREATE TABLE.
    let duplicate_columns = RecordBatch::try_from_iter(vec![
        ("member_id", Arc::new(StringArray::from(vec!["M001"])) as ArrayRef),
        ("member_id", Arc::new(StringArray::from(vec!["M002"])) as ArrayRef),
    ])
    .expect("Failed to build test batch");
    let smaller = RecordBatch::try_from_iter(vec![(
        "member_id",
        Arc::new(StringArray::from(vec!["M009"])) as ArrayRef,
    )])
    .expect("Failed to build test batch");

    //* When
    let result = warehouse
        .write_all(&[
            TableWrite::new("lf_customer", &smaller),
            TableWrite::new("lf_data", &duplicate_columns),
        ])
        .await;

    //* Then
    assert!(
        matches!(result, Err(WriteError::CreateTable { ref table, .. }) if table == "lf_data"),
        "got {result:?}"
    );
    assert_eq!(count_rows(&warehouse, "lf_customer").await, 3);
}

#[tokio::test]
#[ignore = "requires a local PostgreSQL installation"]
async fn unsupported_column_fails_before_touching_the_database() {
    //* Given
    let temp_db = PgTempDB::new();
    let warehouse = warehouse(&temp_db).await;
    let customers = customers();
    warehouse
        .replace_table("lf_customer", &customers)
        .await
        .expect("initial write should succeed");
    let unsupported = RecordBatch::try_from_iter(vec![(
        "blob",
        Arc::new(BinaryArray::from(vec![b"x".as_ref()])) as ArrayRef,
    )])
    .expect("Failed to build test batch");

    //* When
    let result = warehouse.replace_table("lf_customer", &unsupported).await;

    //* Then
    assert!(matches!(result, Err(WriteError::Encode { .. })), "got {result:?}");
    assert_eq!(count_rows(&warehouse, "lf_customer").await, 3);
}
