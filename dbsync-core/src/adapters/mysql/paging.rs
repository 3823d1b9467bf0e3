//! Stable row paging and cell value conversion.
//!
//! Offset paging is only repeatable when the rows come back in a fixed
//! order. The detection priority is:
//! 1. Primary key columns
//! 2. An auto-increment column
//! 3. Unordered, with a warning in the log

use crate::error::DbSyncError;
use crate::models::{Row, TablePage};
use crate::sql::{BASE64_CELL_KEY, quote_identifier};
use base64::Engine as _;
use serde_json::{Map, Value};
use sqlx::{Column, MySqlPool, Row as _, TypeInfo, ValueRef};

/// How a table's rows are ordered for paging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderingStrategy {
    PrimaryKey { columns: Vec<String> },
    AutoIncrement { column: String },
    Unordered,
}

/// Detect the best ordering strategy for a MySQL table.
pub async fn detect_ordering_strategy(
    pool: &MySqlPool,
    db_name: &str,
    table: &str,
) -> Result<OrderingStrategy, DbSyncError> {
    if let Some(pk_strategy) = detect_primary_key(pool, db_name, table).await? {
        tracing::debug!(
            "Detected primary key ordering for {}.{}: {:?}",
            db_name,
            table,
            pk_strategy
        );
        return Ok(pk_strategy);
    }

    if let Some(auto_strategy) = detect_auto_increment_column(pool, db_name, table).await? {
        tracing::debug!(
            "Detected auto-increment ordering for {}.{}: {:?}",
            db_name,
            table,
            auto_strategy
        );
        return Ok(auto_strategy);
    }

    tracing::warn!(
        "No primary key or auto-increment column on {}.{}, paging order is not guaranteed",
        db_name,
        table
    );
    Ok(OrderingStrategy::Unordered)
}

/// Detect primary key columns for ordering.
async fn detect_primary_key(
    pool: &MySqlPool,
    db_name: &str,
    table: &str,
) -> Result<Option<OrderingStrategy>, DbSyncError> {
    // Cast to CHAR to avoid VARBINARY type issues in MySQL 8.0+
    let pk_query = r#"
        SELECT CAST(COLUMN_NAME AS CHAR) as COLUMN_NAME
        FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = ?
        AND TABLE_NAME = ?
        AND CONSTRAINT_NAME = 'PRIMARY'
        ORDER BY ORDINAL_POSITION
    "#;

    let columns: Vec<String> = sqlx::query_scalar(pk_query)
        .bind(db_name)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            DbSyncError::query_failed(
                format!(
                    "Failed to detect primary key for table '{}.{}'",
                    db_name, table
                ),
                e,
            )
        })?;

    if columns.is_empty() {
        return Ok(None);
    }

    Ok(Some(OrderingStrategy::PrimaryKey { columns }))
}

/// Detect auto-increment columns.
async fn detect_auto_increment_column(
    pool: &MySqlPool,
    db_name: &str,
    table: &str,
) -> Result<Option<OrderingStrategy>, DbSyncError> {
    // Cast to CHAR to avoid VARBINARY type issues in MySQL 8.0+
    let auto_query = r#"
        SELECT CAST(COLUMN_NAME AS CHAR) as COLUMN_NAME
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = ?
        AND TABLE_NAME = ?
        AND EXTRA LIKE '%auto_increment%'
        ORDER BY ORDINAL_POSITION
        LIMIT 1
    "#;

    let column: Option<String> = sqlx::query_scalar(auto_query)
        .bind(db_name)
        .bind(table)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            DbSyncError::query_failed(
                format!(
                    "Failed to detect auto-increment columns for table '{}.{}'",
                    db_name, table
                ),
                e,
            )
        })?;

    Ok(column.map(|column| OrderingStrategy::AutoIncrement { column }))
}

/// Generate an ORDER BY clause (empty for unordered tables).
pub fn generate_order_by_clause(strategy: &OrderingStrategy) -> String {
    match strategy {
        OrderingStrategy::PrimaryKey { columns } => {
            let cols: Vec<String> = columns
                .iter()
                .map(|c| format!("{} ASC", quote_identifier(c)))
                .collect();
            format!("ORDER BY {}", cols.join(", "))
        }
        OrderingStrategy::AutoIncrement { column } => {
            format!("ORDER BY {} ASC", quote_identifier(column))
        }
        OrderingStrategy::Unordered => String::new(),
    }
}

/// Builds the page query. Limit and offset are integers and are inlined.
pub fn page_query(db_name: &str, table: &str, strategy: &OrderingStrategy, offset: u64, limit: u64) -> String {
    let order_by = generate_order_by_clause(strategy);
    let mut query = format!(
        "SELECT * FROM {}.{}",
        quote_identifier(db_name),
        quote_identifier(table)
    );
    if !order_by.is_empty() {
        query.push(' ');
        query.push_str(&order_by);
    }
    query.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
    query
}

/// Reads one page of rows.
pub async fn fetch_page(
    pool: &MySqlPool,
    db_name: &str,
    table: &str,
    offset: u64,
    limit: u64,
) -> Result<TablePage, DbSyncError> {
    let count_query = format!(
        "SELECT COUNT(*) FROM {}.{}",
        quote_identifier(db_name),
        quote_identifier(table)
    );
    let total_rows: i64 = sqlx::query_scalar(&count_query)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            DbSyncError::query_failed(format!("Failed to count rows in '{}.{}'", db_name, table), e)
        })?;

    let strategy = detect_ordering_strategy(pool, db_name, table).await?;
    let query = page_query(db_name, table, &strategy, offset, limit);

    // Text protocol: every cell arrives in its MySQL literal text form
    let rows = sqlx::raw_sql(&query).fetch_all(pool).await.map_err(|e| {
        DbSyncError::query_failed(format!("Failed to read rows from '{}.{}'", db_name, table), e)
    })?;

    let rows = rows.iter().map(row_to_cells).collect::<Result<Vec<_>, _>>()?;

    Ok(TablePage::new(
        rows,
        u64::try_from(total_rows).unwrap_or(0),
        offset,
        limit,
    ))
}

/// Convert a text-protocol row to wire cells.
fn row_to_cells(row: &sqlx::mysql::MySqlRow) -> Result<Row, DbSyncError> {
    let mut map = Map::new();
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row
            .try_get_raw(index)
            .map_err(|e| DbSyncError::query_failed("Failed to read column", e))?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let bytes: Vec<u8> = row
                .try_get_unchecked(index)
                .map_err(|e| DbSyncError::query_failed("Failed to decode column", e))?;
            cell_value(column.type_info().name(), &bytes)
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}

/// Converts a cell's text-protocol bytes into a wire value.
///
/// Integers become JSON numbers, finite floats become JSON numbers, and
/// DECIMAL stays text so no precision is lost. Bytes that are not UTF-8
/// travel as `{"base64": ...}`. Everything else, dates and JSON documents
/// included, travels as its literal text.
pub fn cell_value(type_name: &str, bytes: &[u8]) -> Value {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return binary_cell(bytes);
    };

    let base = type_name.trim_end_matches(" UNSIGNED");
    match base {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "YEAR" => {
            if let Ok(n) = text.parse::<i64>() {
                return Value::from(n);
            }
            if let Ok(n) = text.parse::<u64>() {
                return Value::from(n);
            }
            Value::String(text.to_string())
        }
        "BOOLEAN" => match text {
            "1" => Value::Bool(true),
            "0" => Value::Bool(false),
            other => Value::String(other.to_string()),
        },
        "FLOAT" | "DOUBLE" | "REAL" => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| Value::String(text.to_string()), Value::Number),
        "BIT" => binary_cell(bytes),
        _ => Value::String(text.to_string()),
    }
}

fn binary_cell(bytes: &[u8]) -> Value {
    let mut map = Map::new();
    map.insert(
        BASE64_CELL_KEY.to_string(),
        Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
    );
    Value::Object(map)
}
