//! Query execution against the analytical SQLite store
//!
//! The store is opened read-only. Results are rendered into a plain text
//! table whose headers carry the column type and whose cells are formatted
//! by their runtime SQLite storage class.

use crate::error::{Error, Result};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Marker rendered for NULL cells
pub const NO_DATA: &str = "<no data found>";

/// Column header: name plus declared (or observed) type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnHeader {
    pub name: String,
    pub type_name: String,
}

impl fmt::Display for ColumnHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.type_name)
    }
}

/// A formatted query result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    pub columns: Vec<ColumnHeader>,
    pub rows: Vec<Vec<String>>,
}

impl ResultTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

impl fmt::Display for ResultTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<String> = self.columns.iter().map(|c| c.to_string()).collect();
        let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(cell.chars().count());
                }
            }
        }

        write_row(f, &headers, &widths)?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        write_row(f, &rule, &widths)?;
        for row in &self.rows {
            write_row(f, row, &widths)?;
        }
        Ok(())
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, cells: &[String], widths: &[usize]) -> fmt::Result {
    write!(f, "|")?;
    for (cell, width) in cells.iter().zip(widths) {
        write!(f, " {:<width$} |", cell, width = *width)?;
    }
    writeln!(f)
}

/// Insert thousands separators into a run of ASCII digits
fn group_digits(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn with_sign(negative: bool, is_currency: bool, body: String) -> String {
    let sign = if negative { "-" } else { "" };
    let prefix = if is_currency { "$" } else { "" };
    format!("{}{}{}", sign, prefix, body)
}

pub fn format_integer(value: i64, is_currency: bool) -> String {
    let body = group_digits(&value.unsigned_abs().to_string());
    with_sign(value < 0, is_currency, body)
}

pub fn format_real(value: f64, is_currency: bool) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let fixed = format!("{:.2}", value.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let body = format!("{}.{}", group_digits(whole), fraction);
    // -0.001 rounds to 0.00 and should not keep its sign
    let negative = value < 0.0 && fixed.bytes().any(|b| b.is_ascii_digit() && b != b'0');
    with_sign(negative, is_currency, body)
}

/// Read-only executor for generated SQL
pub struct DataStore {
    pool: SqlitePool,
}

impl DataStore {
    /// Open the dataset read-only
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Data file not found: {}",
                path.display()
            )));
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        info!("Opened data store at {:?}", path);
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Run `sql` and format the rows; zero rows is [`Error::NoRows`]
    pub async fn execute(&self, sql: &str, is_currency: bool) -> Result<ResultTable> {
        debug!(sql = %sql, is_currency, "Executing query");
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Execution {
                sql: sql.to_string(),
                message: e.to_string(),
            })?;

        let Some(first) = rows.first() else {
            return Err(Error::NoRows {
                sql: sql.to_string(),
            });
        };

        let mut columns: Vec<ColumnHeader> = first
            .columns()
            .iter()
            .map(|c| ColumnHeader {
                name: c.name().to_string(),
                type_name: c.type_info().name().to_string(),
            })
            .collect();

        let mut formatted = Vec::with_capacity(rows.len());
        for row in &rows {
            formatted.push(format_row(row, &mut columns, is_currency)?);
        }
        debug!(rows = formatted.len(), "Query returned rows");

        Ok(ResultTable {
            columns,
            rows: formatted,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn format_row(row: &SqliteRow, columns: &mut [ColumnHeader], is_currency: bool) -> Result<Vec<String>> {
    let mut cells = Vec::with_capacity(columns.len());
    for (i, header) in columns.iter_mut().enumerate() {
        let value = row.try_get_raw(i)?;
        if value.is_null() {
            cells.push(NO_DATA.to_string());
            continue;
        }
        let storage = value.type_info().name().to_string();
        // Expression columns have no declared type; show what the data holds
        if header.type_name == "NULL" {
            header.type_name = storage.clone();
        }
        let cell = match storage.as_str() {
            "INTEGER" => format_integer(row.try_get::<i64, _>(i)?, is_currency),
            "REAL" => format_real(row.try_get::<f64, _>(i)?, is_currency),
            "TEXT" => row.try_get::<String, _>(i)?,
            other => {
                return Err(Error::UnsupportedType {
                    column: header.name.clone(),
                    type_name: other.to_string(),
                })
            }
        };
        cells.push(cell);
    }
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_store() -> (DataStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("city.db");
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE operating_budget (program TEXT, year INTEGER, amount REAL, note BLOB)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO operating_budget VALUES
                ('Parks, Forestry & Recreation', 2022, 1234.5, NULL),
                ('Children''s Services', 2022, 987654321.0, NULL),
                ('Parks, Forestry & Recreation', 2023, NULL, x'00ff')",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;

        let store = DataStore::open(&path).await.unwrap();
        (store, tmp)
    }

    #[test]
    fn test_currency_formatting() {
        assert_eq!(format_integer(1234, true), "$1,234");
        assert_eq!(format_integer(1234, false), "1,234");
        assert_eq!(format_integer(999, true), "$999");
        assert_eq!(format_integer(-1234567, true), "-$1,234,567");
        assert_eq!(format_integer(0, false), "0");
        assert_eq!(format_real(1234.5, true), "$1,234.50");
        assert_eq!(format_real(1234.5, false), "1,234.50");
        assert_eq!(format_real(-0.5, true), "-$0.50");
        assert_eq!(format_real(-0.001, false), "0.00");
        assert_eq!(format_real(1000000.0, false), "1,000,000.00");
    }

    #[tokio::test]
    async fn test_execute_formats_cells_by_type() {
        let (store, _tmp) = setup_store().await;
        let table = store
            .execute(
                "SELECT program, year, amount FROM operating_budget WHERE year = 2022 ORDER BY amount",
                true,
            )
            .await
            .unwrap();

        assert_eq!(table.columns[0].to_string(), "program (TEXT)");
        assert_eq!(table.columns[1].to_string(), "year (INTEGER)");
        assert_eq!(table.columns[2].to_string(), "amount (REAL)");
        assert_eq!(
            table.rows[0],
            vec!["Parks, Forestry & Recreation", "$2,022", "$1,234.50"]
        );
        assert_eq!(table.rows[1][2], "$987,654,321.00");

        let text = table.to_string();
        assert!(text.contains("program (TEXT)"));
        assert!(text.contains("$1,234.50"));
    }

    #[tokio::test]
    async fn test_null_and_no_currency() {
        let (store, _tmp) = setup_store().await;
        let table = store
            .execute("SELECT year, amount FROM operating_budget WHERE year = 2023", false)
            .await
            .unwrap();
        assert_eq!(table.rows, vec![vec!["2023".to_string(), NO_DATA.to_string()]]);
        assert!(!table.to_string().contains('$'));
    }

    #[tokio::test]
    async fn test_expression_column_type() {
        let (store, _tmp) = setup_store().await;
        let table = store
            .execute("SELECT COUNT(*) AS row_count FROM operating_budget", false)
            .await
            .unwrap();
        assert_eq!(table.columns[0].name, "row_count");
        assert_eq!(table.columns[0].type_name, "INTEGER");
        assert_eq!(table.rows[0][0], "3");
    }

    #[tokio::test]
    async fn test_no_rows() {
        let (store, _tmp) = setup_store().await;
        let err = store
            .execute("SELECT * FROM operating_budget WHERE year = 1999", false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoRows { ref sql } if sql.contains("1999")));
    }

    #[tokio::test]
    async fn test_execution_error_keeps_sql() {
        let (store, _tmp) = setup_store().await;
        let err = store
            .execute("SELECT * FROM parks_budget", false)
            .await
            .unwrap_err();
        match err {
            Error::Execution { sql, message } => {
                assert_eq!(sql, "SELECT * FROM parks_budget");
                assert!(message.contains("no such table"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_is_read_only() {
        let (store, _tmp) = setup_store().await;
        let err = store
            .execute("DELETE FROM operating_budget", false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Execution { .. }));
    }

    #[tokio::test]
    async fn test_blob_is_unsupported() {
        let (store, _tmp) = setup_store().await;
        let err = store
            .execute("SELECT note FROM operating_budget WHERE year = 2023", false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedType { ref column, ref type_name } if column == "note" && type_name == "BLOB"
        ));
    }
}
