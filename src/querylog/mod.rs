//! Query log
//!
//! Every answered question is stored with its SQL and formatted results so a
//! chart can be produced later from the record id alone.

mod schema;

pub use schema::*;

use crate::analysis::SqlAnalysis;
use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use tracing::{debug, info};

/// A stored question and its answer
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: i64,
    pub user_id: String,
    pub channel_id: String,
    pub question: String,
    pub table_name: String,
    pub schema_comment: String,
    pub applicability: String,
    pub sql_query: String,
    pub is_currency: bool,
    pub results: String,
    pub created_at: String,
}

impl QueryRecord {
    /// Build an unsaved record; `id` is assigned by [`QueryLog::store`]
    pub fn new(
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
        question: impl Into<String>,
        table_name: impl Into<String>,
        analysis: &SqlAnalysis,
        results: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            question: question.into(),
            table_name: table_name.into(),
            schema_comment: analysis.schema.clone(),
            applicability: analysis.applicability.clone(),
            sql_query: analysis.sql.clone(),
            is_currency: analysis.is_currency,
            results: results.into(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Query log database handle
#[derive(Clone)]
pub struct QueryLog {
    pool: SqlitePool,
}

impl QueryLog {
    /// Open (creating if needed) the query log at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to query log at {:?}", path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing query log schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Persist a record and return its id
    pub async fn store(&self, record: &QueryRecord) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_queries (
                user_id, channel_id, question, table_name, schema_comment,
                applicability, sql_query, is_currency, results, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.channel_id)
        .bind(&record.question)
        .bind(&record.table_name)
        .bind(&record.schema_comment)
        .bind(&record.applicability)
        .bind(&record.sql_query)
        .bind(record.is_currency)
        .bind(&record.results)
        .bind(&record.created_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(id, table = %record.table_name, "Stored query");
        Ok(id)
    }

    pub async fn fetch(&self, id: i64) -> Result<Option<QueryRecord>> {
        let record = sqlx::query_as::<_, QueryRecord>("SELECT * FROM user_queries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// Like [`fetch`](Self::fetch) but a missing id is an error
    pub async fn get(&self, id: i64) -> Result<QueryRecord> {
        self.fetch(id).await?.ok_or(Error::QueryNotFound(id))
    }

    /// Most recent records first
    pub async fn recent(&self, limit: u32) -> Result<Vec<QueryRecord>> {
        let records = sqlx::query_as::<_, QueryRecord>(
            "SELECT * FROM user_queries ORDER BY id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
