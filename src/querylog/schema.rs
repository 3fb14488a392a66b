//! SQLite schema for the query log

pub const SCHEMA_SQL: &str = r#"
-- One row per answered question
CREATE TABLE IF NOT EXISTS user_queries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    channel_id TEXT NOT NULL,
    question TEXT NOT NULL,
    table_name TEXT NOT NULL,
    schema_comment TEXT NOT NULL,
    applicability TEXT NOT NULL,
    sql_query TEXT NOT NULL,
    is_currency INTEGER NOT NULL DEFAULT 0,
    results TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_user_queries_created ON user_queries(created_at);
"#;
