//! History command implementation

use crate::config::Config;
use crate::error::Result;
use crate::querylog::{QueryLog, QueryRecord};

/// Most recent stored questions, newest first
pub async fn cmd_history(config: &Config, limit: u32) -> Result<Vec<QueryRecord>> {
    let log = QueryLog::open(&config.paths.query_log_file).await?;
    log.init_schema().await?;
    log.recent(limit).await
}

/// Print query history to console
pub fn print_history(records: &[QueryRecord]) {
    println!("\n🕘 Recent Questions\n");

    if records.is_empty() {
        println!("No questions yet. Try: cityquery ask \"What did Parks spend in 2022?\"");
        return;
    }

    for record in records {
        println!("#{} [{}] {}", record.id, record.created_at, record.question);
        println!("   Table: {}", record.table_name);
        println!("   SQL: {}\n", record.sql_query);
    }
}
