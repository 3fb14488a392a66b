//! Tables command implementation

use crate::catalog::TableCatalog;
use crate::config::Config;
use crate::error::Result;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub description: String,
    pub enum_columns: Vec<String>,
    pub hint_columns: Vec<String>,
}

/// List the catalogued tables
pub fn cmd_tables(config: &Config) -> Result<Vec<TableSummary>> {
    info!("Listing tables from {:?}", config.paths.catalog_file);
    let catalog = TableCatalog::load(&config.paths.catalog_file)?;
    Ok(catalog
        .iter()
        .map(|t| TableSummary {
            name: t.name.clone(),
            description: t.description.clone(),
            enum_columns: t.enums.keys().cloned().collect(),
            hint_columns: t.hints.keys().cloned().collect(),
        })
        .collect())
}

/// Print tables list to console
pub fn print_tables(tables: &[TableSummary]) {
    println!("\n📚 Catalogued Tables\n");

    for table in tables {
        println!("• {}", table.name);
        println!("  {}", table.description);
        if !table.enum_columns.is_empty() {
            println!("  Enumerated: {}", table.enum_columns.join(", "));
        }
        if !table.hint_columns.is_empty() {
            println!("  Hinted: {}", table.hint_columns.join(", "));
        }
        println!();
    }
}
