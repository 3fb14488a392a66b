//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::prompt::{CHART_SELECT_FILE, DEFAULT_CHART_SELECT, DEFAULT_SQL_GEN, SQL_GEN_FILE};
use crate::querylog::QueryLog;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Sample catalog describing the bundled Toronto datasets
pub const SAMPLE_CATALOG: &str = include_str!("../../catalog/tables.toml");

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
}

/// Files touched by `init`
#[derive(Debug, Clone, Serialize)]
pub struct InitSummary {
    pub base_dir: PathBuf,
    pub config_file: PathBuf,
    pub catalog_file: PathBuf,
    pub prompts_dir: PathBuf,
    pub query_log_file: PathBuf,
    pub data_file: PathBuf,
    pub data_file_exists: bool,
    /// Files written this run; existing catalog and prompt files are kept
    pub written: Vec<PathBuf>,
}

/// Write a default config, sample catalog and prompt templates, and create
/// the query log
pub async fn cmd_init(options: InitOptions) -> Result<InitSummary> {
    let InitOptions {
        base_dir,
        config_path,
        force,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::AlreadyInitialized(config_path.display().to_string()));
    }

    let mut config = Config::default();
    config.init_paths(Some(base_dir));
    config.paths.config_file = config_path;
    config.validate()?;
    config.save()?;

    let mut written = vec![config.paths.config_file.clone()];

    if write_if_missing(&config.paths.catalog_file, SAMPLE_CATALOG)? {
        written.push(config.paths.catalog_file.clone());
    }

    let sql_gen = config.paths.prompts_dir.join(SQL_GEN_FILE);
    if write_if_missing(&sql_gen, DEFAULT_SQL_GEN)? {
        written.push(sql_gen);
    }
    let chart_select = config.paths.prompts_dir.join(CHART_SELECT_FILE);
    if write_if_missing(&chart_select, DEFAULT_CHART_SELECT)? {
        written.push(chart_select);
    }

    std::fs::create_dir_all(&config.paths.export_dir)?;

    let log = QueryLog::open(&config.paths.query_log_file).await?;
    log.init_schema().await?;
    info!("Created query log at {:?}", config.paths.query_log_file);

    Ok(InitSummary {
        base_dir: config.paths.base_dir.clone(),
        config_file: config.paths.config_file.clone(),
        catalog_file: config.paths.catalog_file.clone(),
        prompts_dir: config.paths.prompts_dir.clone(),
        query_log_file: config.paths.query_log_file.clone(),
        data_file_exists: config.paths.data_file.exists(),
        data_file: config.paths.data_file.clone(),
        written,
    })
}

fn write_if_missing(path: &Path, content: &str) -> Result<bool> {
    if path.exists() {
        info!("Keeping existing {:?}", path);
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    info!("Wrote {:?}", path);
    Ok(true)
}

/// Print init summary to console
pub fn print_init_summary(summary: &InitSummary) {
    println!("✓ Initialized cityquery at {:?}", summary.base_dir);
    println!("\nConfiguration: {:?}", summary.config_file);
    println!("Catalog: {:?}", summary.catalog_file);
    println!("Prompts: {:?}", summary.prompts_dir);
    println!("Query log: {:?}", summary.query_log_file);

    println!("\nNext steps:");
    if !summary.data_file_exists {
        println!(
            "  Place the ingested dataset at {:?} (or set [database] data_file)",
            summary.data_file
        );
    }
    println!("  export OPENAI_API_KEY=...                  # Model credentials");
    println!("  cityquery tables                           # List catalogued tables");
    println!("  cityquery ask \"What did Parks spend in 2022?\"");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableCatalog;
    use tempfile::TempDir;

    fn options(tmp: &TempDir, force: bool) -> InitOptions {
        InitOptions {
            base_dir: tmp.path().to_path_buf(),
            config_path: tmp.path().join("config.toml"),
            force,
        }
    }

    #[test]
    fn test_sample_catalog_is_valid() {
        let catalog = TableCatalog::from_toml(SAMPLE_CATALOG).unwrap();
        for name in [
            "operating_budget",
            "service_requests",
            "ase_tickets",
            "condominium_apartment_price",
        ] {
            assert!(catalog.get(name).is_some(), "missing {}", name);
        }
    }

    #[tokio::test]
    async fn test_init_writes_files() {
        let tmp = TempDir::new().unwrap();
        let summary = cmd_init(options(&tmp, false)).await.unwrap();

        assert!(summary.config_file.exists());
        assert!(summary.catalog_file.exists());
        assert!(summary.prompts_dir.join(SQL_GEN_FILE).exists());
        assert!(summary.query_log_file.exists());
        assert!(!summary.data_file_exists);
        assert_eq!(summary.written.len(), 4);

        let config = Config::load(&summary.config_file).unwrap();
        assert_eq!(config.paths.catalog_file, summary.catalog_file);
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite() {
        let tmp = TempDir::new().unwrap();
        cmd_init(options(&tmp, false)).await.unwrap();

        let err = cmd_init(options(&tmp, false)).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyInitialized(_)));

        std::fs::write(tmp.path().join("tables.toml"), "# edited").unwrap();
        let summary = cmd_init(options(&tmp, true)).await.unwrap();
        assert_eq!(summary.written, vec![summary.config_file.clone()]);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("tables.toml")).unwrap(),
            "# edited"
        );
    }
}
