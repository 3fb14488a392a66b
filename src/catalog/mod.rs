//! Table catalog
//!
//! The static registry of queryable datasets. Each [`TableDescriptor`] carries
//! everything the model needs to write SQL against the table, and produces a
//! deterministic embedding text used as its semantic fingerprint.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// A permissible column value: the catalog mixes text, integer and decimal enums
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumValue::Int(v) => write!(f, "{}", v),
            EnumValue::Float(v) => write!(f, "{}", v),
            EnumValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// One queryable dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub description: String,
    /// `CREATE TABLE` text shown verbatim to the model
    pub schema: String,
    /// Column name -> permissible values
    #[serde(default)]
    pub enums: BTreeMap<String, Vec<EnumValue>>,
    /// Column name -> auxiliary annotations
    #[serde(default)]
    pub hints: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub instructions: String,
}

impl TableDescriptor {
    /// Text fed to the embedding model for this table.
    ///
    /// Enum and hint maps are ordered, so the output depends only on field values.
    pub fn embedding_text(&self) -> String {
        let mut text = format!(
            "Table: {}\nDescription: {}\nSchema:\n{}\n",
            self.name,
            self.description,
            self.schema.trim()
        );

        if !self.enums.is_empty() {
            text.push_str("Enums:\n");
            for (column, values) in &self.enums {
                let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                text.push_str(&format!("  {}: {}\n", column, values.join(", ")));
            }
        }

        if !self.hints.is_empty() {
            text.push_str("Hints:\n");
            for (column, annotations) in &self.hints {
                let pairs: Vec<String> = annotations
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                text.push_str(&format!("  {}: {}\n", column, pairs.join("; ")));
            }
        }

        text
    }
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    tables: Vec<TableDescriptor>,
}

/// Immutable set of table descriptors, in document order
#[derive(Debug, Clone)]
pub struct TableCatalog {
    tables: Vec<TableDescriptor>,
}

impl TableCatalog {
    /// Build a catalog, rejecting empty or duplicate names
    pub fn new(tables: Vec<TableDescriptor>) -> Result<Self> {
        if tables.is_empty() {
            return Err(Error::Config("Table catalog is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for table in &tables {
            if table.name.trim().is_empty() {
                return Err(Error::Config(
                    "Table catalog entry has an empty name".to_string(),
                ));
            }
            if table.schema.trim().is_empty() {
                return Err(Error::Config(format!(
                    "Table '{}' has an empty schema",
                    table.name
                )));
            }
            if !seen.insert(table.name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate table name in catalog: {}",
                    table.name
                )));
            }
        }

        Ok(Self { tables })
    }

    /// Parse a TOML catalog document
    pub fn from_toml(content: &str) -> Result<Self> {
        let doc: CatalogDocument = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Malformed table catalog: {}", e)))?;
        Self::new(doc.tables)
    }

    /// Load a catalog from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading table catalog from {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Cannot read table catalog {}: {}",
                path.display(),
                e
            ))
        })?;
        let catalog = Self::from_toml(&content)?;
        info!("Loaded {} tables from catalog", catalog.len());
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
