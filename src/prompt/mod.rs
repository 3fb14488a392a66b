//! Prompt rendering
//!
//! Two template sets are compiled once at startup:
//! - `sql_gen.json`: a list of chat messages whose `content` (and the
//!   arguments of any few-shot function call) are handlebars templates
//!   rendered against the current date and the selected table
//! - `chart_select.hbs`: a single document rendered against the question and
//!   the formatted result table
//!
//! Templates run in strict mode without HTML escaping, so schema text and enum
//! values reach the model verbatim and a misspelled field fails loudly.

use crate::catalog::TableDescriptor;
use crate::error::{Error, Result};
use crate::llm::{ChatMessage, FunctionCall, Role};
use chrono::NaiveDate;
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

pub const SQL_GEN_FILE: &str = "sql_gen.json";
pub const CHART_SELECT_FILE: &str = "chart_select.hbs";

pub const DEFAULT_SQL_GEN: &str = include_str!("../../prompts/sql_gen.json");
pub const DEFAULT_CHART_SELECT: &str = include_str!("../../prompts/chart_select.hbs");

const CHART_TEMPLATE: &str = "chart_select";

#[derive(Debug, Clone, Deserialize)]
struct MessageTemplate {
    role: Role,
    #[serde(default)]
    content: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

/// Template view of a table
#[derive(Debug, Serialize)]
struct TableView<'a> {
    name: &'a str,
    description: &'a str,
    schema: &'a str,
    instructions: &'a str,
    enums: &'a BTreeMap<String, Vec<crate::catalog::EnumValue>>,
    hints: &'a BTreeMap<String, BTreeMap<String, String>>,
    enum_listing: String,
    hint_listing: String,
}

impl<'a> From<&'a TableDescriptor> for TableView<'a> {
    fn from(table: &'a TableDescriptor) -> Self {
        Self {
            name: &table.name,
            description: &table.description,
            schema: table.schema.trim(),
            instructions: &table.instructions,
            enums: &table.enums,
            hints: &table.hints,
            enum_listing: enum_listing(table),
            hint_listing: hint_listing(table),
        }
    }
}

fn enum_listing(table: &TableDescriptor) -> String {
    if table.enums.is_empty() {
        return "(none)".to_string();
    }
    table
        .enums
        .iter()
        .map(|(column, values)| {
            let values: Vec<String> = values
                .iter()
                .map(|v| match v {
                    crate::catalog::EnumValue::Text(s) => format!("\"{}\"", s),
                    other => other.to_string(),
                })
                .collect();
            format!("- {}: {}", column, values.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn hint_listing(table: &TableDescriptor) -> String {
    if table.hints.is_empty() {
        return "(none)".to_string();
    }
    table
        .hints
        .iter()
        .map(|(column, annotations)| {
            let pairs: Vec<String> = annotations
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect();
            format!("- {}: {}", column, pairs.join("; "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt date format, e.g. "January 2, 2006"
pub fn format_prompt_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// Compiled prompt templates
#[derive(Debug)]
pub struct PromptRenderer {
    registry: Handlebars<'static>,
    messages: Vec<MessageTemplate>,
}

impl PromptRenderer {
    /// Compile templates from their source text.
    ///
    /// Any parse failure is a configuration error.
    pub fn from_sources(sql_gen: &str, chart_select: &str) -> Result<Self> {
        let messages: Vec<MessageTemplate> = serde_json::from_str(sql_gen)
            .map_err(|e| Error::Config(format!("Malformed {}: {}", SQL_GEN_FILE, e)))?;
        if messages.is_empty() {
            return Err(Error::Config(format!("{} has no messages", SQL_GEN_FILE)));
        }

        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);

        for (i, message) in messages.iter().enumerate() {
            registry
                .register_template_string(&content_key(i), &message.content)
                .map_err(|e| {
                    Error::Config(format!("Invalid template in {} message {}: {}", SQL_GEN_FILE, i, e))
                })?;
            if let Some(call) = &message.function_call {
                registry
                    .register_template_string(&arguments_key(i), &call.arguments)
                    .map_err(|e| {
                        Error::Config(format!(
                            "Invalid function call template in {} message {}: {}",
                            SQL_GEN_FILE, i, e
                        ))
                    })?;
            }
        }

        registry
            .register_template_string(CHART_TEMPLATE, chart_select)
            .map_err(|e| Error::Config(format!("Invalid template in {}: {}", CHART_SELECT_FILE, e)))?;

        Ok(Self { registry, messages })
    }

    /// Load templates from `dir`, using the built-in defaults for missing files
    pub fn load(dir: &Path) -> Result<Self> {
        let sql_gen = read_or_default(&dir.join(SQL_GEN_FILE), DEFAULT_SQL_GEN)?;
        let chart_select = read_or_default(&dir.join(CHART_SELECT_FILE), DEFAULT_CHART_SELECT)?;
        Self::from_sources(&sql_gen, &chart_select)
    }

    pub fn builtin() -> Result<Self> {
        Self::from_sources(DEFAULT_SQL_GEN, DEFAULT_CHART_SELECT)
    }

    /// Render the SQL-generation conversation; the question goes last, unrendered
    pub fn render_sql_messages(
        &self,
        table: &TableDescriptor,
        date: NaiveDate,
        question: &str,
    ) -> Result<Vec<ChatMessage>> {
        let data = json!({
            "date": format_prompt_date(date),
            "table": TableView::from(table),
        });

        let mut rendered = Vec::with_capacity(self.messages.len() + 1);
        for (i, template) in self.messages.iter().enumerate() {
            let content = self.registry.render(&content_key(i), &data)?;
            let function_call = match &template.function_call {
                Some(call) => Some(FunctionCall {
                    name: call.name.clone(),
                    arguments: self.registry.render(&arguments_key(i), &data)?,
                }),
                None => None,
            };
            rendered.push(ChatMessage {
                role: template.role,
                content,
                name: template.name.clone(),
                function_call,
            });
        }
        rendered.push(ChatMessage::user(question));
        Ok(rendered)
    }

    /// Render the chart-selection prompt
    pub fn render_chart_prompt(&self, question: &str, data_table: &str) -> Result<String> {
        let data = json!({ "question": question, "data": data_table });
        Ok(self.registry.render(CHART_TEMPLATE, &data)?)
    }
}

fn content_key(i: usize) -> String {
    format!("sql_gen.{}", i)
}

fn arguments_key(i: usize) -> String {
    format!("sql_gen.{}.arguments", i)
}

fn read_or_default(path: &Path, default: &str) -> Result<String> {
    if path.exists() {
        debug!("Loading prompt template from {:?}", path);
        Ok(std::fs::read_to_string(path)?)
    } else {
        debug!("No template at {:?}, using built-in", path);
        Ok(default.to_string())
    }
}
