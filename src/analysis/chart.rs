use super::{ask_structured, Structured, StructuredPayload, StructuredSchema};
use crate::error::{Error, Result};
use crate::llm::{ChatMessage, CompletionService, FunctionSpec};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use std::fmt;
use tracing::info;

pub const CHART_FUNCTION: &str = "select_chart";

const CHART_FIELDS: &[&str] = &["type", "title", "data", "is_currency"];

/// Chart types the presentation layer knows how to draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    StackedBar,
    Line,
    Pie,
}

impl ChartKind {
    pub const ALL: [ChartKind; 4] = [
        ChartKind::Bar,
        ChartKind::StackedBar,
        ChartKind::Line,
        ChartKind::Pie,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::StackedBar => "stacked-bar",
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.token() == token)
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

pub fn chart_schema() -> StructuredSchema {
    let tokens: Vec<&str> = ChartKind::ALL.iter().map(|k| k.token()).collect();
    StructuredSchema {
        function: FunctionSpec {
            name: CHART_FUNCTION.to_string(),
            description: "Select a chart type and reshape query results into chart data".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "type": {
                        "type": "string",
                        "enum": tokens,
                        "description": "The chart that best answers the question"
                    },
                    "title": {
                        "type": "string",
                        "description": "A short chart title"
                    },
                    "data": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": {"type": "string", "description": "Category label"},
                                "date": {"type": "integer", "description": "Year of the value"},
                                "value": {"type": "number", "description": "The numeric value"}
                            },
                            "required": ["value"]
                        }
                    },
                    "is_currency": {
                        "type": "boolean",
                        "description": "True when the values are amounts of money"
                    }
                },
                "required": CHART_FIELDS
            }),
        },
        required: &[CHART_FIELDS],
    }
}

/// One chart point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_year",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<i64>,
    pub value: f64,
}

/// Years sometimes come back quoted
fn deserialize_year<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Year {
        Number(i64),
        Text(String),
    }

    match Option::<Year>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Year::Number(n)) => Ok(Some(n)),
        Some(Year::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Year::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid year '{}'", s))),
    }
}

/// The model's chart choice.
///
/// `chart` is kept as the raw token: types outside [`ChartKind`] are accepted
/// here and turned away by the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSelection {
    #[serde(rename = "type")]
    pub chart: String,
    pub title: String,
    pub data: Vec<DataPoint>,
    pub is_currency: bool,
}

impl StructuredPayload for ChartSelection {}

impl ChartSelection {
    pub fn kind(&self) -> Option<ChartKind> {
        ChartKind::from_token(&self.chart)
    }
}

/// Ask the model to pick a chart for a rendered result table
pub async fn request_chart(completion: &dyn CompletionService, prompt: String) -> Result<ChartSelection> {
    let messages = vec![ChatMessage::user(prompt)];
    match ask_structured::<ChartSelection>(completion, messages, &chart_schema(), true).await? {
        Structured::Result(selection) => {
            info!(
                chart = %selection.chart,
                points = selection.data.len(),
                "Model selected a chart"
            );
            Ok(selection)
        }
        Structured::FreeText(text) => Err(Error::MalformedResponse {
            message: format!("expected a {} call, got free text", CHART_FUNCTION),
            raw: text,
        }),
    }
}
