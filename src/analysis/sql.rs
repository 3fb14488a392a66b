use super::{ask_structured, Structured, StructuredPayload, StructuredSchema};
use crate::error::{Error, Result};
use crate::llm::{ChatMessage, CompletionService, FunctionSpec};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

pub const SQL_ANALYSIS_FUNCTION: &str = "sql_analysis";

const QUERY_FIELDS: &[&str] = &["schema", "applicability", "sql", "is_currency"];
const MISSING_DATA_FIELDS: &[&str] = &["missing_data"];

pub fn sql_analysis_schema() -> StructuredSchema {
    StructuredSchema {
        function: FunctionSpec {
            name: SQL_ANALYSIS_FUNCTION.to_string(),
            description: "Analyze a question against the table schema and write a SQLite query that answers it".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "schema": {
                        "type": "string",
                        "description": "Which columns of the table are relevant to the question and why"
                    },
                    "applicability": {
                        "type": "string",
                        "description": "How well the table can answer the question, including any caveats"
                    },
                    "sql": {
                        "type": "string",
                        "description": "A single SQLite SELECT statement answering the question"
                    },
                    "is_currency": {
                        "type": "boolean",
                        "description": "True when the selected values are amounts of money"
                    },
                    "missing_data": {
                        "type": "string",
                        "description": "Why the table cannot answer the question; set instead of sql"
                    }
                }
            }),
        },
        required: &[QUERY_FIELDS, MISSING_DATA_FIELDS],
    }
}

#[derive(Debug, Deserialize)]
struct SqlAnalysisPayload {
    schema: Option<String>,
    applicability: Option<String>,
    sql: Option<String>,
    is_currency: Option<bool>,
    missing_data: Option<String>,
}

impl SqlAnalysisPayload {
    fn query(&self) -> &str {
        self.sql.as_deref().unwrap_or_default().trim()
    }

    fn explanation(&self) -> &str {
        self.missing_data.as_deref().unwrap_or_default().trim()
    }
}

impl StructuredPayload for SqlAnalysisPayload {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.query().is_empty() {
            if self.explanation().is_empty() {
                return Err(format!(
                    "{} call has neither a query nor a missing-data explanation",
                    SQL_ANALYSIS_FUNCTION
                ));
            }
            return Ok(());
        }

        // A query needs its commentary and currency flag
        let mut absent = Vec::new();
        if self.schema.is_none() {
            absent.push("schema");
        }
        if self.applicability.is_none() {
            absent.push("applicability");
        }
        if self.is_currency.is_none() {
            absent.push("is_currency");
        }
        if !absent.is_empty() {
            return Err(format!("query is missing fields: {}", absent.join(", ")));
        }
        Ok(())
    }
}

/// The model's answer to a question: either a query or the reason it cannot write one.
///
/// Exactly one of `sql` and `missing_data` is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlAnalysis {
    pub schema: String,
    pub applicability: String,
    pub sql: String,
    pub is_currency: bool,
    pub missing_data: String,
}

impl SqlAnalysis {
    pub fn missing(explanation: impl Into<String>) -> Self {
        Self {
            missing_data: explanation.into(),
            ..Self::default()
        }
    }

    /// Whether the model produced a query
    pub fn has_sql(&self) -> bool {
        !self.sql.is_empty()
    }

    /// Build from a decoded reply. A query wins over an explanation sent
    /// alongside it; an empty free-text reply is rejected.
    fn from_structured(reply: Structured<SqlAnalysisPayload>) -> Result<Self> {
        match reply {
            Structured::Result(payload) => {
                let sql = payload.query().to_string();
                if sql.is_empty() {
                    return Ok(Self::missing(payload.explanation()));
                }
                Ok(Self {
                    schema: payload.schema.unwrap_or_default(),
                    applicability: payload.applicability.unwrap_or_default(),
                    sql,
                    is_currency: payload.is_currency.unwrap_or_default(),
                    missing_data: String::new(),
                })
            }
            Structured::FreeText(text) => {
                if text.trim().is_empty() {
                    return Err(Error::MalformedResponse {
                        message: "reply has neither a function call nor text".to_string(),
                        raw: text,
                    });
                }
                Ok(Self::missing(text.trim()))
            }
        }
    }
}

/// Ask the model for a query, letting it decline in free text
pub async fn request_sql_analysis(
    completion: &dyn CompletionService,
    messages: Vec<ChatMessage>,
) -> Result<SqlAnalysis> {
    let reply = ask_structured(completion, messages, &sql_analysis_schema(), false).await?;
    let analysis = SqlAnalysis::from_structured(reply)?;
    if analysis.has_sql() {
        info!(sql = %analysis.sql, is_currency = analysis.is_currency, "Model wrote a query");
    } else {
        debug!(explanation = %analysis.missing_data, "Model reported missing data");
    }
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedCompletion;
    use crate::llm::ModelReply;

    #[tokio::test]
    async fn test_function_call_becomes_query() {
        let completion = ScriptedCompletion::new(vec![ScriptedCompletion::call(
            SQL_ANALYSIS_FUNCTION,
            json!({
                "schema": "program, year and amount are relevant",
                "applicability": "The table covers the Parks program",
                "sql": " SELECT SUM(amount) FROM operating_budget WHERE year = 2022; ",
                "is_currency": true
            }),
        )]);

        let analysis = request_sql_analysis(&completion, vec![ChatMessage::user("q")])
            .await
            .unwrap();
        assert!(analysis.has_sql());
        assert_eq!(
            analysis.sql,
            "SELECT SUM(amount) FROM operating_budget WHERE year = 2022;"
        );
        assert!(analysis.is_currency);
        assert!(analysis.missing_data.is_empty());

        let requests = completion.requests.lock().unwrap();
        let function = requests[0].function.as_ref().unwrap();
        assert_eq!(function.name, SQL_ANALYSIS_FUNCTION);
        assert!(!requests[0].force_function);
    }

    #[tokio::test]
    async fn test_free_text_becomes_missing_data() {
        let completion = ScriptedCompletion::new(vec![ModelReply::Text(
            "The table has no weather information.".to_string(),
        )]);
        let analysis = request_sql_analysis(&completion, vec![ChatMessage::user("q")])
            .await
            .unwrap();
        assert!(!analysis.has_sql());
        assert_eq!(analysis.missing_data, "The table has no weather information.");
        assert!(analysis.schema.is_empty());
        assert!(!analysis.is_currency);
    }

    #[tokio::test]
    async fn test_never_both_never_neither() {
        let empty_sql = ScriptedCompletion::new(vec![ScriptedCompletion::call(
            SQL_ANALYSIS_FUNCTION,
            json!({"schema": "", "applicability": "", "sql": "  ", "is_currency": false}),
        )]);
        let err = request_sql_analysis(&empty_sql, vec![]).await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { ref raw, .. } if raw.contains("\"sql\"")));

        let empty_text = ScriptedCompletion::new(vec![ModelReply::Text("  ".to_string())]);
        let err = request_sql_analysis(&empty_text, vec![]).await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));

        // A query clears any explanation sent with it
        let both = ScriptedCompletion::new(vec![ScriptedCompletion::call(
            SQL_ANALYSIS_FUNCTION,
            json!({
                "schema": "s", "applicability": "a", "sql": "SELECT 1",
                "is_currency": false, "missing_data": "also this"
            }),
        )]);
        let analysis = request_sql_analysis(&both, vec![]).await.unwrap();
        assert!(analysis.has_sql());
        assert!(analysis.missing_data.is_empty());
    }

    #[tokio::test]
    async fn test_missing_currency_flag_is_malformed() {
        let completion = ScriptedCompletion::new(vec![ScriptedCompletion::call(
            SQL_ANALYSIS_FUNCTION,
            json!({"schema": "s", "applicability": "a", "sql": "SELECT 1"}),
        )]);
        let err = request_sql_analysis(&completion, vec![]).await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { ref message, .. } if message.contains("is_currency")));
    }

    #[tokio::test]
    async fn test_call_with_only_missing_data() {
        let completion = ScriptedCompletion::new(vec![ScriptedCompletion::call(
            SQL_ANALYSIS_FUNCTION,
            json!({"missing_data": "The budget has no ward breakdown."}),
        )]);
        let analysis = request_sql_analysis(&completion, vec![]).await.unwrap();
        assert_eq!(analysis, SqlAnalysis::missing("The budget has no ward breakdown."));

        let requests = completion.requests.lock().unwrap();
        let parameters = &requests[0].function.as_ref().unwrap().parameters;
        assert!(parameters["properties"]["missing_data"].is_object());
    }

    #[tokio::test]
    async fn test_empty_query_falls_back_to_missing_data() {
        let completion = ScriptedCompletion::new(vec![ScriptedCompletion::call(
            SQL_ANALYSIS_FUNCTION,
            json!({
                "schema": "s", "applicability": "a", "sql": "",
                "is_currency": false, "missing_data": "no wards"
            }),
        )]);
        let analysis = request_sql_analysis(&completion, vec![]).await.unwrap();
        assert!(!analysis.has_sql());
        assert_eq!(analysis.missing_data, "no wards");
        assert!(analysis.schema.is_empty());
    }

    #[tokio::test]
    async fn test_blank_explanation_keeps_arguments() {
        let arguments = json!({"missing_data": "  "});
        let completion = ScriptedCompletion::new(vec![ScriptedCompletion::call(
            SQL_ANALYSIS_FUNCTION,
            arguments.clone(),
        )]);
        let err = request_sql_analysis(&completion, vec![]).await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { ref raw, .. } if *raw == arguments.to_string()));
    }

    #[tokio::test]
    async fn test_null_explanation_beside_query() {
        let completion = ScriptedCompletion::new(vec![ScriptedCompletion::call(
            SQL_ANALYSIS_FUNCTION,
            json!({
                "schema": "s", "applicability": "a", "sql": "SELECT 1",
                "is_currency": true, "missing_data": null
            }),
        )]);
        let analysis = request_sql_analysis(&completion, vec![]).await.unwrap();
        assert_eq!(analysis.sql, "SELECT 1");
        assert!(analysis.missing_data.is_empty());
    }

    #[tokio::test]
    async fn test_query_beside_explanation_needs_currency_flag() {
        let completion = ScriptedCompletion::new(vec![ScriptedCompletion::call(
            SQL_ANALYSIS_FUNCTION,
            json!({"sql": "SELECT 1", "missing_data": "partial"}),
        )]);
        let err = request_sql_analysis(&completion, vec![]).await.unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedResponse { ref message, ref raw } if message.contains("is_currency") && raw.contains("partial")
        ));
    }
}
