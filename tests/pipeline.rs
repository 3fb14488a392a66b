//! End-to-end: question -> table -> SQL -> formatted results -> chart

use async_trait::async_trait;
use chrono::NaiveDate;
use cityquery::analysis::{CHART_FUNCTION, SQL_ANALYSIS_FUNCTION};
use cityquery::assistant::{Assistant, Services, Settings};
use cityquery::catalog::TableCatalog;
use cityquery::chart::{present_chart, ChartOutcome, DirectoryPublisher, SpecRenderer};
use cityquery::embed::{Embedder, RetryPolicy};
use cityquery::error::{Error, Result};
use cityquery::index::SearchParams;
use cityquery::llm::{CompletionRequest, CompletionService, FunctionCall, ModelReply, Role};
use cityquery::prompt::PromptRenderer;
use cityquery::querylog::{QueryLog, QueryRecord};
use cityquery::sanitize::PhraseSanitizer;
use cityquery::store::DataStore;
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const CATALOG: &str = r#"
[[tables]]
name = "operating_budget"
description = "Toronto City annual operating budget by program and category"
schema = "CREATE TABLE operating_budget (program TEXT, category TEXT, year INTEGER, amount REAL)"

[tables.enums]
program = ["Parks, Forestry & Recreation", "Children's Services"]
"#;

/// Every text maps to the same direction, so the single table is always nearest
struct ConstantEmbedder;

#[async_trait]
impl Embedder for ConstantEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.3, 0.4, 0.5]).collect())
    }

    fn model_name(&self) -> &str {
        "constant"
    }
}

type Requests = Arc<Mutex<Vec<CompletionRequest>>>;

/// Replays replies in order and keeps every request
struct Replay {
    replies: Mutex<Vec<ModelReply>>,
    requests: Requests,
}

impl Replay {
    fn new(mut replies: Vec<ModelReply>) -> (Self, Requests) {
        replies.reverse();
        let requests = Requests::default();
        let replay = Self {
            replies: Mutex::new(replies),
            requests: requests.clone(),
        };
        (replay, requests)
    }
}

#[async_trait]
impl CompletionService for Replay {
    async fn complete(&self, request: CompletionRequest) -> Result<ModelReply> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| Error::Completion("no more replies".to_string()))
    }

    fn model_name(&self) -> &str {
        "replay"
    }
}

fn call(name: &str, arguments: serde_json::Value) -> ModelReply {
    ModelReply::FunctionCall(FunctionCall {
        name: name.to_string(),
        arguments: arguments.to_string(),
    })
}

async fn fixture(tmp: &TempDir) -> DataStore {
    let path = tmp.path().join("toronto.db");
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(&path)
                .create_if_missing(true),
        )
        .await
        .unwrap();
    sqlx::query(
        "CREATE TABLE operating_budget (program TEXT, category TEXT, year INTEGER, amount REAL)",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO operating_budget VALUES
            ('Parks, Forestry & Recreation', 'Salaries and Benefits', 2022, 1000.0),
            ('Parks, Forestry & Recreation', 'Materials & Supplies', 2022, 234.5),
            ('Parks, Forestry & Recreation', 'Salaries and Benefits', 2021, 900.0),
            ('Children''s Services', 'Salaries and Benefits', 2022, 5000.0)",
    )
    .execute(&pool)
    .await
    .unwrap();
    pool.close().await;
    DataStore::open(&path).await.unwrap()
}

fn settings() -> Settings {
    Settings {
        search: SearchParams {
            k: 2,
            max_distance: 0.5,
            retry: RetryPolicy::none(),
        },
        build_retry: RetryPolicy::none(),
        embedding_timeout: Duration::from_secs(5),
        completion_timeout: Duration::from_secs(5),
        query_timeout: Duration::from_secs(5),
    }
}

async fn assistant(tmp: &TempDir, replay: Replay) -> Assistant {
    let services = Services {
        embedder: Box::new(ConstantEmbedder),
        completion: Box::new(replay),
        store: fixture(tmp).await,
        sanitizer: Box::new(PhraseSanitizer::new(["Children's Services"])),
    };
    Assistant::build(
        TableCatalog::from_toml(CATALOG).unwrap(),
        PromptRenderer::builtin().unwrap(),
        services,
        settings(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn parks_spending_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let (replay, requests) = Replay::new(vec![
        call(
            SQL_ANALYSIS_FUNCTION,
            json!({
                "schema": "program, year and amount identify Parks spending",
                "applicability": "The operating budget lists Parks, Forestry & Recreation expenses by year",
                "sql": "SELECT program, SUM(amount) AS total FROM operating_budget WHERE program = 'Parks, Forestry & Recreation' AND year = 2022 GROUP BY program;",
                "is_currency": true
            }),
        ),
        call(
            CHART_FUNCTION,
            json!({
                "type": "bar",
                "title": "Parks spending in 2022",
                "data": [{"name": "Parks, Forestry & Recreation", "date": 2022, "value": 1234.5}],
                "is_currency": true
            }),
        ),
    ]);
    let assistant = assistant(&tmp, replay).await;
    assert_eq!(assistant.index().len(), 1);

    let question = "What did Parks spend in 2022?";
    let date = NaiveDate::from_ymd_opt(2023, 6, 5).unwrap();
    let answer = assistant.answer_on(question, date).await.unwrap();

    // (1) the only table is selected
    assert_eq!(answer.table, "operating_budget");

    // (2) the SQL references the table and filters on the year
    assert!(answer.analysis.sql.contains("operating_budget"));
    assert!(answer.analysis.sql.contains("year = 2022"));
    assert!(answer.analysis.missing_data.is_empty());

    // (3) and (4) the query ran and amounts carry the currency prefix
    let results = answer.results.clone().unwrap();
    assert_eq!(results.columns[0].to_string(), "program (TEXT)");
    assert_eq!(
        results.rows,
        vec![vec![
            "Parks, Forestry & Recreation".to_string(),
            "$1,234.50".to_string()
        ]]
    );

    // The model saw the table schema and the question
    {
        let requests = requests.lock().unwrap();
        let messages = &requests[0].messages;
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("CREATE TABLE operating_budget"));
        assert!(messages[0].content.contains("June 5, 2023"));
        assert_eq!(messages.last().unwrap().content, question);
    }

    // The answer can be logged and charted
    let log = QueryLog::open(&tmp.path().join("queries.db")).await.unwrap();
    log.init_schema().await.unwrap();
    let results_text = results.to_string();
    let id = log
        .store(&QueryRecord::new(
            "tester",
            "cli",
            question,
            &answer.table,
            &answer.analysis,
            &results_text,
        ))
        .await
        .unwrap();
    assert_eq!(log.fetch(id).await.unwrap().unwrap().results, results_text);

    let selection = assistant.select_chart(question, &results_text).await.unwrap();
    {
        let requests = requests.lock().unwrap();
        assert!(requests[1].force_function);
        assert!(requests[1].messages[0].content.contains("$1,234.50"));
    }

    let publisher = DirectoryPublisher::new(tmp.path().join("exports"));
    let outcome = present_chart(&selection, question, Some(id), &SpecRenderer, &publisher)
        .await
        .unwrap();
    assert!(matches!(outcome, ChartOutcome::Published { ref locator } if locator.ends_with(".json")));
}

#[tokio::test]
async fn missing_data_is_an_answer() {
    let tmp = TempDir::new().unwrap();
    let (replay, _) = Replay::new(vec![ModelReply::Text(
        "The operating budget does not record weather.".to_string(),
    )]);
    let assistant = assistant(&tmp, replay).await;

    let answer = assistant
        .answer("Will it rain tomorrow?")
        .await
        .unwrap();
    assert!(answer.is_missing_data());
    assert!(answer.analysis.sql.is_empty());
    assert!(answer.results.is_none());
}

#[tokio::test]
async fn no_rows_is_distinguished() {
    let tmp = TempDir::new().unwrap();
    let (replay, _) = Replay::new(vec![call(
        SQL_ANALYSIS_FUNCTION,
        json!({
            "schema": "s",
            "applicability": "a",
            "sql": "SELECT amount FROM operating_budget WHERE year = 1999",
            "is_currency": true
        }),
    )]);
    let assistant = assistant(&tmp, replay).await;

    let err = assistant.answer("What did Parks spend in 1999?").await.unwrap_err();
    assert!(matches!(err, Error::NoRows { ref sql } if sql.contains("1999")));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn unknown_chart_type_is_not_an_error() {
    let tmp = TempDir::new().unwrap();
    let (replay, _) = Replay::new(vec![call(
        CHART_FUNCTION,
        json!({
            "type": "scatter",
            "title": "Spending",
            "data": [{"name": "Parks", "value": 1234.5}],
            "is_currency": true
        }),
    )]);
    let assistant = assistant(&tmp, replay).await;

    let selection = assistant.select_chart("q", "| a |").await.unwrap();
    assert_eq!(selection.chart, "scatter");

    let publisher = DirectoryPublisher::new(tmp.path().join("exports"));
    let outcome = present_chart(&selection, "", None, &SpecRenderer, &publisher)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ChartOutcome::Unsupported {
            chart: "scatter".to_string()
        }
    );
}
