//! Ask command implementation

use crate::analysis::ChartSelection;
use crate::assistant::{Answer, Assistant};
use crate::chart::{present_chart, ChartOutcome, DirectoryPublisher, SpecRenderer};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::querylog::{QueryLog, QueryRecord};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct AskOptions {
    /// Also select and publish a chart
    pub chart: bool,
    /// Store the answer in the query log
    pub log: bool,
    pub user_id: String,
    pub channel_id: String,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            chart: false,
            log: true,
            user_id: std::env::var("USER").unwrap_or_else(|_| "local".to_string()),
            channel_id: "cli".to_string(),
        }
    }
}

/// A chart chosen for a result table and what became of it
#[derive(Debug, Clone, Serialize)]
pub struct ChartReport {
    pub selection: ChartSelection,
    pub outcome: ChartOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskReport {
    pub answer: Answer,
    pub query_id: Option<i64>,
    pub chart: Option<ChartReport>,
}

/// Answer a question end to end
pub async fn cmd_ask(config: &Config, question: &str, options: AskOptions) -> Result<AskReport> {
    let assistant = Assistant::start(config).await?;
    let report = ask_with(&assistant, config, question, &options).await;
    assistant.close().await;
    report
}

/// Run `question` through an already started assistant
pub async fn ask_with(
    assistant: &Assistant,
    config: &Config,
    question: &str,
    options: &AskOptions,
) -> Result<AskReport> {
    info!("Question: {}", question);
    let answer = assistant.answer(question).await?;

    let rendered = answer.results.as_ref().map(|r| r.to_string());
    let Some(results_text) = rendered else {
        return Ok(AskReport {
            answer,
            query_id: None,
            chart: None,
        });
    };

    let query_id = if options.log {
        let log = QueryLog::open(&config.paths.query_log_file).await?;
        log.init_schema().await?;
        let record = QueryRecord::new(
            &options.user_id,
            &options.channel_id,
            question,
            &answer.table,
            &answer.analysis,
            &results_text,
        );
        Some(log.store(&record).await?)
    } else {
        None
    };

    let chart = if options.chart {
        let selection = assistant.select_chart(question, &results_text).await?;
        let body = chart_body(question, &answer.analysis.applicability, &answer.analysis.sql);
        let outcome = publish(config, &selection, &body, query_id).await?;
        Some(ChartReport { selection, outcome })
    } else {
        None
    };

    Ok(AskReport {
        answer,
        query_id,
        chart,
    })
}

pub(crate) fn chart_body(question: &str, applicability: &str, sql: &str) -> String {
    format!("{}\n\n{}\n\nSQL: {}", question, applicability, sql)
}

pub(crate) async fn publish(
    config: &Config,
    selection: &ChartSelection,
    body: &str,
    query_id: Option<i64>,
) -> Result<ChartOutcome> {
    let publisher = DirectoryPublisher::new(config.paths.export_dir.clone());
    let outcome = present_chart(selection, body, query_id, &SpecRenderer, &publisher).await?;
    if let ChartOutcome::Unsupported { chart } = &outcome {
        warn!("Model asked for an unsupported '{}' chart", chart);
    }
    Ok(outcome)
}

/// User-facing text for errors that are not failures of the tool itself
pub fn friendly_message(err: &Error) -> Option<String> {
    match err {
        Error::EmptyResult { .. } => Some(
            "I couldn't find a dataset that matches your question. Try `cityquery tables` to see what I know about."
                .to_string(),
        ),
        Error::NoRows { sql } => Some(format!(
            "The query ran but found no matching rows.\n\nSQL: {}",
            sql
        )),
        _ => None,
    }
}

pub fn unsupported_chart_message(chart: &str) -> String {
    format!("Ah you need a {} chart, but I can't make those yet", chart)
}

pub(crate) fn print_chart_report(report: &ChartReport) {
    match &report.outcome {
        ChartOutcome::Published { locator } => {
            println!("📈 {} ({} chart)", report.selection.title, report.selection.chart);
            println!("   {}", locator);
        }
        ChartOutcome::Unsupported { chart } => {
            println!("{}", unsupported_chart_message(chart));
        }
    }
}

/// Print an answer to console
pub fn print_ask_report(report: &AskReport) {
    let answer = &report.answer;
    println!("\n❓ {}\n", answer.question);
    println!("Table: {}", answer.table);

    if answer.is_missing_data() {
        println!("\n{}", answer.analysis.missing_data);
        return;
    }

    println!("\n{}", answer.analysis.schema);
    println!("{}", answer.analysis.applicability);
    if let Some(sql) = &answer.executed_sql {
        println!("\nSQL: {}", sql);
    }
    if let Some(results) = &answer.results {
        println!("\n{}", results);
    }
    if let Some(id) = report.query_id {
        println!("Saved as query #{} (run `cityquery chart {}` to chart it)", id, id);
    }
    if let Some(chart) = &report.chart {
        println!();
        print_chart_report(chart);
    }
}
