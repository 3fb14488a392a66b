//! Chart command implementation

use super::ask::{chart_body, print_chart_report, publish, ChartReport};
use crate::analysis::request_chart;
use crate::assistant::with_timeout;
use crate::config::Config;
use crate::error::Result;
use crate::llm::create_completion;
use crate::prompt::PromptRenderer;
use crate::querylog::QueryLog;
use std::time::Duration;
use tracing::info;

/// Chart a previously answered question from the query log
pub async fn cmd_chart(config: &Config, query_id: i64) -> Result<ChartReport> {
    let log = QueryLog::open(&config.paths.query_log_file).await?;
    log.init_schema().await?;
    let record = log.get(query_id).await?;
    info!(id = query_id, table = %record.table_name, "Charting stored query");

    let renderer = PromptRenderer::load(&config.paths.prompts_dir)?;
    let completion = create_completion(&config.completion)?;
    let prompt = renderer.render_chart_prompt(&record.question, &record.results)?;

    let selection = with_timeout(
        "chart selection",
        Duration::from_secs(config.completion.timeout_secs),
        request_chart(completion.as_ref(), prompt),
    )
    .await?;

    let body = chart_body(&record.question, &record.applicability, &record.sql_query);
    let outcome = publish(config, &selection, &body, Some(query_id)).await?;
    Ok(ChartReport { selection, outcome })
}

/// Print a chart report to console
pub fn print_chart(report: &ChartReport) {
    print_chart_report(report);
}
