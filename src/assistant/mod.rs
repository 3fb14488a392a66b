//! Question answering pipeline
//!
//! [`Assistant`] owns everything that is built once at startup (catalog,
//! semantic index, prompt templates, model clients, data store) and runs a
//! question through table selection, SQL analysis, execution and optionally
//! chart selection. Nothing it holds is mutated after construction, so one
//! instance can serve concurrent questions.

use crate::analysis::{request_chart, request_sql_analysis, ChartSelection, SqlAnalysis};
use crate::catalog::{TableCatalog, TableDescriptor};
use crate::config::Config;
use crate::embed::{create_embedder, Embedder, RetryPolicy};
use crate::error::{Error, Result};
use crate::index::{SearchParams, SemanticIndex};
use crate::llm::{create_completion, ChatMessage, CompletionService};
use crate::prompt::PromptRenderer;
use crate::sanitize::{PhraseSanitizer, SqlSanitizer};
use crate::store::{DataStore, ResultTable};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// External services the pipeline talks to
pub struct Services {
    pub embedder: Box<dyn Embedder>,
    pub completion: Box<dyn CompletionService>,
    pub store: DataStore,
    pub sanitizer: Box<dyn SqlSanitizer>,
}

/// Search and timeout settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub search: SearchParams,
    /// Retry policy used while embedding the catalog
    pub build_retry: RetryPolicy,
    pub embedding_timeout: Duration,
    pub completion_timeout: Duration,
    pub query_timeout: Duration,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        let policy = RetryPolicy::from_config(&config.embedding);
        let query_retry = if config.embedding.retry_at_query_time {
            policy
        } else {
            RetryPolicy::none()
        };

        // Leave room for the cool-down when question embeddings may be retried
        let embedding_timeout = Duration::from_secs(config.embedding.timeout_secs)
            + query_retry.cooldown * query_retry.max_retries;

        Self {
            search: SearchParams {
                k: config.index.candidates,
                max_distance: config.index.max_distance,
                retry: query_retry,
            },
            build_retry: policy,
            embedding_timeout,
            completion_timeout: Duration::from_secs(config.completion.timeout_secs),
            query_timeout: Duration::from_secs(config.database.query_timeout_secs),
        }
    }
}

/// Per-question state: the question, the date it was asked, the chosen table
/// and the conversation rendered for it
#[derive(Debug, Clone)]
pub struct QuestionContext<'a> {
    pub question: String,
    pub date: NaiveDate,
    pub table: &'a TableDescriptor,
    pub messages: Vec<ChatMessage>,
}

/// Result of running a question through the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub table: String,
    pub analysis: SqlAnalysis,
    /// SQL as executed, after sanitizing
    pub executed_sql: Option<String>,
    pub results: Option<ResultTable>,
}

impl Answer {
    /// True when the model explained what data is missing instead of querying
    pub fn is_missing_data(&self) -> bool {
        !self.analysis.has_sql()
    }
}

/// Run `fut`, failing with [`Error::Timeout`] once `limit` elapses
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            secs: limit.as_secs(),
        }),
    }
}

pub struct Assistant {
    catalog: TableCatalog,
    index: SemanticIndex,
    renderer: PromptRenderer,
    services: Services,
    settings: Settings,
}

impl Assistant {
    pub fn new(
        catalog: TableCatalog,
        index: SemanticIndex,
        renderer: PromptRenderer,
        services: Services,
        settings: Settings,
    ) -> Self {
        Self {
            catalog,
            index,
            renderer,
            services,
            settings,
        }
    }

    /// Embed the catalog and assemble the assistant
    pub async fn build(
        catalog: TableCatalog,
        renderer: PromptRenderer,
        services: Services,
        settings: Settings,
    ) -> Result<Self> {
        let index =
            SemanticIndex::build(&catalog, services.embedder.as_ref(), settings.build_retry).await?;
        Ok(Self::new(catalog, index, renderer, services, settings))
    }

    /// Load everything named by `config` and build the index
    pub async fn start(config: &Config) -> Result<Self> {
        let catalog = TableCatalog::load(&config.paths.catalog_file)?;
        info!(
            "Loaded {} tables from {:?}",
            catalog.len(),
            config.paths.catalog_file
        );
        let renderer = PromptRenderer::load(&config.paths.prompts_dir)?;
        let services = Services {
            embedder: create_embedder(&config.embedding)?,
            completion: create_completion(&config.completion)?,
            store: DataStore::open(&config.paths.data_file).await?,
            sanitizer: Box::new(PhraseSanitizer::from_config(&config.sanitizer)),
        };
        Self::build(catalog, renderer, services, Settings::from_config(config)).await
    }

    pub fn catalog(&self) -> &TableCatalog {
        &self.catalog
    }

    pub fn index(&self) -> &SemanticIndex {
        &self.index
    }

    /// Nearest catalogued table for `question`
    pub async fn select_table(&self, question: &str) -> Result<&TableDescriptor> {
        with_timeout(
            "question embedding",
            self.settings.embedding_timeout,
            self.index.select_table(
                &self.catalog,
                self.services.embedder.as_ref(),
                question,
                &self.settings.search,
            ),
        )
        .await
    }

    /// Select a table and render the SQL conversation for it
    pub async fn context(&self, question: &str, date: NaiveDate) -> Result<QuestionContext<'_>> {
        let table = self.select_table(question).await?;
        let messages = self.renderer.render_sql_messages(table, date, question)?;
        Ok(QuestionContext {
            question: question.to_string(),
            date,
            table,
            messages,
        })
    }

    pub async fn sql_analysis(&self, context: &QuestionContext<'_>) -> Result<SqlAnalysis> {
        with_timeout(
            "SQL analysis",
            self.settings.completion_timeout,
            request_sql_analysis(self.services.completion.as_ref(), context.messages.clone()),
        )
        .await
    }

    /// Sanitize and run `sql`; returns the executed SQL alongside the results
    pub async fn load_results(&self, sql: &str, is_currency: bool) -> Result<(String, ResultTable)> {
        let sanitized = self.services.sanitizer.sanitize(sql);
        if sanitized != sql {
            debug!(before = %sql, after = %sanitized, "Sanitized query");
        }
        let results = with_timeout(
            "query execution",
            self.settings.query_timeout,
            self.services.store.execute(&sanitized, is_currency),
        )
        .await?;
        Ok((sanitized, results))
    }

    /// Ask the model to chart a formatted result table
    pub async fn select_chart(&self, question: &str, results: &str) -> Result<ChartSelection> {
        let prompt = self.renderer.render_chart_prompt(question, results)?;
        with_timeout(
            "chart selection",
            self.settings.completion_timeout,
            request_chart(self.services.completion.as_ref(), prompt),
        )
        .await
    }

    /// Answer `question` as of today
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        self.answer_on(question, Local::now().date_naive()).await
    }

    /// Answer `question` as if asked on `date`
    pub async fn answer_on(&self, question: &str, date: NaiveDate) -> Result<Answer> {
        let context = self.context(question, date).await?;
        let analysis = self.sql_analysis(&context).await?;

        if !analysis.has_sql() {
            info!(table = %context.table.name, "No query written: {}", analysis.missing_data);
            return Ok(Answer {
                question: context.question,
                table: context.table.name.clone(),
                analysis,
                executed_sql: None,
                results: None,
            });
        }

        let (executed_sql, results) = self
            .load_results(&analysis.sql, analysis.is_currency)
            .await?;
        info!(
            table = %context.table.name,
            rows = results.row_count(),
            "Answered question"
        );

        Ok(Answer {
            question: context.question,
            table: context.table.name.clone(),
            analysis,
            executed_sql: Some(executed_sql),
            results: Some(results),
        })
    }

    pub async fn close(&self) {
        self.services.store.close().await;
    }
}
