//! Chart presentation
//!
//! A [`ChartSelection`] is turned into an artifact by a [`ChartRenderer`] and
//! handed to a [`Publisher`], which returns a locator for the result. Chart
//! types without a renderer come back as [`ChartOutcome::Unsupported`].

use crate::analysis::{ChartKind, ChartSelection};
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

/// A rendered chart, ready to publish
#[derive(Debug, Clone, PartialEq)]
pub struct ChartArtifact {
    pub content_type: String,
    pub extension: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct PublishMetadata {
    pub title: String,
    /// Explanatory text shown next to the chart
    pub body: String,
    pub query_id: Option<i64>,
}

pub trait ChartRenderer: Send + Sync {
    fn supports(&self, kind: ChartKind) -> bool;

    fn render(&self, selection: &ChartSelection) -> Result<ChartArtifact>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Store the artifact and return where it can be found
    async fn publish(&self, artifact: &ChartArtifact, metadata: &PublishMetadata) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChartOutcome {
    Published { locator: String },
    Unsupported { chart: String },
}

/// Render and publish `selection`, or report that its chart type is unsupported
pub async fn present_chart(
    selection: &ChartSelection,
    body: &str,
    query_id: Option<i64>,
    renderer: &dyn ChartRenderer,
    publisher: &dyn Publisher,
) -> Result<ChartOutcome> {
    let supported = selection.kind().filter(|k| renderer.supports(*k));
    if supported.is_none() {
        warn!(chart = %selection.chart, "Unsupported chart type");
        return Ok(ChartOutcome::Unsupported {
            chart: selection.chart.clone(),
        });
    }

    let artifact = renderer.render(selection)?;
    let metadata = PublishMetadata {
        title: selection.title.clone(),
        body: body.to_string(),
        query_id,
    };
    let locator = publisher.publish(&artifact, &metadata).await?;
    info!(chart = %selection.chart, locator = %locator, "Published chart");
    Ok(ChartOutcome::Published { locator })
}

#[derive(Serialize)]
struct ChartSpec<'a> {
    #[serde(rename = "type")]
    chart: &'a str,
    title: &'a str,
    is_currency: bool,
    data: &'a [crate::analysis::DataPoint],
}

/// Emits the chart as a JSON document for an external plotting front end
#[derive(Debug, Clone, Default)]
pub struct SpecRenderer;

impl ChartRenderer for SpecRenderer {
    fn supports(&self, _kind: ChartKind) -> bool {
        true
    }

    fn render(&self, selection: &ChartSelection) -> Result<ChartArtifact> {
        let spec = ChartSpec {
            chart: &selection.chart,
            title: &selection.title,
            is_currency: selection.is_currency,
            data: &selection.data,
        };
        Ok(ChartArtifact {
            content_type: "application/json".to_string(),
            extension: "json".to_string(),
            bytes: serde_json::to_vec_pretty(&spec)?,
        })
    }
}

/// Writes artifacts into a local export directory
#[derive(Debug, Clone)]
pub struct DirectoryPublisher {
    dir: PathBuf,
    url_prefix: String,
}

impl DirectoryPublisher {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            url_prefix: "/exports".to_string(),
        }
    }

    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }
}

/// Lowercase ASCII slug of `title`, suffixed with a short unique id
fn slug(title: &str) -> String {
    let mut out = String::new();
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
        if out.len() >= 48 {
            break;
        }
    }
    let stem = out.trim_end_matches('-');
    let id = Uuid::new_v4().simple().to_string();
    if stem.is_empty() {
        format!("chart-{}", &id[..8])
    } else {
        format!("{}-{}", stem, &id[..8])
    }
}

#[async_trait]
impl Publisher for DirectoryPublisher {
    async fn publish(&self, artifact: &ChartArtifact, metadata: &PublishMetadata) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = slug(&metadata.title);

        let file = format!("{}.{}", name, artifact.extension);
        tokio::fs::write(self.dir.join(&file), &artifact.bytes).await?;
        if !metadata.body.is_empty() {
            tokio::fs::write(self.dir.join(format!("{}.txt", name)), &metadata.body).await?;
        }

        Ok(format!("{}/{}", self.url_prefix, file))
    }
}
