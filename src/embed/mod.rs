//! Embedding generation
//!
//! This module provides an abstraction over embedding services with:
//! - A trait for different embedding backends
//! - An OpenAI-compatible HTTP backend
//! - The rate-limit retry policy applied around single-text embeddings

mod http_backend;

pub use http_backend::*;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input in input order.
    ///
    /// Rate-limit responses must surface as [`Error::RateLimited`] so callers can retry.
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// How to react to a rate-limited embedding call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub cooldown: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Fail on the first rate limit
    pub fn none() -> Self {
        Self {
            cooldown: Duration::ZERO,
            max_retries: 0,
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            cooldown: config.cooldown(),
            max_retries: config.rate_limit_retries,
        }
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    let embedder = HttpEmbedder::new(config)?;
    Ok(Box::new(embedder))
}

/// Embed a single text, waiting out rate limits according to `policy`.
///
/// An empty vector from the backend is an error: nothing can be indexed or
/// compared against it.
pub async fn embed_one(embedder: &dyn Embedder, text: &str, policy: RetryPolicy) -> Result<Vec<f32>> {
    let mut attempt = 0;
    loop {
        match embedder.embed(vec![text.to_string()]).await {
            Ok(vectors) => {
                return match vectors.into_iter().next() {
                    Some(vector) if !vector.is_empty() => Ok(vector),
                    _ => Err(Error::embedding(format!(
                        "Model '{}' returned no embedding",
                        embedder.model_name()
                    ))),
                };
            }
            Err(Error::RateLimited(msg)) if attempt < policy.max_retries => {
                attempt += 1;
                warn!(
                    cooldown_secs = policy.cooldown.as_secs(),
                    attempt, "Embedding rate limited ({}), retrying after cool-down", msg
                );
                tokio::time::sleep(policy.cooldown).await;
            }
            Err(e) => return Err(e),
        }
    }
}
