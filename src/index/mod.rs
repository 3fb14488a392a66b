//! Semantic index over table descriptions
//!
//! Built once at startup from the embedding text of every catalogued table,
//! then frozen. Lookups are exact cosine-distance scans, which is plenty for a
//! catalog of tens of tables and keeps results deterministic.

use crate::catalog::{TableCatalog, TableDescriptor};
use crate::embed::{embed_one, Embedder, RetryPolicy};
use crate::error::{Error, Result};
use crate::progress::index_progress;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

/// A table returned by a lookup with its cosine distance to the query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub table: String,
    pub distance: f32,
}

#[derive(Debug, Clone)]
struct IndexedVector {
    table: String,
    vector: Vec<f32>,
    norm: f64,
}

/// Lookup parameters for table selection
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    /// Neighbors fetched per lookup; only the nearest is selected
    pub k: usize,
    pub max_distance: f32,
    pub retry: RetryPolicy,
}

/// Read-only nearest-neighbor index, one vector per table
#[derive(Debug, Clone)]
pub struct SemanticIndex {
    entries: Vec<IndexedVector>,
    dimension: usize,
}

fn l2_norm(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|v| (*v as f64) * (*v as f64))
        .sum::<f64>()
        .sqrt()
}

impl SemanticIndex {
    /// Build from precomputed vectors, in insertion order.
    ///
    /// All vectors must be non-empty and share one dimension; table names must be unique.
    pub fn from_vectors(vectors: Vec<(String, Vec<f32>)>) -> Result<Self> {
        let dimension = match vectors.first() {
            Some((_, v)) => v.len(),
            None => {
                return Err(Error::Config(
                    "Cannot build a semantic index without tables".to_string(),
                ))
            }
        };

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(vectors.len());
        for (table, vector) in vectors {
            if vector.is_empty() {
                return Err(Error::Config(format!(
                    "Empty embedding vector for table '{}'",
                    table
                )));
            }
            if vector.len() != dimension {
                return Err(Error::Config(format!(
                    "Embedding dimension mismatch for table '{}': expected {}, got {}",
                    table,
                    dimension,
                    vector.len()
                )));
            }
            if !seen.insert(table.clone()) {
                return Err(Error::Config(format!(
                    "Table '{}' indexed twice",
                    table
                )));
            }
            let norm = l2_norm(&vector);
            entries.push(IndexedVector {
                table,
                vector,
                norm,
            });
        }

        Ok(Self { entries, dimension })
    }

    /// Embed every table in the catalog and build the index.
    ///
    /// Any embedding failure that survives `retry` aborts the build.
    pub async fn build(
        catalog: &TableCatalog,
        embedder: &dyn Embedder,
        retry: RetryPolicy,
    ) -> Result<Self> {
        info!(
            "Building semantic index for {} tables with model '{}'",
            catalog.len(),
            embedder.model_name()
        );

        let progress = index_progress(catalog.len() as u64);

        let mut vectors = Vec::with_capacity(catalog.len());
        for table in catalog.iter() {
            let vector = embed_one(embedder, &table.embedding_text(), retry).await?;
            debug!(table = %table.name, dimension = vector.len(), "Embedded table");
            vectors.push((table.name.clone(), vector));
            progress.inc(1);
        }
        progress.finish_and_clear();

        let index = Self::from_vectors(vectors)?;
        info!(
            "Semantic index ready: {} tables, dimension {}",
            index.len(),
            index.dimension()
        );
        Ok(index)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Up to `k` nearest tables within `max_distance`, nearest first.
    ///
    /// Equal distances keep insertion order. Fails with [`Error::EmptyResult`]
    /// when nothing is close enough.
    pub fn query(&self, vector: &[f32], k: usize, max_distance: f32) -> Result<Vec<Neighbor>> {
        if vector.len() != self.dimension {
            return Err(Error::embedding(format!(
                "Query vector has dimension {}, index expects {}",
                vector.len(),
                self.dimension
            )));
        }
        if k == 0 {
            return Err(Error::Config("Neighbor count must be at least 1".to_string()));
        }

        let query_norm = l2_norm(vector);
        let mut neighbors: Vec<Neighbor> = self
            .entries
            .iter()
            .map(|entry| Neighbor {
                table: entry.table.clone(),
                distance: cosine_distance(&entry.vector, entry.norm, vector, query_norm),
            })
            .filter(|n| n.distance <= max_distance)
            .collect();

        // stable sort: ties stay in insertion order
        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        neighbors.truncate(k);

        if neighbors.is_empty() {
            return Err(Error::EmptyResult { max_distance });
        }
        Ok(neighbors)
    }

    /// Embed `question` and return the nearest catalogued table.
    pub async fn select_table<'a>(
        &self,
        catalog: &'a TableCatalog,
        embedder: &dyn Embedder,
        question: &str,
        params: &SearchParams,
    ) -> Result<&'a TableDescriptor> {
        let vector = embed_one(embedder, question, params.retry).await?;
        let neighbors = self.query(&vector, params.k, params.max_distance)?;

        for neighbor in &neighbors {
            info!(
                table = %neighbor.table,
                distance = neighbor.distance,
                "Table candidate"
            );
        }

        let best = &neighbors[0];
        catalog.get(&best.table).ok_or_else(|| {
            Error::Config(format!(
                "Indexed table '{}' is missing from the catalog",
                best.table
            ))
        })
    }
}

/// Cosine distance in [0, 2]; zero-magnitude vectors are orthogonal to everything
fn cosine_distance(a: &[f32], norm_a: f64, b: &[f32], norm_b: f64) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    let similarity = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0);
    (1.0 - similarity) as f32
}
