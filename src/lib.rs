//! cityquery: natural-language questions over a municipal open-data corpus.
//!
//! A question is matched to a catalogued table through a semantic index,
//! translated into SQL by a language model, executed against a local SQLite
//! store and finally reshaped into a chart specification.

pub mod analysis;
pub mod assistant;
pub mod catalog;
pub mod chart;
pub mod commands;
pub mod config;
pub mod embed;
pub mod error;
pub mod index;
pub mod llm;
pub mod progress;
pub mod prompt;
pub mod querylog;
pub mod sanitize;
pub mod store;
