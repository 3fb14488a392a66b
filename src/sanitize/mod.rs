//! SQL sanitizing
//!
//! Generated SQL occasionally contains proper nouns with a bare apostrophe
//! inside a string literal (`'Children's Services'`). The sanitizer doubles
//! the apostrophe for each known phrase and leaves everything else untouched.

use crate::config::SanitizerConfig;

pub trait SqlSanitizer: Send + Sync {
    fn sanitize(&self, sql: &str) -> String;
}

/// Escapes apostrophes in a fixed list of literal phrases
#[derive(Debug, Clone)]
pub struct PhraseSanitizer {
    replacements: Vec<(String, String)>,
}

impl PhraseSanitizer {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let replacements = phrases
            .into_iter()
            .map(Into::into)
            .filter(|p| p.contains('\''))
            .map(|p| {
                let escaped = p.replace('\'', "''");
                (p, escaped)
            })
            .collect();
        Self { replacements }
    }

    pub fn from_config(config: &SanitizerConfig) -> Self {
        Self::new(config.phrases.iter().cloned())
    }
}

impl SqlSanitizer for PhraseSanitizer {
    fn sanitize(&self, sql: &str) -> String {
        let mut out = sql.to_string();
        for (phrase, escaped) in &self.replacements {
            // Collapse already-escaped occurrences first so nothing is escaped twice
            out = out.replace(escaped.as_str(), phrase).replace(phrase.as_str(), escaped);
        }
        out
    }
}
