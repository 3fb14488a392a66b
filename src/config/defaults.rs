//! Default values for configuration

/// Default OpenAI-compatible API base URL
pub fn default_api_url() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1/".to_string())
}

/// Default environment variable holding the API key
pub fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Default embedding model
pub fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

/// Default embedding request timeout in seconds
pub fn default_embedding_timeout() -> u64 {
    30
}

/// Cool-down after a rate limit: the provider asks for 20s, one more for margin
pub fn default_rate_limit_cooldown() -> u64 {
    21
}

/// Default number of retries after a rate limit
pub fn default_rate_limit_retries() -> u32 {
    1
}

/// Default completion model
pub fn default_completion_model() -> String {
    "gpt-3.5-turbo".to_string()
}

/// Default sampling temperature; low keeps SQL generation literal
pub fn default_temperature() -> f32 {
    0.1
}

/// Default completion request timeout in seconds
pub fn default_completion_timeout() -> u64 {
    60
}

/// Default number of candidate tables fetched per question
pub fn default_index_candidates() -> usize {
    2
}

/// Default maximum cosine distance for a table to be considered relevant
pub fn default_index_max_distance() -> f32 {
    0.5
}

/// Default analytical database file
pub fn default_data_file() -> String {
    "toronto.db".to_string()
}

/// Default query timeout in seconds
pub fn default_query_timeout() -> u64 {
    30
}

/// Phrases the model tends to emit with an unescaped apostrophe
pub fn default_sanitizer_phrases() -> Vec<String> {
    vec![
        "Children's Services".to_string(),
        "Mayor's Office".to_string(),
    ]
}

/// Default table catalog file
pub fn default_catalog_file() -> String {
    "tables.toml".to_string()
}

/// Default prompt template directory
pub fn default_prompts_dir() -> String {
    "prompts".to_string()
}

/// Default query log database
pub fn default_query_log_file() -> String {
    "queries.db".to_string()
}

/// Default chart export directory
pub fn default_export_dir() -> String {
    "exports".to_string()
}
