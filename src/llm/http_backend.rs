use super::{ChatMessage, CompletionRequest, CompletionService, FunctionCall, FunctionSpec, ModelReply};
use crate::config::CompletionConfig;
use crate::embed::parse_base_url;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    functions: Vec<&'a FunctionSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionChoice<'a>>,
}

#[derive(Debug, Serialize)]
struct FunctionChoice<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

/// OpenAI-compatible `/chat/completions` client
pub struct HttpCompletion {
    client: Client,
    base_url: Url,
    model_id: String,
    temperature: f32,
    api_key: Option<String>,
}

impl HttpCompletion {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let base_url = parse_base_url(&config.url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url,
            model_id: config.model.clone(),
            temperature: config.temperature,
            api_key: config.api_key(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid completion backend URL: {}", e)))
    }
}

#[async_trait]
impl CompletionService for HttpCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<ModelReply> {
        let url = self.endpoint("chat/completions")?;
        let function_call = match (&request.function, request.force_function) {
            (Some(f), true) => Some(FunctionChoice { name: &f.name }),
            _ => None,
        };
        let body = ChatRequest {
            model: &self.model_id,
            messages: &request.messages,
            temperature: self.temperature,
            functions: request.function.iter().collect(),
            function_call,
        };

        let mut http = self.client.post(url).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        debug!(
            model = %self.model_id,
            messages = request.messages.len(),
            "Sending chat completion request"
        );
        let response = http
            .send()
            .await
            .map_err(|e| Error::Completion(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Completion(format!(
                "Completion backend returned {}: {}",
                status, text
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Completion(format!("Invalid completion response: {}", e)))?;
        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| Error::Completion("Completion response had no choices".to_string()))?;

        Ok(match message.function_call {
            Some(call) => ModelReply::FunctionCall(call),
            None => ModelReply::Text(message.content.unwrap_or_default()),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
