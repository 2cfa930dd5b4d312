// ABOUTME: LLM-generated post descriptions over an OpenAI-compatible chat API
// ABOUTME: Supports OpenAI-style endpoints and a local Ollama server

use crate::model::{LlmOptions, LlmProvider};
use crate::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

pub const OLLAMA_DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const OLLAMA_DEFAULT_MODEL: &str = "llama2";

pub fn description_prompt(title: &str, markdown: &str) -> String {
    format!(
        "The following is a blog post titled \"{}\" with the content:\n\n{}\n\nThe description of the post is:",
        title, markdown
    )
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// A short description of the post, trimmed.
    async fn summarize(&self, title: &str, markdown: &str) -> Result<String>;
}

/// Resolved endpoint settings for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
}

impl Endpoint {
    pub fn from_options(options: &LlmOptions) -> Result<Self> {
        let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(String::from);

        match options.provider {
            LlmProvider::OpenAi => {
                let api_key = non_empty(&options.api_key).unwrap_or_else(|| {
                    warn!("No key for an OpenAI-compatible API was provided");
                    String::new()
                });
                match (non_empty(&options.base_url), non_empty(&options.model)) {
                    (Some(base), Some(model)) => Ok(Endpoint {
                        api_base: base.trim_end_matches('/').to_string(),
                        api_key,
                        model,
                    }),
                    _ => Err(Error::Config(
                        "OpenAI base URL and model are required".into(),
                    )),
                }
            }
            LlmProvider::Ollama => {
                let base =
                    non_empty(&options.base_url).unwrap_or_else(|| OLLAMA_DEFAULT_BASE_URL.into());
                Ok(Endpoint {
                    // Ollama serves the OpenAI-compatible API under /v1
                    api_base: format!("{}/v1", base.trim_end_matches('/')),
                    api_key: "ollama".into(),
                    model: non_empty(&options.model).unwrap_or_else(|| OLLAMA_DEFAULT_MODEL.into()),
                })
            }
        }
    }
}

#[cfg(feature = "summaries")]
mod chat {
    use super::*;
    use async_openai::{
        config::OpenAIConfig,
        types::{ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
        Client,
    };

    pub struct ChatSummarizer {
        client: Client<OpenAIConfig>,
        model: String,
    }

    impl ChatSummarizer {
        pub fn new(endpoint: Endpoint) -> Self {
            let config = OpenAIConfig::new()
                .with_api_base(endpoint.api_base)
                .with_api_key(endpoint.api_key);
            ChatSummarizer {
                client: Client::with_config(config),
                model: endpoint.model,
            }
        }
    }

    #[async_trait]
    impl Summarizer for ChatSummarizer {
        async fn summarize(&self, title: &str, markdown: &str) -> Result<String> {
            let prompt = description_prompt(title, markdown);
            let messages = vec![ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()
                    .map_err(|e| {
                        Error::Summarization(format!("Failed to build user message: {}", e))
                    })?,
            )];

            let request = CreateChatCompletionRequestArgs::default()
                .model(self.model.as_str())
                .messages(messages)
                .build()
                .map_err(|e| Error::Summarization(format!("Failed to build request: {}", e)))?;

            let response = self
                .client
                .chat()
                .create(request)
                .await
                .map_err(|e| Error::Summarization(format!("LLM API error: {}", e)))?;

            let description = response
                .choices
                .first()
                .and_then(|choice| choice.message.content.clone())
                .ok_or_else(|| Error::Summarization("No response from the LLM".into()))?;

            let description = description.trim().to_string();
            debug!(%description, "Generated description");
            Ok(description)
        }
    }
}

#[cfg(feature = "summaries")]
pub use chat::ChatSummarizer;

pub fn summarizer_for(options: &LlmOptions) -> Result<Box<dyn Summarizer>> {
    let endpoint = Endpoint::from_options(options)?;

    #[cfg(feature = "summaries")]
    {
        Ok(Box::new(ChatSummarizer::new(endpoint)))
    }

    #[cfg(not(feature = "summaries"))]
    {
        let _ = endpoint;
        Err(Error::Summarization(
            "description generation requires the `summaries` feature".into(),
        ))
    }
}
