//! Streaming text-generation client for OpenAI-compatible endpoints.
//!
//! Targets oobabooga's text-generation-webui by default, but any
//! OpenAI-compatible chat-completions endpoint works via `base_url`.
//! The assembled prompt goes out as a single user message; streamed text
//! deltas are folded into sentence-granularity chunks before they reach
//! the engine.

pub mod sentence;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest, StopConfiguration,
};
use futures_util::StreamExt;

use banter_core::ports::{SentenceStream, TextGenerator};
use banter_types::config::TextGenConfig;
use banter_types::error::BackendError;

use self::sentence::SentenceAccumulator;

/// Streaming sentence generator backed by an OpenAI-compatible API.
///
/// Does NOT derive Debug: the `async_openai` client holds the API key.
pub struct OpenAiCompatGenerator {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
    temperature: Option<f64>,
    stop_sequences: Vec<String>,
}

impl OpenAiCompatGenerator {
    pub fn new(config: &TextGenConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_base(&config.base_url);
        if let Some(key) = &config.api_key {
            openai_config = openai_config.with_api_key(key);
        }

        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            stop_sequences: config.stop_sequences.clone(),
        }
    }

    fn build_request(&self, prompt: String) -> CreateChatCompletionRequest {
        let mut request = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage {
                    content: ChatCompletionRequestUserMessageContent::Text(prompt),
                    name: None,
                },
            )],
            max_completion_tokens: Some(self.max_tokens),
            temperature: self.temperature.map(|t| t as f32),
            stream: Some(true),
            ..Default::default()
        };

        if !self.stop_sequences.is_empty() {
            request.stop = Some(StopConfiguration::StringArray(self.stop_sequences.clone()));
        }

        request
    }
}

impl TextGenerator for OpenAiCompatGenerator {
    fn generate_sentences(&self, prompt: String) -> SentenceStream {
        let request = self.build_request(prompt);
        let client = self.client.clone();

        Box::pin(async_stream::try_stream! {
            let mut stream = client
                .chat()
                .create_stream(request)
                .await
                .map_err(map_openai_error)?;

            let mut accumulator = SentenceAccumulator::new();

            while let Some(result) = stream.next().await {
                let chunk = result.map_err(map_openai_error)?;
                for choice in &chunk.choices {
                    if let Some(content) = &choice.delta.content {
                        for sentence in accumulator.push(content) {
                            yield sentence;
                        }
                    }
                }
            }

            if let Some(rest) = accumulator.finish() {
                yield rest;
            }
        })
    }
}

/// Map an `async_openai` error onto the engine's backend error taxonomy.
fn map_openai_error(err: async_openai::error::OpenAIError) -> BackendError {
    use async_openai::error::OpenAIError;

    match &err {
        OpenAIError::ApiError(api_err) => {
            let code = api_err.code.as_deref().unwrap_or("");
            let error_type = api_err.r#type.as_deref().unwrap_or("");

            if code == "authentication_error"
                || error_type == "authentication_error"
                || api_err.message.contains("Invalid API key")
            {
                BackendError::AuthenticationFailed
            } else if code == "rate_limit_exceeded" || error_type == "rate_limit_error" {
                BackendError::RateLimited
            } else {
                BackendError::Provider {
                    message: err.to_string(),
                }
            }
        }
        OpenAIError::Reqwest(reqwest_err) => match reqwest_err.status().map(|s| s.as_u16()) {
            Some(401) => BackendError::AuthenticationFailed,
            Some(429) => BackendError::RateLimited,
            _ => BackendError::Provider {
                message: err.to_string(),
            },
        },
        OpenAIError::StreamError(stream_err) => BackendError::Stream(stream_err.to_string()),
        OpenAIError::InvalidArgument(msg) => BackendError::InvalidRequest(msg.clone()),
        _ => BackendError::Provider {
            message: err.to_string(),
        },
    }
}
