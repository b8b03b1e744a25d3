//! Chat-completion clients and grounded response generation.
//!
//! [`LanguageModel`] is the seam between the assistant and whatever
//! produces its replies. [`respond`] builds the prompt (system message,
//! prior turns, then the retrieved context with the user's input) and never
//! fails: an upstream error is logged and replaced by [`FALLBACK_RESPONSE`].
//!
//! # Providers
//!
//! | Config Value | Model | Endpoint |
//! |-------------|-------|----------|
//! | `"disabled"` | [`DisabledModel`] | none (always errors) |
//! | `"openai"` | [`OpenAIChatModel`] | `POST {url}/chat/completions` |
//! | `"azure"` | [`AzureChatModel`] | `POST {endpoint}/openai/deployments/{deployment}/chat/completions` |
//! | `"ollama"` | [`OllamaChatModel`] | `POST {url}/api/chat` (non-streaming) |

use anyhow::{anyhow, bail, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::LlmConfig;
use crate::http;

/// Returned by [`respond`] when the model call fails.
pub const FALLBACK_RESPONSE: &str = "I'm sorry, I encountered an error generating a response.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation turn, serialized as `{"role": "...", "content": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A chat-completion backend.
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;
    /// The assistant's reply to `messages`.
    fn complete(&self, messages: &[Message]) -> Result<String>;
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Sampling {
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

impl Sampling {
    fn from_config(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            frequency_penalty: config.frequency_penalty,
            presence_penalty: config.presence_penalty,
        }
    }
}

/// Assemble the prompt and ask `model` for a reply.
///
/// The prompt is `[system, ...history, user("Context:\n{context}\n\n{input}")]`.
/// Returns [`FALLBACK_RESPONSE`] if the model call fails.
pub fn respond(
    model: &dyn LanguageModel,
    history: &[Message],
    context: &str,
    user_input: &str,
    system_prompt: &str,
) -> String {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system_prompt));
    messages.extend_from_slice(history);
    messages.push(Message::user(format!("Context:\n{}\n\n{}", context, user_input)));

    debug!(model = model.model_name(), turns = messages.len(), "requesting completion");
    match model.complete(&messages) {
        Ok(reply) => reply,
        Err(e) => {
            error!(model = model.model_name(), error = %format!("{:#}", e), "Error generating response");
            FALLBACK_RESPONSE.to_string()
        }
    }
}

// ============ Disabled ============

/// Placeholder used when `llm.provider = "disabled"`; every call fails.
pub struct DisabledModel;

impl LanguageModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn complete(&self, _messages: &[Message]) -> Result<String> {
        bail!("Language model is disabled")
    }
}

// ============ OpenAI ============

pub struct OpenAIChatModel {
    model: String,
    api_key: String,
    url: String,
    sampling: Sampling,
    max_retries: u32,
    client: Client,
}

impl OpenAIChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("llm.model required for OpenAI provider"))?;
        let api_key =
            http::api_key_from_env(config.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY"))?;
        let base_url = config
            .url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/');

        Ok(Self {
            model,
            api_key,
            url: format!("{}/chat/completions", base_url),
            sampling: Sampling::from_config(config),
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

impl LanguageModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn complete(&self, messages: &[Message]) -> Result<String> {
        let mut body = chat_completion_body(messages, &self.sampling);
        body["model"] = serde_json::Value::String(self.model.clone());
        let json = http::post_json_with_retry("OpenAI", self.max_retries, || {
            self.client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })?;
        parse_chat_completion(&json)
    }
}

// ============ Azure OpenAI ============

/// Chat model served from an Azure OpenAI deployment.
///
/// The key comes from `llm.api_key_env` (default `AZURE_LLM_API_KEY`).
pub struct AzureChatModel {
    model: String,
    api_key: String,
    url: String,
    sampling: Sampling,
    max_retries: u32,
    client: Client,
}

impl AzureChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| anyhow!("llm.endpoint required for Azure provider"))?;
        let deployment = config
            .deployment
            .as_deref()
            .ok_or_else(|| anyhow!("llm.deployment required for Azure provider"))?;
        let api_key =
            http::api_key_from_env(config.api_key_env.as_deref().unwrap_or("AZURE_LLM_API_KEY"))?;

        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| deployment.to_string()),
            api_key,
            url: http::azure_url(endpoint, deployment, "chat/completions", &config.api_version),
            sampling: Sampling::from_config(config),
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

impl LanguageModel for AzureChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn complete(&self, messages: &[Message]) -> Result<String> {
        let body = chat_completion_body(messages, &self.sampling);
        let json = http::post_json_with_retry("Azure OpenAI", self.max_retries, || {
            self.client
                .post(&self.url)
                .header("api-key", &self.api_key)
                .json(&body)
        })?;
        parse_chat_completion(&json)
    }
}

fn chat_completion_body(messages: &[Message], sampling: &Sampling) -> serde_json::Value {
    serde_json::json!({
        "messages": messages,
        "temperature": sampling.temperature,
        "max_tokens": sampling.max_tokens,
        "top_p": sampling.top_p,
        "frequency_penalty": sampling.frequency_penalty,
        "presence_penalty": sampling.presence_penalty,
    })
}

/// `choices[0].message.content` of an OpenAI-style response.
fn parse_chat_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid chat completion response: missing choices[0].message.content"))
}

// ============ Ollama ============

pub struct OllamaChatModel {
    model: String,
    url: String,
    sampling: Sampling,
    max_retries: u32,
    client: Client,
}

impl OllamaChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("llm.model required for Ollama provider"))?;
        let url = config
            .url
            .as_deref()
            .unwrap_or("http://localhost:11434")
            .trim_end_matches('/');

        Ok(Self {
            model,
            url: format!("{}/api/chat", url),
            sampling: Sampling::from_config(config),
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

impl LanguageModel for OllamaChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn complete(&self, messages: &[Message]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": self.sampling.temperature,
                "num_predict": self.sampling.max_tokens,
                "top_p": self.sampling.top_p,
                "frequency_penalty": self.sampling.frequency_penalty,
                "presence_penalty": self.sampling.presence_penalty,
            },
        });
        let json = http::post_json_with_retry("Ollama", self.max_retries, || {
            self.client.post(&self.url).json(&body)
        })?;
        json.get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))
    }
}

/// Create the [`LanguageModel`] named by `config.provider`.
pub fn create_model(config: &LlmConfig) -> Result<Box<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledModel)),
        "openai" => Ok(Box::new(OpenAIChatModel::new(config)?)),
        "azure" => Ok(Box::new(AzureChatModel::new(config)?)),
        "ollama" => Ok(Box::new(OllamaChatModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
