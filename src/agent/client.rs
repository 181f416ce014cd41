//! Model Gateway client (§4.1): a cloud chat/embedding backend plus the
//! routing wrapper every other component calls through.

use async_trait::async_trait;
use futures::stream;
use reqwest::{header, Client};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::OpenRouterConfig;
use crate::core::provider::{
    GenerationOptions, ImageSource, LlmProvider, LlmResponse, LlmStream, ModelInfo,
    ProviderMeta, StreamingChunk, UsageStats,
};
use crate::core::types::Message;
use crate::error::{Error, Result};

/// Cloud chat-completion client talking to an OpenAI-compatible gateway
/// (OpenRouter by default). Implements [`LlmProvider`] so it can be wrapped
/// uniformly by [`OrchestratorModelClient`].
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    config: OpenRouterConfig,
    meta: ProviderMeta,
    rate_limit: Arc<RwLock<RateLimitState>>,
}

#[derive(Debug, Default)]
struct RateLimitState {
    remaining: Option<u32>,
    reset_at: Option<u64>,
}

impl OpenRouterClient {
    pub fn new(config: OpenRouterConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();

        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", config.api_key.expose_secret()))
                .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
        );
        if let Some(ref site_url) = config.site_url {
            if let Ok(value) = header::HeaderValue::from_str(site_url) {
                headers.insert("HTTP-Referer", value);
            }
        }
        if let Some(ref site_name) = config.site_name {
            if let Ok(value) = header::HeaderValue::from_str(site_name) {
                headers.insert("X-Title", value);
            }
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let meta = ProviderMeta {
            id: "openrouter".to_string(),
            name: "OpenRouter".to_string(),
            description: "Cloud chat-completion gateway".to_string(),
            base_url: config.base_url.clone(),
            supports_streaming: true,
            supports_tools: true,
            supports_vision: true,
        };

        Ok(OpenRouterClient {
            client,
            config,
            meta,
            rate_limit: Arc::new(RwLock::new(RateLimitState::default())),
        })
    }

    async fn update_rate_limit(&self, response: &reqwest::Response) {
        let mut state = self.rate_limit.write().await;
        if let Some(remaining) = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
        {
            state.remaining = Some(remaining);
        }
        if let Some(reset) = response
            .headers()
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
        {
            state.reset_at = Some(reset);
        }
    }

    fn wire_messages(messages: &[Message], image: Option<&crate::core::provider::ImageAttachment>) -> Vec<serde_json::Value> {
        let mut wire: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.to_string(),
                    "content": m.content,
                })
            })
            .collect();

        if let (Some(image), Some(last)) = (image, wire.last_mut()) {
            let url = match &image.source {
                ImageSource::Url(u) => u.clone(),
                ImageSource::Base64(b) => {
                    let ext = image.extension_hint.as_deref().unwrap_or("png");
                    format!("data:image/{ext};base64,{b}")
                }
            };
            let text = last["content"].as_str().unwrap_or_default().to_string();
            *last = serde_json::json!({
                "role": last["role"],
                "content": [
                    {"type": "text", "text": text},
                    {"type": "image_url", "image_url": {"url": url}},
                ],
            });
        }

        wire
    }

    async fn send_chat(&self, model: &str, messages: &[Message], options: &GenerationOptions) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let mut body = serde_json::json!({
            "model": model,
            "messages": Self::wire_messages(messages, options.image.as_ref()),
            "stream": false,
        });
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = temperature.into();
        }
        if let Some(top_p) = options.top_p {
            body["top_p"] = top_p.into();
        }
        if let Some(stop) = &options.stop {
            body["stop"] = serde_json::json!(stop);
        }
        if let Some(tools) = &options.tools {
            body["tools"] = serde_json::json!(tools);
        }
        if let Some(format) = options.response_format {
            use crate::core::provider::ResponseFormat;
            body["response_format"] = serde_json::json!({
                "type": match format {
                    ResponseFormat::JsonObject => "json_object",
                    ResponseFormat::Text => "text",
                }
            });
        }

        debug!(model, "sending chat completion request");
        let response = self.client.post(&url).json(&body).send().await?;
        self.update_rate_limit(&response).await;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => {
                    warn!("rate limit exceeded: {error_text}");
                    Error::RateLimit(error_text)
                }
                401 => Error::Unauthorized("invalid API key".to_string()),
                404 => Error::NotFound(error_text),
                _ => Error::ModelGateway(format!("API error ({status}): {error_text}")),
            });
        }

        let raw: serde_json::Value = response.json().await?;
        parse_chat_response(raw)
    }
}

fn parse_chat_response(raw: serde_json::Value) -> Result<LlmResponse> {
    let id = raw["id"].as_str().unwrap_or_default().to_string();
    let model = raw["model"].as_str().unwrap_or_default().to_string();
    let choice = raw["choices"].get(0).cloned().unwrap_or(serde_json::Value::Null);
    let content = choice["message"]["content"].as_str().unwrap_or_default().to_string();
    let finish_reason = choice["finish_reason"].as_str().map(|s| s.to_string());
    let tool_calls = choice["message"]["tool_calls"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|tc| serde_json::from_value(tc.clone()).ok())
                .collect()
        })
        .filter(|v: &Vec<_>| !v.is_empty());
    let usage = raw.get("usage").and_then(|u| serde_json::from_value::<UsageStats>(u.clone()).ok());

    if content.is_empty() && tool_calls.is_none() {
        info!(%model, "response contained no content and no tool calls");
    }

    Ok(LlmResponse { id, model, content, finish_reason, tool_calls, usage })
}

#[async_trait]
impl LlmProvider for OpenRouterClient {
    fn meta(&self) -> &ProviderMeta {
        &self.meta
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/models", self.config.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(Error::ModelGateway(format!("failed to list models: {error}")));
        }
        let body: serde_json::Value = response.json().await?;
        let models = body["data"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| {
                Some(ModelInfo {
                    id: m["id"].as_str()?.to_string(),
                    name: m["name"].as_str().unwrap_or_default().to_string(),
                    description: m["description"].as_str().map(|s| s.to_string()),
                    context_length: m["context_length"].as_u64().map(|n| n as u32),
                    input_price: m["pricing"]["prompt"].as_str().and_then(|s| s.parse().ok()),
                    output_price: m["pricing"]["completion"].as_str().and_then(|s| s.parse().ok()),
                })
            })
            .collect();
        Ok(models)
    }

    async fn generate(&self, messages: &[Message], options: &GenerationOptions) -> Result<LlmResponse> {
        let model = options.model.as_deref().unwrap_or(&self.config.default_model);
        self.send_chat(model, messages, options).await
    }

    async fn generate_stream(&self, messages: &[Message], options: &GenerationOptions) -> Result<LlmStream> {
        // Streaming isn't required by any orchestrator caller today; fall
        // back to one non-streaming call surfaced as a single final chunk.
        let response = self.generate(messages, options).await?;
        let chunk = StreamingChunk {
            id: response.id,
            delta: response.content,
            is_final: true,
            finish_reason: response.finish_reason,
        };
        Ok(Box::pin(stream::once(async move { Ok(chunk) })))
    }
}

/// Routes model identifiers to either the cloud [`LlmProvider`] or a local
/// chat endpoint, per §4.1: identifiers prefixed `local_` address the local
/// endpoint, everything else the wrapped cloud provider. Local "model not
/// found" responses trigger a pull request, a short wait, and one retry.
pub struct OrchestratorModelClient {
    cloud: Arc<dyn LlmProvider>,
    local_client: Client,
    local_base_url: String,
}

impl OrchestratorModelClient {
    pub fn new(cloud: Arc<dyn LlmProvider>, local_base_url: impl Into<String>) -> Self {
        OrchestratorModelClient {
            cloud,
            local_client: Client::new(),
            local_base_url: local_base_url.into(),
        }
    }

    /// `chat(history, model, options) -> String`
    pub async fn chat(&self, history: &[Message], model: &str, options: &GenerationOptions) -> Result<String> {
        if let Some(local_model) = model.strip_prefix("local_") {
            return self.chat_local(history, local_model, options).await;
        }
        let mut opts = options.clone();
        opts.model = Some(model.to_string());
        let response = self.cloud.generate(history, &opts).await?;
        Ok(response.content)
    }

    async fn chat_local(&self, history: &[Message], local_model: &str, options: &GenerationOptions) -> Result<String> {
        match self.send_local(history, local_model, options).await {
            Ok(content) => Ok(content),
            Err(Error::NotFound(_)) => {
                warn!(model = local_model, "local model not found, requesting pull");
                self.pull_local_model(local_model).await?;
                tokio::time::sleep(Duration::from_secs(2)).await;
                self.send_local(history, local_model, options).await
            }
            Err(e) => Err(e),
        }
    }

    async fn send_local(&self, history: &[Message], local_model: &str, options: &GenerationOptions) -> Result<String> {
        let url = format!("{}/api/chat", self.local_base_url);
        let body = serde_json::json!({
            "model": local_model,
            "messages": OpenRouterClient::wire_messages(history, options.image.as_ref()),
            "stream": false,
        });
        let response = self.local_client.post(&url).json(&body).send().await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(Error::NotFound(format!("local model {local_model} not found")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::ModelGateway(format!("local model error ({status}): {text}")));
        }
        let raw: serde_json::Value = response.json().await?;
        Ok(raw["message"]["content"].as_str().unwrap_or_default().to_string())
    }

    async fn pull_local_model(&self, local_model: &str) -> Result<()> {
        let url = format!("{}/api/pull", self.local_base_url);
        let body = serde_json::json!({"name": local_model});
        self.local_client.post(&url).json(&body).send().await?;
        Ok(())
    }

    /// `embed(texts, model) -> Vec<Vec<f32>>`
    pub async fn embed(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>> {
        if let Some(local_model) = model.strip_prefix("local_") {
            return self.embed_local(texts, local_model).await;
        }
        Err(Error::ModelGateway(format!(
            "cloud embedding via model '{model}' is not wired to this gateway; use a local_ model"
        )))
    }

    async fn embed_local(&self, texts: &[String], local_model: &str) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.local_base_url);
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let body = serde_json::json!({"model": local_model, "input": text});
            let response = self.local_client.post(&url).json(&body).send().await?;
            let raw: serde_json::Value = response.json().await?;
            let vector = raw["embeddings"][0]
                .as_array()
                .map(|arr| arr.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect())
                .unwrap_or_default();
            out.push(vector);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn test_config() -> OpenRouterConfig {
        OpenRouterConfig {
            api_key: SecretString::from("test-key"),
            default_model: "anthropic/claude-sonnet-4".to_string(),
            site_url: None,
            site_name: None,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }

    #[test]
    fn client_creation_succeeds_with_valid_key() {
        let client = OpenRouterClient::new(test_config());
        assert!(client.is_ok());
    }

    #[test]
    fn wire_messages_attaches_image_to_last_message() {
        let messages = vec![Message::user("describe this")];
        let image = crate::core::provider::ImageAttachment {
            source: ImageSource::Url("https://example.com/x.png".to_string()),
            extension_hint: None,
        };
        let wire = OpenRouterClient::wire_messages(&messages, Some(&image));
        assert!(wire[0]["content"].is_array());
    }

    #[test]
    fn parse_chat_response_extracts_content_and_usage() {
        let raw = serde_json::json!({
            "id": "abc",
            "model": "m",
            "choices": [{"message": {"content": "hi"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3},
        });
        let response = parse_chat_response(raw).unwrap();
        assert_eq!(response.content, "hi");
        assert_eq!(response.usage.unwrap().total_tokens, 3);
    }
}
