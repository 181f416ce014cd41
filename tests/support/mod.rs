//! Fakes shared by the end-to-end scenario tests: a scripted [`LlmProvider`]
//! that answers from a fixed queue instead of a network call, an in-memory
//! [`StorageBackend`] standing in for Postgres-backed session storage, and a
//! [`Tool`] double for deep-search's external-search back-end.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use agentflow::core::provider::{
    GenerationOptions, LlmResponse, LlmStream, ModelInfo, ProviderMeta, StreamingChunk,
};
use agentflow::tools::{Tool, ToolResult};
use agentflow::{Error, LlmProvider, Message, Result, StorageBackend};
use async_trait::async_trait;
use futures::stream;

/// Answers `generate` calls from a fixed queue, in order, regardless of the
/// messages it is handed. Exhausting the queue is a test bug, not a
/// provider-side failure, so it surfaces as an error rather than a panic.
pub struct ScriptedProvider {
    meta: ProviderMeta,
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<&str>) -> Self {
        ScriptedProvider {
            meta: ProviderMeta {
                id: "scripted".to_string(),
                name: "Scripted test provider".to_string(),
                description: "Replays a fixed response queue".to_string(),
                base_url: "http://scripted.invalid".to_string(),
                supports_streaming: true,
                supports_tools: false,
                supports_vision: false,
            },
            responses: Mutex::new(responses.into_iter().map(|s| s.to_string()).collect()),
        }
    }

    /// Responses not yet consumed. Tests use this to assert exactly how
    /// many model calls a scenario made, not merely that it didn't error.
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn meta(&self) -> &ProviderMeta {
        &self.meta
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(Vec::new())
    }

    async fn generate(&self, _messages: &[Message], options: &GenerationOptions) -> Result<LlmResponse> {
        let content = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::ModelGateway("scripted provider's response queue is empty".to_string()))?;

        Ok(LlmResponse {
            id: "scripted-response".to_string(),
            model: options.model.clone().unwrap_or_else(|| self.default_model().to_string()),
            content,
            finish_reason: Some("stop".to_string()),
            tool_calls: None,
            usage: None,
        })
    }

    async fn generate_stream(&self, messages: &[Message], options: &GenerationOptions) -> Result<LlmStream> {
        let response = self.generate(messages, options).await?;
        let chunk = StreamingChunk {
            id: response.id,
            delta: response.content,
            is_final: true,
            finish_reason: response.finish_reason,
        };
        let s: LlmStream = Box::pin(stream::once(async move { Ok(chunk) }));
        Ok(s)
    }
}

/// A flat `key -> JSON` map behind a mutex, standing in for
/// [`agentflow::database::PostgresSessionStore`] in tests that never touch
/// a real database.
#[derive(Default)]
pub struct InMemoryStore {
    data: Mutex<HashMap<String, serde_json::Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::default()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStore {
    fn id(&self) -> &str {
        "in-memory-test-store"
    }

    async fn set_json(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.data.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.data.lock().unwrap().contains_key(key))
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Always-succeeds search tool double, so the RL selector and the
/// deep-search planner can exercise their `search_tool` branch without a
/// real DuckDuckGo round trip.
pub struct FakeSearchTool {
    content: String,
}

impl FakeSearchTool {
    pub fn new(content: impl Into<String>) -> Self {
        FakeSearchTool { content: content.into() }
    }
}

#[async_trait]
impl Tool for FakeSearchTool {
    fn name(&self) -> &str {
        "fake_search"
    }

    fn description(&self) -> &str {
        "Test double standing in for an external web-search tool"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}})
    }

    async fn execute(&self, _args: serde_json::Value) -> Result<ToolResult> {
        Ok(ToolResult::success(self.content.clone()))
    }
}
