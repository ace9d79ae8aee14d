//! Execution capabilities wired up by the binary.
//!
//! `llm` agents prompt an OpenAI-compatible chat completions API, or an
//! offline drafter when no provider is configured. `tool` agents compile
//! their upstream inputs without a model.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use workforce_core::{ArtifactDraft, WorkerKind, WorkforceError, WorkforceResult};
use workforce_orchestrator::{
    AgentIdentity, CapabilityRouter, CompletionBackend, ExecutionCapability, LlmWorker, TaskSpec,
    ToolWorker,
};

/// Which completion backend `llm` agents use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Deterministic drafts without a model. Useful for dry runs.
    #[default]
    Offline,
    /// Any OpenAI-compatible chat completions endpoint.
    OpenAi,
}

/// The `[model]` section of `workforce.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_model_id() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.3
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model_id: default_model_id(),
            base_url: None,
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl ModelConfig {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or("https://api.openai.com")
            .trim_end_matches('/')
    }
}

/// OpenAI-compatible chat completions backend.
///
/// Works with OpenAI, OpenRouter, Groq, Ollama, and any other provider that
/// implements `/v1/chat/completions`.
pub struct OpenAiBackend {
    config: ModelConfig,
    api_key: String,
    http: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(config: ModelConfig, api_key: impl Into<String>) -> Self {
        Self {
            config,
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Reads the API key from the variable named by `api_key_env`.
    pub fn from_env(config: ModelConfig) -> WorkforceResult<Self> {
        let key = std::env::var(&config.api_key_env).map_err(|_| {
            WorkforceError::Config(format!(
                "Environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        Ok(Self::new(config, key))
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, system_prompt: Option<&str>, prompt: &str) -> WorkforceResult<String> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());
        let mut messages = Vec::new();
        if let Some(sys) = system_prompt {
            messages.push(serde_json::json!({ "role": "system", "content": sys }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": prompt }));
        let body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": messages,
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| WorkforceError::ExecutionFailure(format!("Completion request failed: {e}")))?;
        let status = resp.status();
        let resp_body: serde_json::Value = resp.json().await.map_err(|e| {
            WorkforceError::ExecutionFailure(format!("Invalid completion response: {e}"))
        })?;

        if !status.is_success() {
            let message = resp_body["error"]["message"]
                .as_str()
                .unwrap_or("unknown error");
            return Err(WorkforceError::ExecutionFailure(format!(
                "Completion API error {status}: {message}"
            )));
        }

        resp_body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                WorkforceError::ExecutionFailure("Completion response had no content".into())
            })
    }
}

/// Drafts a short summary of the prompt without calling a model.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineBackend;

#[async_trait]
impl CompletionBackend for OfflineBackend {
    async fn complete(&self, _system_prompt: Option<&str>, prompt: &str) -> WorkforceResult<String> {
        let task = prompt
            .lines()
            .find_map(|l| l.strip_prefix("# Task: "))
            .unwrap_or("Task");
        let inputs = prompt.matches("\n## Input from ").count();
        let notes = prompt
            .split("## Notes from earlier attempts")
            .nth(1)
            .map_or(0, |notes| notes.lines().filter(|l| l.starts_with("- ")).count());
        Ok(format!(
            "{task}: offline draft built from {inputs} upstream input(s) and {notes} earlier note(s). \
             Replace the offline provider with a model to produce real content."
        ))
    }
}

/// Tool worker body: compiles upstream outputs into one markdown document,
/// or restates the task when it has no inputs.
pub fn compile_upstream(spec: &TaskSpec, agent: &AgentIdentity) -> WorkforceResult<ArtifactDraft> {
    if spec.upstream.is_empty() {
        let description = if spec.description.is_empty() {
            "No description was given."
        } else {
            spec.description.as_str()
        };
        return Ok(ArtifactDraft::markdown(format!(
            "# {}\n\n{description}\n\nPrepared by {}.",
            spec.name, agent.name
        )));
    }
    let mut out = format!("# {}\n", spec.name);
    for input in &spec.upstream {
        out.push_str(&format!("\n## {}\n\n{}\n", input.task_name, input.content.trim()));
    }
    Ok(ArtifactDraft::markdown(out))
}

/// Routes each worker kind the binary supports to its capability.
pub fn capability(model: &ModelConfig) -> WorkforceResult<Arc<dyn ExecutionCapability>> {
    let llm: Arc<dyn ExecutionCapability> = match model.provider {
        Provider::Offline => Arc::new(LlmWorker::new(OfflineBackend)),
        Provider::OpenAi => Arc::new(LlmWorker::new(OpenAiBackend::from_env(model.clone())?)),
    };
    info!(provider = ?model.provider, model = %model.model_id, "Execution capability ready");
    let router = CapabilityRouter::new()
        .with(WorkerKind::Llm, llm)
        .with(WorkerKind::Tool, Arc::new(ToolWorker::new(compile_upstream)));
    Ok(Arc::new(router))
}
