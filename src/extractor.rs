//! LLM-backed entity extraction
//!
//! Sends article text to an OpenAI-compatible chat completions endpoint and
//! parses the reply into [`Entity`] values. The model is asked for a JSON
//! array of `{"texto", "tipo"}` objects; replies wrapped in code fences are
//! unwrapped, and anything that still is not a JSON array yields no entities.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::{read_secret, ExtractorConfig};
use crate::error::{MonitorError, MonitorResult};
use crate::model::{Entity, EntityType};

const SYSTEM_PROMPT: &str = "Você é um especialista em análise de textos. Sua tarefa é extrair somente \
nomes próprios completos de pessoas e empresas mencionadas em notícias.";

#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Person and organization mentions found in `text`.
    async fn extract(&self, text: &str) -> MonitorResult<Vec<Entity>>;
}

/// Prompt sent with the article text.
pub fn build_user_prompt(text: &str) -> String {
    format!(
        r#"Analise o texto de notícia abaixo e extraia APENAS:

1. Nomes COMPLETOS de PESSOAS
2. Nomes COMPLETOS de EMPRESAS

Não extraia cidades, estados, países, órgãos públicos (como "Polícia Federal" ou "Ministério Público")
nem termos genéricos como "empresa", "companhia" ou "organização".

Texto da notícia: {}

Responda APENAS com JSON no formato abaixo, sem explicações:
[
  {{"texto": "Nome da Pessoa", "tipo": "PER"}},
  {{"texto": "Nome da Empresa", "tipo": "ORG"}}
]

Se não houver nenhuma pessoa ou empresa, responda com uma lista vazia []."#,
        text
    )
}

/// Parse the model reply into entities. Malformed replies produce an empty list.
pub fn parse_entity_response(raw: &str) -> Vec<Entity> {
    let mut cleaned = raw.trim().to_string();
    if cleaned.starts_with("```json") {
        cleaned = cleaned.replace("```json", "").replace("```", "");
    } else if cleaned.starts_with("```") {
        cleaned = cleaned.replace("```", "");
    }

    let items = match serde_json::from_str::<Value>(cleaned.trim()) {
        Ok(Value::Array(items)) => items,
        Ok(other) => {
            debug!("Extractor reply is JSON but not an array: {}", other);
            return Vec::new();
        }
        Err(e) => {
            debug!("Extractor reply is not JSON ({}): {}", e, raw);
            return Vec::new();
        }
    };

    items
        .iter()
        .filter_map(|item| {
            let text = item.get("texto")?.as_str()?.trim();
            if text.is_empty() {
                return None;
            }
            let code = item.get("tipo").and_then(Value::as_str).unwrap_or_default();
            Some(Entity::new(text, EntityType::from_code(code)))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions client
#[derive(Clone)]
pub struct ChatCompletionExtractor {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl std::fmt::Debug for ChatCompletionExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionExtractor")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionExtractor {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for entity extraction")?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        })
    }

    /// Build from configuration, reading the API key from the environment.
    pub fn from_config(config: &ExtractorConfig) -> anyhow::Result<Self> {
        let api_key = read_secret(&config.api_key_env)?;
        Self::new(
            config.endpoint.clone(),
            api_key,
            config.model.clone(),
            config.temperature,
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn complete(&self, text: &str) -> MonitorResult<String> {
        let body = json!({
            "model": &self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_user_prompt(text)}
            ],
            "temperature": self.temperature
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MonitorError::Extraction(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MonitorError::Extraction(format!("API error {}: {}", status, body.trim())));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| MonitorError::Extraction(format!("invalid response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| MonitorError::Extraction("response contained no message".to_string()))
    }
}

#[async_trait]
impl EntityExtractor for ChatCompletionExtractor {
    async fn extract(&self, text: &str) -> MonitorResult<Vec<Entity>> {
        let reply = self.complete(text).await?;
        debug!("Extractor reply: {}", reply.trim());
        Ok(parse_entity_response(&reply))
    }
}
