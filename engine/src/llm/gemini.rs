use super::quota::{is_quota_error, quota_info_from_text};
use super::{EmbeddingTask, Embedder, LLMError, TextGenerator};
use crate::config::GeminiConfig;
use async_trait::async_trait;
use sdk::errors::EngineError;
use serde_json::json;
use std::time::Duration;

/// Client for the Gemini `generateContent` and `embedContent` endpoints.
///
/// One client serves both the text-generation and the embedding side, so a
/// single `reqwest::Client` (and its connection pool) is shared.
pub struct GeminiClient {
    config: GeminiConfig,
    api_key: String,
    dimension: usize,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(
        config: GeminiConfig,
        api_key: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EngineError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(EngineError::Config("Gemini API key is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            api_key,
            dimension,
            client,
        })
    }

    /// Build a client, reading the API key from the environment variable
    /// named by `config.api_key_env`.
    pub fn from_env(
        config: GeminiConfig,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EngineError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            EngineError::Config(format!(
                "Environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        Self::new(config, api_key, dimension, timeout)
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!(
            "{}/models/{}:{}?key={}",
            self.config.base_url.trim_end_matches('/'),
            model,
            method,
            self.api_key
        )
    }

    async fn post(
        &self,
        model: &str,
        method: &str,
        payload: &serde_json::Value,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(self.endpoint(model, method))
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
    }
}

fn retry_after_header(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> super::Result<String> {
        if prompt.trim().is_empty() {
            return Err(LLMError::Generation("prompt must not be empty".to_string()));
        }

        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}]
            }]
        });

        let response = self
            .post(&self.config.text_model, "generateContent", &payload)
            .await
            .map_err(|e| LLMError::Upstream(e.without_url().to_string()))?;

        let status = response.status();
        tracing::debug!(model = %self.config.text_model, status = status.as_u16(), "generateContent");

        if !status.is_success() {
            let retry_after = retry_after_header(&response);
            let text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 || is_quota_error(&text) {
                return Err(LLMError::QuotaExceeded(quota_info_from_text(
                    &text,
                    retry_after.as_deref(),
                )));
            }
            return Err(LLMError::Generation(format!(
                "Gemini API error ({}): {}",
                status, text
            )));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::Upstream(e.without_url().to_string()))?;

        let parts = data
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
            .ok_or_else(|| LLMError::Generation("No candidates in response".to_string()))?;

        let mut full_text = String::new();
        for part in parts {
            if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                full_text.push_str(text);
            }
        }

        if full_text.trim().is_empty() {
            return Err(LLMError::Generation("Empty completion".to_string()));
        }

        Ok(full_text)
    }
}

#[async_trait]
impl Embedder for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str, task: EmbeddingTask) -> super::Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(LLMError::Embedding("cannot embed empty text".to_string()));
        }

        let payload = json!({
            "model": format!("models/{}", self.config.embedding_model),
            "content": {"parts": [{"text": text}]},
            "taskType": task.as_api_str(),
            "outputDimensionality": self.dimension,
        });

        let response = self
            .post(&self.config.embedding_model, "embedContent", &payload)
            .await
            .map_err(|e| LLMError::Embedding(e.without_url().to_string()))?;

        let status = response.status();
        tracing::debug!(model = %self.config.embedding_model, status = status.as_u16(), %task, "embedContent");

        if !status.is_success() {
            let retry_after = retry_after_header(&response);
            let text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 || is_quota_error(&text) {
                return Err(LLMError::EmbeddingQuota(quota_info_from_text(
                    &text,
                    retry_after.as_deref(),
                )));
            }
            return Err(LLMError::Embedding(format!(
                "Gemini API error ({}): {}",
                status, text
            )));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::Embedding(e.without_url().to_string()))?;

        let values = data
            .get("embedding")
            .and_then(|e| e.get("values"))
            .and_then(|v| v.as_array())
            .ok_or_else(|| LLMError::Embedding("No embedding values in response".to_string()))?;

        let vector: Vec<f32> = values
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|v| v as f32)
            .collect();

        if vector.len() != self.dimension || vector.len() != values.len() {
            return Err(LLMError::Embedding(format!(
                "Expected {} embedding values, got {}",
                self.dimension,
                values.len()
            )));
        }

        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GeminiConfig {
        GeminiConfig {
            base_url: "https://example.test/v1beta/".to_string(),
            ..GeminiConfig::default()
        }
    }

    #[test]
    fn test_endpoint_format() {
        let client = GeminiClient::new(config(), "k", 8, Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.endpoint("gemini-2.5-flash", "generateContent"),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent?key=k"
        );
    }

    #[test]
    fn test_rejects_empty_key() {
        let result = GeminiClient::new(config(), "  ", 8, Duration::from_secs(5));
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_from_env_missing_variable() {
        let cfg = GeminiConfig {
            api_key_env: "TRIAD_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..GeminiConfig::default()
        };
        let result = GeminiClient::from_env(cfg, 8, Duration::from_secs(5));
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn test_empty_inputs_rejected_without_network() {
        let client = GeminiClient::new(config(), "k", 8, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            client.generate("   ").await,
            Err(LLMError::Generation(_))
        ));
        assert!(matches!(
            client.embed("", EmbeddingTask::RetrievalDocument).await,
            Err(LLMError::Embedding(_))
        ));
    }
}
