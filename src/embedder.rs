//! Remote embedding provider.
//!
//! Text queries and batch ingestion are embedded through Cohere's REST API.
//! The API key is read from `COHERE_API_KEY` at call time; a missing key or
//! a failed call surfaces as a provider error and never touches store state.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, AppResult};

const EMBED_URL: &str = "https://api.cohere.ai/v1/embed";
const EMBED_MODEL: &str = "embed-english-v3.0";
const INPUT_TYPE: &str = "search_query";
const API_KEY_VAR: &str = "COHERE_API_KEY";

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
    model: &'static str,
    input_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct EmbeddingClient {
    http: reqwest::Client,
    url: String,
}

impl EmbeddingClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            url: EMBED_URL.to_string(),
        }
    }

    /// Embed a batch of texts. Returns one vector per input text, in order.
    pub async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let api_key = std::env::var(API_KEY_VAR)
            .map_err(|_| AppError::Provider(format!("{API_KEY_VAR} environment variable is not set")))?;

        debug!(count = texts.len(), model = EMBED_MODEL, "requesting embeddings");

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&EmbedRequest {
                texts,
                model: EMBED_MODEL,
                input_type: INPUT_TYPE,
            })
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("embed request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "embed request returned {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("malformed embed response: {e}")))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(AppError::Provider(format!(
                "embed response count mismatch: sent {}, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        Ok(parsed.embeddings)
    }
}

impl Default for EmbeddingClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_the_provider_contract() {
        let texts = vec!["first".to_string(), "second".to_string()];
        let body = serde_json::to_value(EmbedRequest {
            texts: &texts,
            model: EMBED_MODEL,
            input_type: INPUT_TYPE,
        })
        .unwrap();
        assert_eq!(body["model"], "embed-english-v3.0");
        assert_eq!(body["input_type"], "search_query");
        assert_eq!(body["texts"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn response_parsing_extracts_embeddings() {
        let json = r#"{"id":"x","embeddings":[[0.1,0.2],[0.3,0.4]],"meta":{}}"#;
        let parsed: EmbedResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.embeddings.len(), 2);
        assert_eq!(parsed.embeddings[0], vec![0.1, 0.2]);
    }

    #[tokio::test]
    async fn empty_batch_skips_the_provider() {
        let client = EmbeddingClient::new();
        let embeddings = client.embed(&[]).await.unwrap();
        assert!(embeddings.is_empty());
    }
}
