pub mod error;

pub use error::{OllamaError, Result};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Generation can take minutes on CPU-only hosts.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Sampling knobs passed through on every generate call.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub num_predict: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            num_predict: 150,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Run one non-streaming completion and return the model's reply text.
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String> {
        let body = GenerateRequest {
            model,
            prompt,
            stream: false,
            temperature: options.temperature,
            num_predict: options.num_predict,
        };

        debug!(model, prompt_len = prompt.len(), "Sending generate request");

        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(OllamaError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse = resp.json().await?;
        Ok(parsed.response)
    }

    /// List the tags of all installed models.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(OllamaError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: TagsResponse = resp.json().await?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    /// Check that `model` is installed. Installed tags carry a variant
    /// suffix ("mistral:latest"), so a bare base name is accepted too.
    pub async fn verify(&self, model: &str) -> Result<()> {
        let available = self.list_models().await?;
        if available.iter().any(|tag| model_matches(tag, model)) {
            return Ok(());
        }
        Err(OllamaError::ModelMissing {
            model: model.to_string(),
            available,
        })
    }
}

fn model_matches(tag: &str, model: &str) -> bool {
    tag == model || tag.split(':').next() == Some(model)
}
