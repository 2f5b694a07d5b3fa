//! Client for a local Ollama server.

use super::{LlmHttpConfig, LlmProvider, build_http_client};
use crate::resilience::http::{check_status, send_error};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Blocking client for `/api/generate`.
pub struct OllamaClient {
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl OllamaClient {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "http://localhost:11434";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "llama3.2";

    /// Creates a client from resolved configuration.
    #[must_use]
    pub fn from_config(config: &crate::config::LlmConfig) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client: build_http_client(LlmHttpConfig::from_config(config)),
        }
    }

    /// Sets the API endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets HTTP client timeouts for LLM requests.
    #[must_use]
    pub fn with_http_config(mut self, config: LlmHttpConfig) -> Self {
        self.client = build_http_client(config);
        self
    }

    /// The configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[tracing::instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    fn request(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&request)
            .send()
            .map_err(|e| send_error("ollama_request", &e))?;
        let response = check_status("ollama_request", response)?;

        let body: GenerateResponse = response.json().map_err(|e| {
            tracing::error!(model = %self.model, error = %e, "Undecodable generate response");
            Error::failed("ollama_response", e)
        })?;

        Ok(body.response.trim().to_string())
    }
}

impl LlmProvider for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        self.request(prompt)
    }

    fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.endpoint))
            .send()
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}
