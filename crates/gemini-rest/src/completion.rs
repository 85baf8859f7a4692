//! Text generation against a single Gemini model.

use crate::client::Client;
use crate::error::GeminiError;
use crate::types::{
    ApiErrorEnvelope, Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
};

/// Handle to one Gemini model with its sampling configuration.
#[derive(Clone)]
pub struct GenerativeModel {
    client: Client,
    model: String,
    generation_config: Option<GenerationConfig>,
}

impl GenerativeModel {
    pub fn new(client: Client, model: String) -> Self {
        Self {
            client,
            model,
            generation_config: None,
        }
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }

    /// Get the model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, system: Option<&str>, contents: &[Content]) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: contents.to_vec(),
            system_instruction: system
                .filter(|s| !s.is_empty())
                .map(Content::system),
            generation_config: self.generation_config.clone(),
        }
    }

    /// Send the conversation and return the raw response.
    pub async fn generate_content(
        &self,
        system: Option<&str>,
        contents: &[Content],
    ) -> Result<GenerateContentResponse, GeminiError> {
        let request = self.build_request(system, contents);
        let url = self.client.endpoint_url(&self.model, "generateContent");
        let headers = self.client.build_headers()?;

        tracing::debug!(
            model = %self.model,
            turns = contents.len(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .http_client()
            .post(&url)
            .headers(headers)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(GeminiError::ApiError { status, message });
        }

        let body = response.text().await?;
        let parsed: GenerateContentResponse = serde_json::from_str(&body)?;
        Ok(parsed)
    }

    /// Send the conversation and return the first candidate's text.
    pub async fn generate(
        &self,
        system: Option<&str>,
        contents: &[Content],
    ) -> Result<String, GeminiError> {
        let response = self.generate_content(system, contents).await?;

        if let Some(reason) = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_ref())
        {
            return Err(GeminiError::EmptyResponse(format!("prompt blocked: {}", reason)));
        }

        response
            .text()
            .ok_or_else(|| GeminiError::EmptyResponse("no candidates returned".to_string()))
    }
}

impl std::fmt::Debug for GenerativeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerativeModel")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}
