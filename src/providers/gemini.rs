use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use log::{info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::GeminiConfig;
use crate::error::EcoError;
use crate::llm_manager::{ImageRequest, LLMProvider, StructuredRequest};

/// Gemini API provider: `generateContent` for analysis, Imagen `predict` for images
pub struct GeminiProvider {
    api_key: String,
    model: String,
    image_model: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<usize>,
    candidates_token_count: Option<usize>,
    total_token_count: Option<usize>,
}

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<PredictInstance>,
    parameters: PredictParameters,
}

#[derive(Debug, Serialize)]
struct PredictInstance {
    prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
    aspect_ratio: String,
    output_options: OutputOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputOptions {
    mime_type: String,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetails,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetails {
    message: Option<String>,
    status: Option<String>,
}

impl GeminiProvider {
    /// Create a provider from configuration and an already-resolved API key
    pub fn new(config: &GeminiConfig, api_key: String) -> Self {
        Self {
            api_key,
            model: config.model.clone(),
            image_model: config.image_model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<String, EcoError> {
        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(EcoError::from_status(
                status.as_u16(),
                describe_error(status.as_u16(), &response_text),
            ));
        }
        Ok(response_text)
    }
}

/// Fold a Gemini error body into one line, falling back to the raw text.
fn describe_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<GeminiError>(body) {
        Ok(wrapper) => {
            let message = wrapper.error.message.unwrap_or_else(|| body.to_string());
            match wrapper.error.status {
                Some(status_text) if !status_text.is_empty() => {
                    format!("Gemini API error ({}): {}: {}", status, status_text, message)
                }
                _ => format!("Gemini API error ({}): {}", status, message),
            }
        }
        Err(_) => format!("Gemini API error (status {}): {}", status, body),
    }
}

fn extract_text(response: GenerateContentResponse) -> Result<String, EcoError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| EcoError::upstream("No response candidates from Gemini"))?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if reason == "MAX_TOKENS" {
            warn!("Gemini response was truncated at the token limit; JSON may be incomplete");
        }
    }

    let text: String = candidate
        .content
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(EcoError::upstream("Gemini returned no text in the response candidates"));
    }
    Ok(text)
}

fn extract_image(response: PredictResponse) -> Result<Option<Vec<u8>>, EcoError> {
    let Some(encoded) = response
        .predictions
        .into_iter()
        .find_map(|p| p.bytes_base64_encoded)
    else {
        return Ok(None);
    };
    let bytes = BASE64_STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| EcoError::upstream(format!("Imagen image base64 decode failed: {}", e)))?;
    Ok(Some(bytes))
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn image_model_name(&self) -> &str {
        &self.image_model
    }

    async fn generate_structured(&self, request: &StructuredRequest) -> Result<String, EcoError> {
        let body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![TextPart {
                    text: request.system_instruction.clone(),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![TextPart {
                    text: request.user_prompt.clone(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: request.output_schema.clone(),
                temperature: request.temperature,
            },
        };

        let url = self.endpoint(&self.model, "generateContent");
        let response_text = self.post(&url, &body).await?;
        let parsed: GenerateContentResponse = serde_json::from_str(&response_text)
            .map_err(|e| EcoError::upstream(format!("Failed to parse Gemini response: {}", e)))?;

        if let Some(usage) = &parsed.usage_metadata {
            info!(
                "Gemini token usage - Prompt: {}, Completion: {}, Total: {}",
                usage.prompt_token_count.unwrap_or(0),
                usage.candidates_token_count.unwrap_or(0),
                usage.total_token_count.unwrap_or(0)
            );
        }

        extract_text(parsed)
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<Option<Vec<u8>>, EcoError> {
        let body = PredictRequest {
            instances: vec![PredictInstance {
                prompt: request.prompt.clone(),
            }],
            parameters: PredictParameters {
                sample_count: request.image_count,
                aspect_ratio: request.aspect_ratio.clone(),
                output_options: OutputOptions {
                    mime_type: request.output_mime_type.clone(),
                },
            },
        };

        let url = self.endpoint(&self.image_model, "predict");
        let response_text = self.post(&url, &body).await?;
        let parsed: PredictResponse = serde_json::from_str(&response_text)
            .map_err(|e| EcoError::upstream(format!("Failed to parse Imagen response: {}", e)))?;

        extract_image(parsed)
    }
}
