use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::concurrency::run_settled;
use crate::error::EcoError;
use crate::llm_manager::{ImageRequest, LLMManager, StructuredRequest};
use crate::persona::{PersonaId, instruction_for};
use crate::schema::{AnalysisResponse, Suggestion, response_schema, validate};

const IMAGE_MIME_TYPE: &str = "image/jpeg";

/// One user submission. Immutable once dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub activity_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub persona: PersonaId,
    pub submitted_at: DateTime<Utc>,
}

impl AnalysisRequest {
    /// Build a request, or `EmptyInput` when the activity text is blank.
    /// A blank display name is treated as absent.
    pub fn new(
        activity_text: &str,
        display_name: Option<&str>,
        persona: PersonaId,
    ) -> Result<Self, EcoError> {
        let activity_text = activity_text.trim();
        if activity_text.is_empty() {
            return Err(EcoError::EmptyInput);
        }
        Ok(Self {
            activity_text: activity_text.to_string(),
            display_name: display_name
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            persona,
            submitted_at: Utc::now(),
        })
    }
}

/// Image for one suggestion. An empty `image_data_uri` means generation was
/// skipped or failed; the suggestion is shown without a picture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResult {
    pub suggestion_title: String,
    pub image_data_uri: String,
}

impl ImageResult {
    pub fn degraded(title: &str) -> Self {
        Self {
            suggestion_title: title.to_string(),
            image_data_uri: String::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.image_data_uri.is_empty()
    }
}

/// User-level message. The name only changes the phrasing.
pub fn build_user_prompt(activity_text: &str, display_name: Option<&str>) -> String {
    match display_name {
        Some(name) => format!(
            "Please analyze the following activity for a user named {}: \"{}\"",
            name, activity_text
        ),
        None => format!("Please analyze the following user activity: \"{}\"", activity_text),
    }
}

/// Prompt sent to the image model for a suggestion's `imageQuery`.
pub fn build_image_prompt(image_query: &str) -> String {
    format!(
        "A serene, photorealistic, slightly artistic image representing: {}. \
         The image should feel soft, encouraging and minimalist.",
        image_query.trim()
    )
}

/// Self-contained embeddable reference for raw image bytes.
pub fn to_data_uri(bytes: &[u8], mime_type: &str) -> String {
    format!("data:{};base64,{}", mime_type, BASE64_STANDARD.encode(bytes))
}

/// The only component that talks to the remote capabilities.
pub struct QueryOrchestrator {
    manager: Arc<LLMManager>,
    temperature: f32,
}

impl QueryOrchestrator {
    pub fn new(manager: Arc<LLMManager>, temperature: f32) -> Self {
        Self { manager, temperature }
    }

    /// Assemble the structured request for an analysis.
    pub fn build_request(&self, request: &AnalysisRequest) -> StructuredRequest {
        StructuredRequest {
            system_instruction: instruction_for(request.persona),
            user_prompt: build_user_prompt(&request.activity_text, request.display_name.as_deref()),
            output_schema: response_schema(),
            temperature: self.temperature,
        }
    }

    /// Run the remote analysis and return a fully validated response.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, EcoError> {
        info!("Requesting {} analysis", request.persona);
        let structured = self.build_request(request);

        let raw = self.manager.send_structured(&structured).await.inspect_err(|e| {
            error!("Analysis call failed [{}]: {}", e.kind(), e);
        })?;

        let response = validate(&raw).inspect_err(|e| {
            error!("Analysis output rejected [{}]: {}", e.kind(), e);
        })?;

        info!("Analysis ready with {} suggestions", response.suggestions.len());
        Ok(response)
    }

    /// Generate one image per suggestion concurrently.
    ///
    /// Never fails as a whole: every title gets an entry, and any individual failure
    /// becomes an empty data URI for that title only. Duplicate titles keep the
    /// last suggestion's result.
    pub async fn illustrate(&self, suggestions: &[Suggestion]) -> HashMap<String, ImageResult> {
        let futs: Vec<_> = suggestions
            .iter()
            .map(|suggestion| {
                let manager = self.manager.clone();
                let title = suggestion.title.clone();
                let request = ImageRequest::single(build_image_prompt(&suggestion.image_query));
                async move {
                    match manager.generate_image(&request).await? {
                        Some(bytes) if !bytes.is_empty() => Ok(to_data_uri(&bytes, IMAGE_MIME_TYPE)),
                        _ => Err(EcoError::ImageGenerationDegraded {
                            title,
                            reason: "no image returned".to_string(),
                        }),
                    }
                }
            })
            .collect();

        let results = run_settled(futs).await;

        let mut images = HashMap::with_capacity(suggestions.len());
        for (suggestion, result) in suggestions.iter().zip(results) {
            let image = match result {
                Ok(uri) => ImageResult {
                    suggestion_title: suggestion.title.clone(),
                    image_data_uri: uri,
                },
                Err(e) => {
                    warn!("Image for '{}' degraded: {}", suggestion.title, e);
                    ImageResult::degraded(&suggestion.title)
                }
            };
            images.insert(suggestion.title.clone(), image);
        }
        images
    }
}
