//! In-process fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::EcoError;
use crate::llm_manager::{ImageRequest, LLMProvider, StructuredRequest};
use crate::schema::{AnalysisResponse, CurrentActivityAnalysis, Suggestion};

pub const FAKE_JPEG: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10];

pub fn suggestion(title: &str, impact: u8) -> Suggestion {
    Suggestion {
        title: title.to_string(),
        description: format!("Try {} instead.", title.to_lowercase()),
        positive_impact: impact,
        pros: vec!["Lower emissions".to_string(), "Cheaper over time".to_string()],
        cons: vec!["Takes some planning".to_string()],
        image_query: format!("scene for {}", title),
        emission_reduction_analogy: "Saves as much CO2 as a tree absorbs in a year.".to_string(),
        financial_impact: None,
    }
}

pub fn response_with_titles(titles: &[&str]) -> AnalysisResponse {
    AnalysisResponse {
        overall_summary: "Small changes add up quickly.".to_string(),
        current_activity_analysis: CurrentActivityAnalysis {
            harm: "Burning petrol releases CO2 and fine particles.".to_string(),
            emission_analogy: "Like charging 500 smartphones every day.".to_string(),
            future_impact: "At scale this keeps urban air unhealthy.".to_string(),
            financial_cost: None,
        },
        suggestions: titles
            .iter()
            .enumerate()
            .map(|(i, title)| suggestion(title, (i % 5) as u8 + 1))
            .collect(),
    }
}

/// Response with `n` suggestions titled "Suggestion 1".."Suggestion n".
pub fn sample_response(n: usize) -> AnalysisResponse {
    let titles: Vec<String> = (1..=n).map(|i| format!("Suggestion {}", i)).collect();
    let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
    response_with_titles(&refs)
}

pub fn sample_payload(n: usize) -> String {
    serde_json::to_string(&sample_response(n)).expect("sample response serializes")
}

pub fn payload_with_titles(titles: &[&str]) -> String {
    serde_json::to_string(&response_with_titles(titles)).expect("sample response serializes")
}

/// A provider whose answers are scripted up front.
#[derive(Default)]
pub struct ScriptedProvider {
    analyses: Mutex<VecDeque<Result<String, EcoError>>>,
    analysis_calls: Arc<AtomicUsize>,
    analysis_gate: Option<Arc<Notify>>,
    failing_images: Vec<String>,
    empty_images: Vec<String>,
    image_delay: Option<Duration>,
    image_hold: Option<(String, Arc<Notify>, Arc<Notify>)>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next analysis answer.
    pub fn with_analysis(self, answer: Result<String, EcoError>) -> Self {
        self.analyses.lock().expect("lock").push_back(answer);
        self
    }

    /// Every analysis call waits for one `notify_one` on the gate.
    pub fn with_analysis_gate(mut self, gate: Arc<Notify>) -> Self {
        self.analysis_gate = Some(gate);
        self
    }

    /// Image prompts containing `needle` fail with a permanent upstream error.
    pub fn with_failing_image(mut self, needle: &str) -> Self {
        self.failing_images.push(needle.to_string());
        self
    }

    /// Image prompts containing `needle` return no image.
    pub fn with_empty_image(mut self, needle: &str) -> Self {
        self.empty_images.push(needle.to_string());
        self
    }

    pub fn with_image_delay(mut self, delay: Duration) -> Self {
        self.image_delay = Some(delay);
        self
    }

    /// Image prompts containing `needle` signal `started`, then wait for `release`.
    pub fn with_image_hold(mut self, needle: &str, started: Arc<Notify>, release: Arc<Notify>) -> Self {
        self.image_hold = Some((needle.to_string(), started, release));
        self
    }

    pub fn analysis_calls(&self) -> Arc<AtomicUsize> {
        self.analysis_calls.clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted-text"
    }

    fn image_model_name(&self) -> &str {
        "scripted-image"
    }

    async fn generate_structured(&self, _request: &StructuredRequest) -> Result<String, EcoError> {
        self.analysis_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.analysis_gate {
            gate.notified().await;
        }
        self.analyses
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Err(EcoError::upstream("no scripted analysis left")))
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<Option<Vec<u8>>, EcoError> {
        if let Some(delay) = self.image_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((needle, started, release)) = &self.image_hold {
            if request.prompt.contains(needle.as_str()) {
                started.notify_one();
                release.notified().await;
            }
        }
        if self.failing_images.iter().any(|n| request.prompt.contains(n.as_str())) {
            return Err(EcoError::from_status(400, "image prompt rejected"));
        }
        if self.empty_images.iter().any(|n| request.prompt.contains(n.as_str())) {
            return Ok(None);
        }
        Ok(Some(FAKE_JPEG.to_vec()))
    }
}
