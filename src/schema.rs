use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::EcoError;

/// Analysis of the activity the user described.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentActivityAnalysis {
    pub harm: String,
    pub emission_analogy: String,
    pub future_impact: String,
    /// Only requested from the financial advisor, but always optional here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financial_cost: Option<String>,
}

/// One sustainable alternative. `title` doubles as the image join key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub title: String,
    pub description: String,
    pub positive_impact: u8,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub image_query: String,
    pub emission_reduction_analogy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financial_impact: Option<String>,
}

/// A complete, validated analysis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub overall_summary: String,
    pub current_activity_analysis: CurrentActivityAnalysis,
    pub suggestions: Vec<Suggestion>,
}

pub const MIN_IMPACT: u8 = 1;
pub const MAX_IMPACT: u8 = 5;

/// Structural contract sent upstream as `responseSchema`.
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "overallSummary": {
                "type": "STRING",
                "description": "A short, encouraging summary that bridges the user's situation to the suggestions. Address the user by name when one is given."
            },
            "currentActivityAnalysis": {
                "type": "OBJECT",
                "description": "Analysis of the user's current activity.",
                "properties": {
                    "harm": {
                        "type": "STRING",
                        "description": "What harm the current choice does to the environment."
                    },
                    "emissionAnalogy": {
                        "type": "STRING",
                        "description": "A relatable analogy for the carbon cost, e.g. 'the same footprint as charging 10,000 smartphones'."
                    },
                    "futureImpact": {
                        "type": "STRING",
                        "description": "The probable future impact if the activity continues."
                    },
                    "financialCost": {
                        "type": "STRING",
                        "description": "Approximate ongoing monetary cost of the current activity. Only when the advisor asks for it."
                    }
                },
                "required": ["harm", "emissionAnalogy", "futureImpact"]
            },
            "suggestions": {
                "type": "ARRAY",
                "description": "Two to four actionable, sustainable alternatives.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING", "description": "Short, unique title of the suggestion." },
                        "description": { "type": "STRING", "description": "How to put the suggestion into practice." },
                        "positiveImpact": {
                            "type": "INTEGER",
                            "description": "Environmental benefit from 1 (small) to 5 (major)."
                        },
                        "pros": {
                            "type": "ARRAY",
                            "items": { "type": "STRING" },
                            "description": "Benefits: environmental, financial, health and so on."
                        },
                        "cons": {
                            "type": "ARRAY",
                            "items": { "type": "STRING" },
                            "description": "Drawbacks, challenges or things to consider."
                        },
                        "imageQuery": {
                            "type": "STRING",
                            "description": "Simple scene description for a background image, e.g. 'electric bicycle commuting'."
                        },
                        "emissionReductionAnalogy": {
                            "type": "STRING",
                            "description": "Analogy for how much this cuts emissions compared with the original plan."
                        },
                        "financialImpact": {
                            "type": "STRING",
                            "description": "Expected savings or extra cost. Only when the advisor asks for it."
                        }
                    },
                    "required": [
                        "title",
                        "description",
                        "positiveImpact",
                        "pros",
                        "cons",
                        "imageQuery",
                        "emissionReductionAnalogy"
                    ]
                }
            }
        },
        "required": ["overallSummary", "currentActivityAnalysis", "suggestions"]
    })
}

/// Remove a surrounding markdown code fence (```json ... ```) if present.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.strip_suffix("```").unwrap_or(trimmed).trim();
    };
    // Drop the info string on the opening fence line ("json", "JSON", ...).
    let body = match rest.find('\n') {
        Some(idx) if rest[..idx].trim().chars().all(|c| c.is_ascii_alphanumeric()) => &rest[idx + 1..],
        Some(_) => rest,
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse and validate raw model output into an [`AnalysisResponse`].
///
/// Never returns a partially populated value: either every field passed the
/// checks below or an error naming the first violation is returned.
pub fn validate(raw_json_text: &str) -> Result<AnalysisResponse, EcoError> {
    let cleaned = strip_code_fences(raw_json_text);
    let value: Value =
        serde_json::from_str(cleaned).map_err(|e| EcoError::MalformedJson(e.to_string()))?;

    let Some(object) = value.as_object() else {
        return Err(EcoError::SchemaViolation(
            "top-level value is not an object".to_string(),
        ));
    };
    match object.get("overallSummary") {
        Some(Value::String(_)) => {}
        _ => return Err(violation("overallSummary is missing or not a string")),
    }
    match object.get("currentActivityAnalysis") {
        Some(Value::Object(_)) => {}
        _ => return Err(violation("currentActivityAnalysis is missing or not an object")),
    }
    match object.get("suggestions") {
        Some(Value::Array(_)) => {}
        _ => return Err(violation("suggestions is missing or not an array")),
    }

    let mut response: AnalysisResponse =
        serde_json::from_value(value).map_err(|e| EcoError::SchemaViolation(e.to_string()))?;
    normalize(&mut response);
    check_fields(&response)?;
    Ok(response)
}

fn violation(message: &str) -> EcoError {
    EcoError::SchemaViolation(message.to_string())
}

fn normalize(response: &mut AnalysisResponse) {
    let analysis = &mut response.current_activity_analysis;
    analysis.financial_cost = non_blank(analysis.financial_cost.take());
    for suggestion in &mut response.suggestions {
        suggestion.financial_impact = non_blank(suggestion.financial_impact.take());
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn require_text(field: &str, value: &str) -> Result<(), EcoError> {
    if value.trim().is_empty() {
        return Err(EcoError::SchemaViolation(format!("{} is empty", field)));
    }
    Ok(())
}

fn check_fields(response: &AnalysisResponse) -> Result<(), EcoError> {
    require_text("overallSummary", &response.overall_summary)?;
    let analysis = &response.current_activity_analysis;
    require_text("currentActivityAnalysis.harm", &analysis.harm)?;
    require_text("currentActivityAnalysis.emissionAnalogy", &analysis.emission_analogy)?;
    require_text("currentActivityAnalysis.futureImpact", &analysis.future_impact)?;

    for (i, suggestion) in response.suggestions.iter().enumerate() {
        let field = |name: &str| format!("suggestions[{}].{}", i, name);
        require_text(&field("title"), &suggestion.title)?;
        require_text(&field("description"), &suggestion.description)?;
        require_text(&field("imageQuery"), &suggestion.image_query)?;
        require_text(&field("emissionReductionAnalogy"), &suggestion.emission_reduction_analogy)?;
        if !(MIN_IMPACT..=MAX_IMPACT).contains(&suggestion.positive_impact) {
            return Err(EcoError::SchemaViolation(format!(
                "{} = {} is outside {}..={}",
                field("positiveImpact"),
                suggestion.positive_impact,
                MIN_IMPACT,
                MAX_IMPACT
            )));
        }
    }
    Ok(())
}
