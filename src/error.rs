use thiserror::Error;

/// User-facing text for outages and transport failures.
pub const UPSTREAM_MESSAGE: &str =
    "An error occurred: Failed to get suggestions from the API. Please try again later.";

/// User-facing text for analysis output that failed validation.
pub const FORMAT_MESSAGE: &str =
    "An error occurred: Failed to parse the response from the AI. The format was invalid.";

/// Errors produced while talking to the remote capabilities or validating their output.
///
/// The UI collapses these to a single string via [`EcoError::user_message`], but the
/// variants stay distinct so logs can tell an outage from a format problem.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EcoError {
    /// Blank activity text. Never surfaced; the submission is simply ignored.
    #[error("activity text is empty")]
    EmptyInput,

    /// Network, auth or remote-side failure.
    #[error("upstream error: {message}")]
    Upstream {
        message: String,
        status: Option<u16>,
        transient: bool,
    },

    /// The analysis output was not parseable JSON.
    #[error("malformed JSON from model: {0}")]
    MalformedJson(String),

    /// The analysis output parsed but did not match the response contract.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// A single suggestion image could not be produced.
    #[error("image generation degraded for '{title}': {reason}")]
    ImageGenerationDegraded { title: String, reason: String },
}

impl EcoError {
    pub fn upstream(message: impl Into<String>) -> Self {
        EcoError::Upstream {
            message: message.into(),
            status: None,
            transient: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        EcoError::Upstream {
            message: message.into(),
            status: None,
            transient: true,
        }
    }

    /// Build an upstream error from an HTTP status, classifying rate limits and
    /// gateway failures as transient.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        EcoError::Upstream {
            message: message.into(),
            status: Some(status),
            transient: matches!(status, 429 | 500 | 502 | 503 | 504),
        }
    }

    /// Whether a single retry is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(self, EcoError::Upstream { transient: true, .. })
    }

    /// Short machine-friendly name used in logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            EcoError::EmptyInput => "EmptyInput",
            EcoError::Upstream { .. } => "UpstreamError",
            EcoError::MalformedJson(_) => "MalformedJson",
            EcoError::SchemaViolation(_) => "SchemaViolation",
            EcoError::ImageGenerationDegraded { .. } => "ImageGenerationDegraded",
        }
    }

    /// The single human-readable string shown in the `Failed` state.
    pub fn user_message(&self) -> String {
        match self {
            EcoError::MalformedJson(_) | EcoError::SchemaViolation(_) => FORMAT_MESSAGE.to_string(),
            _ => UPSTREAM_MESSAGE.to_string(),
        }
    }
}

impl From<reqwest::Error> for EcoError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL carries the API key as a query parameter.
        let err = err.without_url();
        let transient = err.is_connect() || err.is_timeout();
        EcoError::Upstream {
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
            transient,
        }
    }
}
