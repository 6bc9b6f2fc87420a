use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use anyhow::{Result, Context};
use log::warn;

use crate::persona::PersonaId;

/// Main configuration structure for eco-buddy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote model settings
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Timeout and retry limits
    #[serde(default)]
    pub requests: RequestsConfig,

    /// UI display configuration
    #[serde(default)]
    pub ui: UIConfig,

    /// Form values used when the command line leaves them out
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Model for the structured analysis
    #[serde(default = "default_model")]
    pub model: String,

    /// Model for suggestion images
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// REST endpoint root
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Sampling temperature for the analysis call
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestsConfig {
    /// Per-attempt timeout for the analysis call, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Per-attempt timeout for each image call, in seconds
    #[serde(default = "default_image_timeout_secs")]
    pub image_timeout_secs: u64,

    /// Extra attempts after a transient failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause before a retry, in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UIConfig {
    /// Enable colorful output
    #[serde(default = "default_colorful")]
    pub colorful: bool,

    /// Show a spinner while waiting
    #[serde(default = "default_progress_bars")]
    pub progress_bars: bool,

    /// Output format ("terminal", "json", "plain")
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub advisor: PersonaId,

    #[serde(default)]
    pub display_name: Option<String>,
}

// Default value functions
fn default_model() -> String { "gemini-2.5-flash".to_string() }
fn default_image_model() -> String { "imagen-3.0-generate-002".to_string() }
fn default_base_url() -> String { "https://generativelanguage.googleapis.com/v1beta".to_string() }
fn default_temperature() -> f32 { 0.7 }
fn default_api_key_env() -> String { "GEMINI_API_KEY".to_string() }
fn default_timeout_secs() -> u64 { 60 }
fn default_image_timeout_secs() -> u64 { 90 }
fn default_max_retries() -> u32 { 1 }
fn default_retry_backoff_ms() -> u64 { 500 }
fn default_colorful() -> bool { true }
fn default_progress_bars() -> bool { true }
fn default_output_format() -> String { "terminal".to_string() }

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            image_model: default_image_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for RequestsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            image_timeout_secs: default_image_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            colorful: default_colorful(),
            progress_bars: default_progress_bars(),
            output_format: default_output_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from command line argument or default locations
    pub fn load(config_path: &Option<String>) -> Result<Self> {
        if let Some(path) = config_path {
            let expanded = shellexpand::tilde(path);
            return Self::from_file(expanded.as_ref());
        }

        let default_paths = [
            "eco_buddy.toml",
            ".eco_buddy.toml",
            "~/.config/eco_buddy/config.toml",
        ];

        for path in default_paths {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                match Self::from_file(expanded_path.as_ref()) {
                    Ok(config) => return Ok(config),
                    Err(e) => warn!("Failed to load config from {}: {:#}", path, e),
                }
            }
        }

        Ok(Self::default())
    }

    /// Merge with command-line arguments (CLI args take precedence)
    pub fn merge_with_args(&mut self, headless: bool, json: bool) {
        if headless {
            self.ui.colorful = false;
            self.ui.progress_bars = false;
        }
        if json {
            self.ui.output_format = "json".to_string();
            self.ui.progress_bars = false;
        }
    }

    /// Resolve the API key from the configured variable, then `API_KEY`.
    pub fn api_key(&self) -> Result<String> {
        [self.gemini.api_key_env.as_str(), "API_KEY"]
            .into_iter()
            .filter_map(|name| std::env::var(name).ok())
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
            .with_context(|| {
                format!(
                    "{} environment variable not set (API_KEY is also accepted)",
                    self.gemini.api_key_env
                )
            })
    }
}
