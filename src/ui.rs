use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;

use crate::config::UIConfig;
use crate::event_bus::{Event, EventBus, EventEmitter};
use crate::impl_event_emitter;
use crate::persona::PersonaId;
use crate::schema::{MAX_IMPACT, Suggestion};
use crate::state::{PhaseKind, Snapshot};

pub const SAMPLE_ACTIVITIES: [&str; 3] = [
    "My daily 10-mile commute to work in a gas-powered car",
    "Buying a new fast-fashion t-shirt online",
    "My weekly grocery haul, which includes a lot of red meat and imported foods",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Terminal,
    Plain,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "terminal" => OutputFormat::Terminal,
            "plain" => OutputFormat::Plain,
            "json" => OutputFormat::Json,
            other => {
                warn!("Unknown output format '{}', using terminal", other);
                OutputFormat::Terminal
            }
        }
    }
}

/// Terminal front end: a spinner while a cycle runs, then the rendered result.
pub struct TerminalUI {
    format: OutputFormat,
    progress_bars: bool,
    spinner: Option<ProgressBar>,
    event_bus: Option<Arc<EventBus>>,
}

impl TerminalUI {
    pub fn new(config: &UIConfig) -> Self {
        let format = OutputFormat::parse(&config.output_format);
        if !config.colorful || format != OutputFormat::Terminal {
            colored::control::set_override(false);
        }
        Self {
            format,
            progress_bars: config.progress_bars && format == OutputFormat::Terminal,
            spinner: None,
            event_bus: None,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Show a spinner that follows the cycle's progress events.
    pub fn start(&mut self) {
        if !self.progress_bars {
            return;
        }
        let Some(bus) = &self.event_bus else {
            return;
        };

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(Duration::from_millis(120));
        self.spinner = Some(spinner.clone());

        let mut receiver = bus.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = receiver.recv().await {
                match event {
                    Event::Progress { message, .. } => spinner.set_message(message),
                    Event::APIRetry { provider, attempt, .. } => {
                        spinner.set_message(format!("{} is busy, retrying (attempt {})...", provider, attempt + 1))
                    }
                    Event::ImageSettled { title, .. } => {
                        spinner.set_message(format!("Image ready for {}", title))
                    }
                    Event::CycleCompleted { .. } | Event::CycleFailed { .. } => {
                        spinner.finish_and_clear();
                        break;
                    }
                    _ => {}
                }
            }
        });
    }

    pub fn finish(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    /// Print the final state of a cycle in the configured format.
    pub fn render(&self, snapshot: &Snapshot) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(snapshot)?);
            }
            OutputFormat::Terminal | OutputFormat::Plain => {
                print!("{}", render_snapshot(snapshot));
            }
        }
        Ok(())
    }
}

// Implement EventEmitter trait for TerminalUI
impl_event_emitter!(TerminalUI);

pub fn welcome_text() -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "Eco Buddy".bright_green().bold());
    let _ = writeln!(
        out,
        "Describe something you do and an advisor will size up its environmental impact\nand suggest greener alternatives."
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", "Try one of these:".bright_white().bold());
    for sample in SAMPLE_ACTIVITIES {
        let _ = writeln!(out, "  eco-buddy \"{}\"", sample);
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Pick a voice with --advisor (see --list-advisors).");
    out
}

pub fn advisor_list() -> String {
    let mut out = String::new();
    for persona in PersonaId::ALL {
        let _ = writeln!(out, "  {:<10} {}", persona.as_str().bright_cyan(), persona.tagline());
    }
    out
}

fn impact_meter(impact: u8) -> String {
    let filled = impact.min(MAX_IMPACT) as usize;
    format!(
        "{}{} {}/{}",
        "●".repeat(filled),
        "○".repeat(MAX_IMPACT as usize - filled),
        impact,
        MAX_IMPACT
    )
}

fn render_suggestion(out: &mut String, index: usize, suggestion: &Suggestion, image: Option<&String>) {
    let _ = writeln!(
        out,
        "{} {}",
        format!("{}.", index + 1).bright_white().bold(),
        suggestion.title.bright_green().bold()
    );
    let _ = writeln!(out, "   Impact: {}", impact_meter(suggestion.positive_impact).green());
    let _ = writeln!(out, "   {}", suggestion.description);
    let _ = writeln!(out, "   {} {}", "Emission savings:".cyan(), suggestion.emission_reduction_analogy);
    if let Some(financial) = &suggestion.financial_impact {
        let _ = writeln!(out, "   {} {}", "Financial impact:".yellow(), financial);
    }
    if !suggestion.pros.is_empty() {
        let _ = writeln!(out, "   {}", "Pros".bright_green());
        for pro in &suggestion.pros {
            let _ = writeln!(out, "     + {}", pro);
        }
    }
    if !suggestion.cons.is_empty() {
        let _ = writeln!(out, "   {}", "Considerations".bright_yellow());
        for con in &suggestion.cons {
            let _ = writeln!(out, "     - {}", con);
        }
    }
    match image {
        Some(uri) if !uri.is_empty() => {
            let _ = writeln!(out, "   {}", "Image: ready".dimmed());
        }
        Some(_) => {
            let _ = writeln!(out, "   {}", "Image: unavailable".dimmed());
        }
        None => {
            let _ = writeln!(out, "   {}", "Image: pending".dimmed());
        }
    }
    let _ = writeln!(out);
}

/// Human-readable rendering of a snapshot.
pub fn render_snapshot(snapshot: &Snapshot) -> String {
    let mut out = String::new();

    if snapshot.phase == PhaseKind::Failed {
        if let Some(message) = &snapshot.error_message {
            let _ = writeln!(out, "{} {}", "✗".red().bold(), message.red());
        }
        return out;
    }

    let Some(analysis) = &snapshot.analysis_result else {
        if let Some(progress) = &snapshot.progress_message {
            let _ = writeln!(out, "{}", progress.dimmed());
        }
        return out;
    };

    let current = &analysis.current_activity_analysis;
    let _ = writeln!(out, "{}", "Current Impact Analysis".bright_white().bold().underline());
    let _ = writeln!(out, "{}", "Harm Analysis".red().bold());
    let _ = writeln!(out, "  {}", current.harm);
    let _ = writeln!(out, "{}", "Emissions Footprint".yellow().bold());
    let _ = writeln!(out, "  {}", current.emission_analogy);
    match &current.financial_cost {
        Some(cost) => {
            let _ = writeln!(out, "{}", "Financial Cost".yellow().bold());
            let _ = writeln!(out, "  {}", cost);
        }
        None if snapshot.persona.expects_financial_fields() => {
            let _ = writeln!(out, "{}", "Financial Cost: not provided by the advisor".dimmed());
        }
        None => {}
    }
    let _ = writeln!(out, "{}", "Future Outlook".magenta().bold());
    let _ = writeln!(out, "  {}", current.future_impact);
    let _ = writeln!(out);

    let heading = if snapshot.display_name.trim().is_empty() {
        "Sustainable Alternatives".to_string()
    } else {
        format!("Here are some better options, {}", snapshot.display_name.trim())
    };
    let _ = writeln!(out, "{}", heading.bright_white().bold().underline());
    let _ = writeln!(out, "{}", analysis.overall_summary.italic());
    let _ = writeln!(out);

    for (index, suggestion) in analysis.suggestions.iter().enumerate() {
        let image = if snapshot.phase == PhaseKind::AnalysisComplete {
            snapshot.image_results_by_title.get(&suggestion.title)
        } else {
            None
        };
        render_suggestion(&mut out, index, suggestion, image);
    }
    out
}

/// File-name-safe form of a suggestion title.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() { "suggestion".to_string() } else { slug }
}

/// Split a `data:<mime>;base64,<payload>` URI into its MIME type and bytes.
pub fn decode_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let (mime, payload) = uri.strip_prefix("data:")?.split_once(";base64,")?;
    let bytes = BASE64_STANDARD.decode(payload).ok()?;
    Some((mime.to_string(), bytes))
}

/// Write every generated image into `dir`; degraded entries are skipped.
pub fn save_images(snapshot: &Snapshot, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut titles: Vec<&String> = snapshot.image_results_by_title.keys().collect();
    titles.sort();

    let mut written = Vec::new();
    for title in titles {
        let uri = &snapshot.image_results_by_title[title];
        if uri.is_empty() {
            continue;
        }
        let Some((mime, bytes)) = decode_data_uri(uri) else {
            warn!("Skipping image for '{}': not a base64 data URI", title);
            continue;
        };
        let extension = if mime == "image/png" { "png" } else { "jpg" };
        let path = dir.join(format!("{}.{}", slugify(title), extension));
        fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}
