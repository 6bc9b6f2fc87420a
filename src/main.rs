use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

mod concurrency;
mod config;
mod error;
mod event_bus;
mod llm_manager;
mod logger;
mod orchestrator;
mod persona;
mod providers;
mod schema;
mod session;
mod state;
mod ui;

#[cfg(test)]
mod test_support;

use config::Config;
use event_bus::{EventBus, EventEmitter};
use llm_manager::{LLMManager, RetryPolicy};
use orchestrator::QueryOrchestrator;
use persona::PersonaId;
use providers::GeminiProvider;
use session::Session;
use state::InteractionState;
use ui::TerminalUI;

#[derive(Parser)]
#[command(name = "eco-buddy", version, about = "Size up the environmental impact of an everyday activity")]
struct Args {
    /// Activity to analyze, e.g. "my daily 10-mile commute in a gas car"
    activity: Vec<String>,

    /// Your name, used to personalise the advice
    #[arg(short, long)]
    name: Option<String>,

    /// Advisor voice
    #[arg(short, long, value_enum)]
    advisor: Option<PersonaId>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Run without spinner or colors
    #[arg(long)]
    headless: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the final state as JSON
    #[arg(long)]
    json: bool,

    /// Write generated images into this directory
    #[arg(long, value_name = "DIR")]
    save_images: Option<PathBuf>,

    /// List the available advisors and exit
    #[arg(long)]
    list_advisors: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    logger::init(args.verbose, args.json);

    let mut config = Config::load(&args.config)?;
    config.merge_with_args(args.headless, args.json);

    let mut ui = TerminalUI::new(&config.ui);

    if args.list_advisors {
        print!("{}", ui::advisor_list());
        return Ok(());
    }

    let activity = args.activity.join(" ");
    if activity.trim().is_empty() {
        print!("{}", ui::welcome_text());
        return Ok(());
    }

    let api_key = config.api_key()?;
    let persona = args.advisor.unwrap_or(config.defaults.advisor);
    let display_name = args.name.clone().or_else(|| config.defaults.display_name.clone());

    let event_bus = Arc::new(EventBus::new(256));
    let provider = GeminiProvider::new(&config.gemini, api_key);
    let manager = LLMManager::new(Box::new(provider), RetryPolicy::from(&config.requests))
        .with_event_bus(event_bus.clone());
    let orchestrator = Arc::new(QueryOrchestrator::new(Arc::new(manager), config.gemini.temperature));
    let initial = InteractionState::new(
        config.defaults.advisor,
        config.defaults.display_name.as_deref().unwrap_or_default(),
    );
    let session = Session::new(orchestrator, initial).with_event_bus(event_bus.clone());
    session.set_persona(persona).await;
    session.set_display_name(display_name.as_deref().unwrap_or_default()).await;
    session.set_activity_text(&activity).await;

    ui.set_event_bus(event_bus.clone());
    ui.start();

    info!("Analyzing with the {} advisor", persona);
    let handle = session
        .submit(&activity, display_name.as_deref(), persona)
        .await
        .context("Submission was not accepted")?;
    handle.await.context("Analysis task did not complete")?;
    ui.finish();

    let snapshot = session.snapshot().await;
    ui.render(&snapshot)?;

    if let Some(dir) = &args.save_images {
        let written = ui::save_images(&snapshot, dir)?;
        if written.is_empty() {
            warn!("No images to save");
        } else if ui.format() != ui::OutputFormat::Json {
            println!("Saved {} image(s) to {}", written.len(), dir.display());
        }
    }

    if args.verbose {
        let metrics = event_bus.get_metrics().await;
        info!(
            "API calls: {} (retries {}, errors {}), images: {} generated, {} degraded",
            metrics.total_api_calls,
            metrics.api_retries,
            metrics.api_errors,
            metrics.images_generated,
            metrics.images_degraded
        );
    }

    if snapshot.error_message.is_some() {
        std::process::exit(1);
    }
    Ok(())
}
