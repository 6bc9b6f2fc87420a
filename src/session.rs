use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::event_bus::{Event, EventBus, EventEmitter};
use crate::impl_event_emitter;
use crate::orchestrator::{AnalysisRequest, QueryOrchestrator};
use crate::persona::PersonaId;
use crate::state::{Commit, CycleId, IMAGES_PROGRESS_MESSAGE, InteractionState, Snapshot, Transition};

/// Drives the interaction state machine: accepts submissions, runs each cycle in
/// the background and commits its results only while that cycle is still current.
#[derive(Clone)]
pub struct Session {
    orchestrator: Arc<QueryOrchestrator>,
    state: Arc<RwLock<InteractionState>>,
    event_bus: Option<Arc<EventBus>>,
}

impl Session {
    pub fn new(orchestrator: Arc<QueryOrchestrator>, initial: InteractionState) -> Self {
        Self {
            orchestrator,
            state: Arc::new(RwLock::new(initial)),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.set_event_bus(bus);
        self
    }

    /// Current state for the presentation layer.
    pub async fn snapshot(&self) -> Snapshot {
        self.state.read().await.snapshot()
    }

    pub async fn set_persona(&self, persona: PersonaId) {
        self.state.write().await.set_persona(persona);
    }

    pub async fn set_activity_text(&self, text: &str) {
        self.state.write().await.set_activity_text(text);
    }

    pub async fn set_display_name(&self, name: &str) {
        self.state.write().await.set_display_name(name);
    }

    /// Start a new analysis cycle.
    ///
    /// Returns `None` when the submission is ignored (blank text, or a request
    /// already in flight). Otherwise the handle resolves once this cycle's
    /// background work has finished, whether or not its results were kept.
    pub async fn submit(
        &self,
        activity_text: &str,
        display_name: Option<&str>,
        persona: PersonaId,
    ) -> Option<JoinHandle<()>> {
        let (cycle, request) = self
            .state
            .write()
            .await
            .begin(activity_text, display_name, persona)?;

        info!("Cycle {} started with the {} advisor", cycle, persona);
        let _ = self
            .emit_event(Event::CycleStarted {
                cycle_id: cycle.to_string(),
                persona: persona.to_string(),
            })
            .await;
        let _ = self
            .emit_event(Event::Progress {
                cycle_id: cycle.to_string(),
                message: format!("Consulting the {} advisor...", persona.label()),
            })
            .await;

        let session = self.clone();
        Some(tokio::spawn(async move {
            session.run_cycle(cycle, request).await;
        }))
    }

    async fn run_cycle(&self, cycle: CycleId, request: AnalysisRequest) {
        let response = match self.orchestrator.analyze(&request).await {
            Ok(response) => response,
            Err(err) => {
                let kind = err.kind();
                let message = err.user_message();
                if self.commit(cycle, Transition::AnalysisFailed(err)).await {
                    error!("Cycle {} failed [{}]", cycle, kind);
                    let _ = self
                        .emit_event(Event::CycleFailed {
                            cycle_id: cycle.to_string(),
                            kind: kind.to_string(),
                            message,
                        })
                        .await;
                }
                return;
            }
        };

        let suggestions = response.suggestions.clone();
        if !self.commit(cycle, Transition::AnalysisSucceeded(response)).await {
            return;
        }
        if suggestions.is_empty() {
            self.emit_completed(cycle).await;
            return;
        }

        let _ = self
            .emit_event(Event::AnalysisReady {
                cycle_id: cycle.to_string(),
                suggestions: suggestions.len(),
            })
            .await;
        let _ = self
            .emit_event(Event::Progress {
                cycle_id: cycle.to_string(),
                message: IMAGES_PROGRESS_MESSAGE.to_string(),
            })
            .await;

        let images = self.orchestrator.illustrate(&suggestions).await;
        let settled: Vec<(String, bool)> = images
            .values()
            .map(|image| (image.suggestion_title.clone(), image.is_degraded()))
            .collect();

        if !self.commit(cycle, Transition::ImagesSettled(images)).await {
            return;
        }
        for (title, degraded) in settled {
            let _ = self
                .emit_event(Event::ImageSettled {
                    cycle_id: cycle.to_string(),
                    title,
                    degraded,
                })
                .await;
        }
        self.emit_completed(cycle).await;
    }

    /// Apply a transition; returns whether the cycle is still current.
    async fn commit(&self, cycle: CycleId, transition: Transition) -> bool {
        let outcome = self.state.write().await.apply(cycle, transition);
        match outcome {
            Commit::Applied => true,
            Commit::Stale => {
                info!("Dropping late result for superseded cycle {}", cycle);
                let _ = self
                    .emit_event(Event::CycleSuperseded {
                        cycle_id: cycle.to_string(),
                    })
                    .await;
                false
            }
            Commit::Rejected => {
                warn!("Cycle {} received a transition out of order", cycle);
                false
            }
        }
    }

    async fn emit_completed(&self, cycle: CycleId) {
        info!("Cycle {} complete", cycle);
        let _ = self
            .emit_event(Event::CycleCompleted {
                cycle_id: cycle.to_string(),
            })
            .await;
    }
}

// Implement EventEmitter trait for Session
impl_event_emitter!(Session);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FORMAT_MESSAGE, UPSTREAM_MESSAGE};
    use crate::llm_manager::{LLMManager, RetryPolicy};
    use crate::state::PhaseKind;
    use crate::test_support::{ScriptedProvider, payload_with_titles, sample_payload, sample_response};
    use serde_json::{Value, json};
    use tokio::sync::Notify;

    fn session(provider: ScriptedProvider) -> (Session, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new(256));
        let manager = LLMManager::new(Box::new(provider), RetryPolicy::default())
            .with_event_bus(bus.clone());
        let orchestrator = Arc::new(QueryOrchestrator::new(Arc::new(manager), 0.7));
        let session = Session::new(orchestrator, InteractionState::default()).with_event_bus(bus.clone());
        (session, bus)
    }

    fn drain_lifecycle(receiver: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<&'static str> {
        let mut seen = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            let name = match event {
                Event::CycleStarted { .. } => "started",
                Event::AnalysisReady { .. } => "ready",
                Event::CycleCompleted { .. } => "completed",
                Event::CycleFailed { .. } => "failed",
                Event::CycleSuperseded { .. } => "superseded",
                _ => continue,
            };
            seen.push(name);
        }
        seen
    }

    #[tokio::test]
    async fn test_scenario_commute_with_scientist() {
        let provider = ScriptedProvider::new().with_analysis(Ok(sample_payload(3)));
        let (session, bus) = session(provider);
        let mut receiver = bus.subscribe();

        assert_eq!(session.snapshot().await.phase, PhaseKind::Idle);
        let handle = session
            .submit("commute 10 miles by gas car", None, PersonaId::Scientist)
            .await
            .expect("submission accepted");
        let pending = session.snapshot().await;
        assert_eq!(pending.phase, PhaseKind::Submitting);
        assert!(pending.is_submitting);
        assert_eq!(pending.progress_message.as_deref(), Some("Consulting the scientist advisor..."));

        handle.await.unwrap();

        let done = session.snapshot().await;
        assert_eq!(done.phase, PhaseKind::AnalysisComplete);
        let analysis = done.analysis_result.expect("analysis present");
        assert_eq!(analysis.suggestions.len(), 3);
        for suggestion in &analysis.suggestions {
            assert!(done.image_results_by_title.contains_key(&suggestion.title));
        }
        assert!(!done.is_submitting);
        assert!(done.progress_message.is_none());
        assert_eq!(drain_lifecycle(&mut receiver), vec!["started", "ready", "completed"]);
    }

    #[tokio::test]
    async fn test_scenario_empty_text_is_ignored() {
        let (session, _bus) = session(ScriptedProvider::new());
        session.set_activity_text("half-typed").await;
        let before = session.snapshot().await;

        assert!(session.submit("", None, PersonaId::Scientist).await.is_none());
        assert!(session.submit("   ", Some("Alex"), PersonaId::Ai).await.is_none());
        assert_eq!(session.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_scenario_non_json_output_fails_with_format_message() {
        let provider = ScriptedProvider::new().with_analysis(Ok("Here are some ideas: ride a bike!".to_string()));
        let (session, bus) = session(provider);

        let handle = session.submit("drive to the shop", None, PersonaId::Elder).await.unwrap();
        handle.await.unwrap();

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.phase, PhaseKind::Failed);
        assert_eq!(snapshot.error_message.as_deref(), Some(FORMAT_MESSAGE));
        assert!(snapshot.analysis_result.is_none());
        assert!(snapshot.image_results_by_title.is_empty());
        assert_eq!(bus.get_metrics().await.cycles_failed, 1);
    }

    #[tokio::test]
    async fn test_upstream_failure_message() {
        let provider = ScriptedProvider::new().with_analysis(Err(crate::error::EcoError::from_status(401, "bad key")));
        let (session, _bus) = session(provider);

        session.submit("drive", None, PersonaId::Scientist).await.unwrap().await.unwrap();
        assert_eq!(session.snapshot().await.error_message.as_deref(), Some(UPSTREAM_MESSAGE));
    }

    #[tokio::test]
    async fn test_scenario_one_image_fails() {
        let provider = ScriptedProvider::new()
            .with_analysis(Ok(sample_payload(2)))
            .with_failing_image("Suggestion 2");
        let (session, bus) = session(provider);

        session.submit("drive", None, PersonaId::Scientist).await.unwrap().await.unwrap();

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.phase, PhaseKind::AnalysisComplete);
        assert_eq!(snapshot.analysis_result.unwrap().suggestions.len(), 2);
        assert!(snapshot.image_results_by_title["Suggestion 1"].starts_with("data:image/jpeg;base64,"));
        assert_eq!(snapshot.image_results_by_title["Suggestion 2"], "");

        let metrics = bus.get_metrics().await;
        assert_eq!(metrics.images_generated, 1);
        assert_eq!(metrics.images_degraded, 1);
    }

    #[tokio::test]
    async fn test_scenario_financial_fields_preserved() {
        let mut payload: Value = serde_json::from_str(&sample_payload(2)).unwrap();
        payload["currentActivityAnalysis"]["financialCost"] = json!("Roughly $150 a month in fuel and parking");
        payload["suggestions"][0]["financialImpact"] = json!("Saves about $90 a month");
        payload["suggestions"][1]["financialImpact"] = json!("Costs $20 a month more");
        let provider = ScriptedProvider::new().with_analysis(Ok(payload.to_string()));
        let (session, _bus) = session(provider);

        session
            .submit("commute 10 miles by gas car", Some("Alex"), PersonaId::Financial)
            .await
            .unwrap()
            .await
            .unwrap();

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.persona, PersonaId::Financial);
        assert_eq!(snapshot.display_name, "Alex");
        let analysis = snapshot.analysis_result.unwrap();
        assert_eq!(
            analysis.current_activity_analysis.financial_cost.as_deref(),
            Some("Roughly $150 a month in fuel and parking")
        );
        assert_eq!(analysis.suggestions[0].financial_impact.as_deref(), Some("Saves about $90 a month"));
        assert_eq!(analysis.suggestions[1].financial_impact.as_deref(), Some("Costs $20 a month more"));
    }

    #[tokio::test]
    async fn test_submit_ignored_while_submitting() {
        let gate = Arc::new(Notify::new());
        let provider = ScriptedProvider::new()
            .with_analysis(Ok(sample_payload(1)))
            .with_analysis_gate(gate.clone());
        let calls = provider.analysis_calls();
        let (session, _bus) = session(provider);

        let handle = session.submit("drive", None, PersonaId::Scientist).await.unwrap();
        assert!(session.submit("fly", None, PersonaId::Scientist).await.is_none());
        assert_eq!(session.snapshot().await.activity_text, "drive");

        gate.notify_one();
        handle.await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(session.snapshot().await.phase, PhaseKind::AnalysisComplete);
    }

    #[tokio::test]
    async fn test_late_images_from_superseded_cycle_are_dropped() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let provider = ScriptedProvider::new()
            .with_analysis(Ok(payload_with_titles(&["Slow bike"])))
            .with_analysis(Ok(sample_payload(2)))
            .with_image_hold("Slow bike", started.clone(), release.clone());
        let (session, bus) = session(provider);

        let first = session.submit("drive to work", None, PersonaId::Scientist).await.unwrap();
        started.notified().await;
        assert_eq!(session.snapshot().await.phase, PhaseKind::AnalysisReady);

        let second = session
            .submit("fly to Rome", Some("Alex"), PersonaId::Nature)
            .await
            .expect("new submission accepted while images are pending");
        let fresh = session.snapshot().await;
        assert_eq!(fresh.phase, PhaseKind::Submitting);
        assert!(fresh.analysis_result.is_none());
        assert!(fresh.image_results_by_title.is_empty());

        second.await.unwrap();
        let completed = session.snapshot().await;
        assert_eq!(completed.phase, PhaseKind::AnalysisComplete);
        assert_eq!(completed.analysis_result.as_ref(), Some(&sample_response(2)));

        release.notify_one();
        first.await.unwrap();

        let after = session.snapshot().await;
        assert_eq!(after, completed);
        assert!(!after.image_results_by_title.contains_key("Slow bike"));
        assert_eq!(bus.get_metrics().await.stale_results_dropped, 1);
    }

    #[tokio::test]
    async fn test_empty_suggestions_skip_images() {
        let provider = ScriptedProvider::new().with_analysis(Ok(sample_payload(0)));
        let (session, bus) = session(provider);
        let mut receiver = bus.subscribe();

        session.submit("walk to school", None, PersonaId::Ai).await.unwrap().await.unwrap();

        assert_eq!(session.snapshot().await.phase, PhaseKind::AnalysisComplete);
        assert_eq!(drain_lifecycle(&mut receiver), vec!["started", "completed"]);
    }

    #[tokio::test]
    async fn test_new_cycle_clears_previous_error() {
        let provider = ScriptedProvider::new()
            .with_analysis(Ok("garbage".to_string()))
            .with_analysis(Ok(sample_payload(1)));
        let (session, _bus) = session(provider);

        session.submit("drive", None, PersonaId::Scientist).await.unwrap().await.unwrap();
        assert_eq!(session.snapshot().await.phase, PhaseKind::Failed);

        let handle = session.submit("drive less", None, PersonaId::Scientist).await.unwrap();
        let pending = session.snapshot().await;
        assert!(pending.error_message.is_none());
        assert_eq!(pending.activity_text, "drive less");

        handle.await.unwrap();
        assert_eq!(session.snapshot().await.phase, PhaseKind::AnalysisComplete);
    }

    #[tokio::test]
    async fn test_setters_update_form() {
        let (session, _bus) = session(ScriptedProvider::new());
        session.set_persona(PersonaId::Nature).await;
        session.set_display_name("Robin").await;
        session.set_activity_text("burning leaves").await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.persona, PersonaId::Nature);
        assert_eq!(snapshot.display_name, "Robin");
        assert_eq!(snapshot.activity_text, "burning leaves");
        assert_eq!(snapshot.phase, PhaseKind::Idle);
    }
}
