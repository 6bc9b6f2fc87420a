use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use serde::Serialize;
use uuid::Uuid;

use crate::error::EcoError;
use crate::orchestrator::{AnalysisRequest, ImageResult};
use crate::persona::PersonaId;
use crate::schema::AnalysisResponse;

/// Identity of one analysis cycle. Results tagged with an older id are dropped.
pub type CycleId = Uuid;

pub const IMAGES_PROGRESS_MESSAGE: &str = "Creating inspirational images...";

/// Lifecycle of the current cycle. Each variant carries exactly the data that
/// is valid in it, so e.g. a failed cycle cannot also hold a response.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Phase {
    #[default]
    Idle,
    Submitting {
        request: AnalysisRequest,
    },
    /// Analysis stored, image fan-out still running.
    AnalysisReady {
        request: AnalysisRequest,
        response: Arc<AnalysisResponse>,
    },
    AnalysisComplete {
        request: AnalysisRequest,
        response: Arc<AnalysisResponse>,
        images: HashMap<String, ImageResult>,
    },
    Failed {
        request: AnalysisRequest,
        error: EcoError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhaseKind {
    Idle,
    Submitting,
    AnalysisReady,
    AnalysisComplete,
    Failed,
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Idle => PhaseKind::Idle,
            Phase::Submitting { .. } => PhaseKind::Submitting,
            Phase::AnalysisReady { .. } => PhaseKind::AnalysisReady,
            Phase::AnalysisComplete { .. } => PhaseKind::AnalysisComplete,
            Phase::Failed { .. } => PhaseKind::Failed,
        }
    }
}

/// Events that move a cycle forward.
#[derive(Debug, Clone)]
pub enum Transition {
    AnalysisSucceeded(AnalysisResponse),
    AnalysisFailed(EcoError),
    ImagesSettled(HashMap<String, ImageResult>),
}

/// Outcome of [`InteractionState::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Applied,
    /// The cycle was superseded by a newer submission.
    Stale,
    /// The transition does not fit the current phase; nothing changed.
    Rejected,
}

/// Editable form values. `submit` records the values it was given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormFields {
    pub activity_text: String,
    pub display_name: String,
    pub persona: PersonaId,
}

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub cycle_id: Option<String>,
    pub phase: PhaseKind,
    pub activity_text: String,
    pub display_name: String,
    pub persona: PersonaId,
    pub analysis_result: Option<AnalysisResponse>,
    pub image_results_by_title: HashMap<String, String>,
    pub is_submitting: bool,
    pub images_pending: bool,
    pub progress_message: Option<String>,
    pub error_message: Option<String>,
}

/// Single owner of the current cycle.
#[derive(Debug, Clone, Default)]
pub struct InteractionState {
    form: FormFields,
    cycle: Option<CycleId>,
    phase: Phase,
}

impl InteractionState {
    pub fn new(persona: PersonaId, display_name: &str) -> Self {
        Self {
            form: FormFields {
                activity_text: String::new(),
                display_name: display_name.to_string(),
                persona,
            },
            cycle: None,
            phase: Phase::Idle,
        }
    }

    pub fn set_activity_text(&mut self, text: &str) {
        self.form.activity_text = text.to_string();
    }

    pub fn set_display_name(&mut self, name: &str) {
        self.form.display_name = name.to_string();
    }

    pub fn set_persona(&mut self, persona: PersonaId) {
        self.form.persona = persona;
    }

    /// Start a new cycle, discarding everything from the previous one.
    ///
    /// Returns `None` (and changes nothing) for blank text or while a request
    /// is already in flight.
    pub fn begin(
        &mut self,
        activity_text: &str,
        display_name: Option<&str>,
        persona: PersonaId,
    ) -> Option<(CycleId, AnalysisRequest)> {
        if matches!(self.phase, Phase::Submitting { .. }) {
            debug!("Ignoring submit while a request is in flight");
            return None;
        }
        let request = match AnalysisRequest::new(activity_text, display_name, persona) {
            Ok(request) => request,
            Err(e) => {
                debug!("Ignoring submit: {}", e);
                return None;
            }
        };

        self.form = FormFields {
            activity_text: activity_text.to_string(),
            display_name: display_name.unwrap_or_default().to_string(),
            persona,
        };
        let cycle = Uuid::new_v4();
        self.cycle = Some(cycle);
        self.phase = Phase::Submitting {
            request: request.clone(),
        };
        Some((cycle, request))
    }

    /// Commit a result for `cycle`. Late results from a superseded cycle are
    /// reported as `Stale` and leave the state untouched.
    pub fn apply(&mut self, cycle: CycleId, transition: Transition) -> Commit {
        if self.cycle != Some(cycle) {
            return Commit::Stale;
        }

        let current = std::mem::take(&mut self.phase);
        let (next, commit) = match (current, transition) {
            (Phase::Submitting { request }, Transition::AnalysisSucceeded(response)) => {
                let response = Arc::new(response);
                let next = if response.suggestions.is_empty() {
                    Phase::AnalysisComplete {
                        request,
                        response,
                        images: HashMap::new(),
                    }
                } else {
                    Phase::AnalysisReady { request, response }
                };
                (next, Commit::Applied)
            }
            (Phase::Submitting { request }, Transition::AnalysisFailed(error)) => {
                (Phase::Failed { request, error }, Commit::Applied)
            }
            (Phase::AnalysisReady { request, response }, Transition::ImagesSettled(images)) => (
                Phase::AnalysisComplete {
                    request,
                    response,
                    images,
                },
                Commit::Applied,
            ),
            (phase, _) => (phase, Commit::Rejected),
        };
        self.phase = next;
        commit
    }

    pub fn snapshot(&self) -> Snapshot {
        let (analysis_result, image_results_by_title, progress_message, error_message) =
            match &self.phase {
                Phase::Idle => (None, HashMap::new(), None, None),
                Phase::Submitting { request } => (
                    None,
                    HashMap::new(),
                    Some(format!("Consulting the {} advisor...", request.persona.label())),
                    None,
                ),
                Phase::AnalysisReady { response, .. } => (
                    Some(response.as_ref().clone()),
                    HashMap::new(),
                    Some(IMAGES_PROGRESS_MESSAGE.to_string()),
                    None,
                ),
                Phase::AnalysisComplete { response, images, .. } => (
                    Some(response.as_ref().clone()),
                    images
                        .iter()
                        .map(|(title, image)| (title.clone(), image.image_data_uri.clone()))
                        .collect(),
                    None,
                    None,
                ),
                Phase::Failed { error, .. } => (None, HashMap::new(), None, Some(error.user_message())),
            };

        Snapshot {
            cycle_id: self.cycle.map(|id| id.to_string()),
            phase: self.phase.kind(),
            activity_text: self.form.activity_text.clone(),
            display_name: self.form.display_name.clone(),
            persona: self.form.persona,
            analysis_result,
            image_results_by_title,
            is_submitting: matches!(self.phase, Phase::Submitting { .. }),
            images_pending: matches!(self.phase, Phase::AnalysisReady { .. }),
            progress_message,
            error_message,
        }
    }
}

#[cfg(test)]
impl InteractionState {
    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn current_cycle(&self) -> Option<CycleId> {
        self.cycle
    }

    pub fn form(&self) -> &FormFields {
        &self.form
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FORMAT_MESSAGE, UPSTREAM_MESSAGE};
    use crate::test_support::sample_response;

    fn images_for(response: &AnalysisResponse) -> HashMap<String, ImageResult> {
        response
            .suggestions
            .iter()
            .map(|s| (s.title.clone(), ImageResult::degraded(&s.title)))
            .collect()
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut state = InteractionState::default();
        assert_eq!(state.phase().kind(), PhaseKind::Idle);

        let (cycle, _) = state.begin("commute 10 miles by gas car", None, PersonaId::Scientist).unwrap();
        assert_eq!(state.phase().kind(), PhaseKind::Submitting);
        assert_eq!(
            state.snapshot().progress_message.as_deref(),
            Some("Consulting the scientist advisor...")
        );

        let response = sample_response(3);
        assert_eq!(state.apply(cycle, Transition::AnalysisSucceeded(response.clone())), Commit::Applied);
        assert_eq!(state.phase().kind(), PhaseKind::AnalysisReady);
        let snapshot = state.snapshot();
        assert!(snapshot.images_pending);
        assert_eq!(snapshot.progress_message.as_deref(), Some(IMAGES_PROGRESS_MESSAGE));
        assert_eq!(snapshot.analysis_result.as_ref(), Some(&response));

        assert_eq!(state.apply(cycle, Transition::ImagesSettled(images_for(&response))), Commit::Applied);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.phase, PhaseKind::AnalysisComplete);
        assert_eq!(snapshot.image_results_by_title.len(), 3);
        assert!(snapshot.progress_message.is_none());
        assert!(!snapshot.is_submitting);
    }

    #[test]
    fn test_empty_suggestions_complete_immediately() {
        let mut state = InteractionState::default();
        let (cycle, _) = state.begin("walk", None, PersonaId::Nature).unwrap();
        let commit = state.apply(cycle, Transition::AnalysisSucceeded(sample_response(0)));
        assert_eq!(commit, Commit::Applied);
        assert_eq!(state.phase().kind(), PhaseKind::AnalysisComplete);
    }

    #[test]
    fn test_blank_submit_changes_nothing() {
        let mut state = InteractionState::new(PersonaId::Elder, "Alex");
        state.set_activity_text("draft text");
        let before = state.snapshot();

        assert!(state.begin("", None, PersonaId::Scientist).is_none());
        assert!(state.begin(" \t\n", Some("Sam"), PersonaId::Ai).is_none());
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn test_submit_ignored_while_submitting() {
        let mut state = InteractionState::default();
        let (first, _) = state.begin("drive", None, PersonaId::Scientist).unwrap();
        assert!(state.begin("fly", None, PersonaId::Scientist).is_none());
        assert_eq!(state.current_cycle(), Some(first));
        assert_eq!(state.form().activity_text, "drive");
    }

    #[test]
    fn test_failure_messages() {
        let mut state = InteractionState::default();
        let (cycle, _) = state.begin("drive", None, PersonaId::Scientist).unwrap();
        state.apply(cycle, Transition::AnalysisFailed(EcoError::MalformedJson("eof".into())));
        let snapshot = state.snapshot();
        assert_eq!(snapshot.phase, PhaseKind::Failed);
        assert_eq!(snapshot.error_message.as_deref(), Some(FORMAT_MESSAGE));
        assert!(snapshot.analysis_result.is_none());

        let (cycle, _) = state.begin("drive", None, PersonaId::Scientist).unwrap();
        assert!(state.snapshot().error_message.is_none());
        state.apply(cycle, Transition::AnalysisFailed(EcoError::transient("reset")));
        assert_eq!(state.snapshot().error_message.as_deref(), Some(UPSTREAM_MESSAGE));
    }

    #[test]
    fn test_stale_results_are_dropped() {
        let mut state = InteractionState::default();
        let (old, _) = state.begin("drive", None, PersonaId::Scientist).unwrap();
        let old_response = sample_response(2);
        state.apply(old, Transition::AnalysisSucceeded(old_response.clone()));

        // New submission while images for the old cycle are pending.
        let (new, _) = state.begin("cycle to work", None, PersonaId::Scientist).unwrap();
        assert_ne!(old, new);
        assert_eq!(
            state.apply(old, Transition::ImagesSettled(images_for(&old_response))),
            Commit::Stale
        );
        let snapshot = state.snapshot();
        assert_eq!(snapshot.phase, PhaseKind::Submitting);
        assert!(snapshot.analysis_result.is_none());
        assert!(snapshot.image_results_by_title.is_empty());
    }

    #[test]
    fn test_out_of_order_transition_rejected() {
        let mut state = InteractionState::default();
        let (cycle, _) = state.begin("drive", None, PersonaId::Scientist).unwrap();
        assert_eq!(state.apply(cycle, Transition::ImagesSettled(HashMap::new())), Commit::Rejected);
        assert_eq!(state.phase().kind(), PhaseKind::Submitting);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let mut state = InteractionState::default();
        state.begin("drive", Some("Alex"), PersonaId::Financial).unwrap();
        let value = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(value["phase"], "Submitting");
        assert_eq!(value["displayName"], "Alex");
        assert_eq!(value["persona"], "financial");
        assert_eq!(value["isSubmitting"], true);
        assert!(value["imageResultsByTitle"].as_object().unwrap().is_empty());
    }
}
