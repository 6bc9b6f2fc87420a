use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

/// Events that can be emitted by components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Interaction cycle events
    CycleStarted {
        cycle_id: String,
        persona: String,
    },
    Progress {
        cycle_id: String,
        message: String,
    },
    AnalysisReady {
        cycle_id: String,
        suggestions: usize,
    },
    ImageSettled {
        cycle_id: String,
        title: String,
        degraded: bool,
    },
    CycleCompleted {
        cycle_id: String,
    },
    CycleFailed {
        cycle_id: String,
        kind: String,
        message: String,
    },
    /// A late result arrived for a cycle that is no longer current.
    CycleSuperseded {
        cycle_id: String,
    },

    // API events
    APICallStarted {
        provider: String,
        model: String,
    },
    APICallCompleted {
        provider: String,
        model: String,
        bytes: usize,
    },
    APIRetry {
        provider: String,
        attempt: u32,
        error: String,
    },
    APIError {
        provider: String,
        error: String,
    },
}

/// Event bus for component communication
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    metrics: Arc<RwLock<Metrics>>,
}

/// Accumulated metrics from events
#[derive(Debug, Default, Clone)]
pub struct Metrics {
    pub total_api_calls: usize,
    pub api_retries: usize,
    pub api_errors: usize,
    pub images_generated: usize,
    pub images_degraded: usize,
    pub cycles_completed: usize,
    pub cycles_failed: usize,
    pub stale_results_dropped: usize,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            metrics: Arc::new(RwLock::new(Metrics::default())),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers
    pub async fn emit(&self, event: Event) -> Result<()> {
        self.update_metrics(&event).await;

        // No receivers is fine
        let _ = self.sender.send(event);
        Ok(())
    }

    /// Get current metrics
    pub async fn get_metrics(&self) -> Metrics {
        self.metrics.read().await.clone()
    }

    async fn update_metrics(&self, event: &Event) {
        let mut metrics = self.metrics.write().await;

        match event {
            Event::APICallCompleted { .. } => metrics.total_api_calls += 1,
            Event::APIRetry { .. } => metrics.api_retries += 1,
            Event::APIError { .. } => metrics.api_errors += 1,
            Event::ImageSettled { degraded, .. } => {
                if *degraded {
                    metrics.images_degraded += 1;
                } else {
                    metrics.images_generated += 1;
                }
            }
            Event::CycleCompleted { .. } => metrics.cycles_completed += 1,
            Event::CycleFailed { .. } => metrics.cycles_failed += 1,
            Event::CycleSuperseded { .. } => metrics.stale_results_dropped += 1,
            _ => {}
        }
    }
}

/// Trait for components that can emit events
#[async_trait::async_trait]
pub trait EventEmitter {
    fn set_event_bus(&mut self, bus: Arc<EventBus>);

    async fn emit_event(&self, event: Event) -> Result<()>;
}

/// Helper macro to implement EventEmitter trait
#[macro_export]
macro_rules! impl_event_emitter {
    ($type:ty) => {
        #[async_trait::async_trait]
        impl EventEmitter for $type {
            fn set_event_bus(&mut self, bus: Arc<EventBus>) {
                self.event_bus = Some(bus);
            }

            async fn emit_event(&self, event: Event) -> anyhow::Result<()> {
                if let Some(bus) = &self.event_bus {
                    bus.emit(event).await
                } else {
                    Ok(())
                }
            }
        }
    };
}
