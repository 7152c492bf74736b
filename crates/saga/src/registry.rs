//! Phase name to handler dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use domain::RampPhase;

use crate::handler::PhaseHandler;

/// Maps each phase to the one handler that owns it.
///
/// Built once at start-up and then shared read-only by the orchestrator.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<RampPhase, Arc<dyn PhaseHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under the phase it reports, replacing any previous one.
    pub fn register(&mut self, handler: impl PhaseHandler + 'static) -> &mut Self {
        self.register_arc(Arc::new(handler))
    }

    pub fn register_arc(&mut self, handler: Arc<dyn PhaseHandler>) -> &mut Self {
        let phase = handler.phase();
        if self.handlers.insert(phase, handler).is_some() {
            tracing::warn!(%phase, "Replacing previously registered phase handler");
        }
        self
    }

    /// Looks up the handler for `phase`. Terminal phases never resolve.
    pub fn resolve(&self, phase: RampPhase) -> Option<Arc<dyn PhaseHandler>> {
        if phase.is_terminal() {
            return None;
        }
        self.handlers.get(&phase).cloned()
    }

    pub fn contains(&self, phase: RampPhase) -> bool {
        self.resolve(phase).is_some()
    }

    /// Registered phases in declaration order.
    pub fn phases(&self) -> Vec<RampPhase> {
        let mut phases: Vec<_> = self.handlers.keys().copied().collect();
        phases.sort();
        phases
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("phases", &self.phases())
            .finish()
    }
}
