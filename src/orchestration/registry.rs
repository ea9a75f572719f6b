//! # Orchestration Registry
//!
//! The set of live `PipelineCoordinationContext` records. The registry is the
//! first lock taken by any engine operation, so it also serves as the owner of
//! lifecycle state: status, stage counters and the allocation history.
//!
//! ## Key Features
//!
//! - **Dependency gating** against completed orchestrations
//! - **Pressure candidates** ordered lowest priority first, oldest first
//! - **Statistics** per lifecycle state

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{OrchestrationId, PipelineCoordinationContext, Priority};
use crate::state_machine::OrchestrationState;

/// Per-state counts across the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub suspended: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct OrchestrationRegistry {
    contexts: HashMap<OrchestrationId, PipelineCoordinationContext>,
}

impl OrchestrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, context: PipelineCoordinationContext) {
        self.contexts.insert(context.orchestration_id, context);
    }

    pub fn get(&self, id: OrchestrationId) -> Option<&PipelineCoordinationContext> {
        self.contexts.get(&id)
    }

    pub fn get_mut(&mut self, id: OrchestrationId) -> Option<&mut PipelineCoordinationContext> {
        self.contexts.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PipelineCoordinationContext> {
        self.contexts.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PipelineCoordinationContext> {
        self.contexts.values_mut()
    }

    /// All contexts, oldest first
    pub fn list(&self) -> Vec<PipelineCoordinationContext> {
        let mut contexts: Vec<_> = self.contexts.values().cloned().collect();
        contexts.sort_by_key(|ctx| ctx.metadata.timestamps.created_at);
        contexts
    }

    /// Ids of orchestrations that are not completed or failed
    pub fn non_terminal_ids(&self) -> Vec<OrchestrationId> {
        self.contexts
            .values()
            .filter(|ctx| !ctx.status.is_terminal())
            .map(|ctx| ctx.orchestration_id)
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.contexts
            .values()
            .filter(|ctx| ctx.status == OrchestrationState::Running)
            .count()
    }

    /// Every declared dependency exists and has completed
    pub fn dependencies_met(&self, context: &PipelineCoordinationContext) -> bool {
        context.dependencies.iter().all(|dependency| {
            self.contexts
                .get(dependency)
                .map(|dep| dep.status == OrchestrationState::Completed)
                .unwrap_or(false)
        })
    }

    /// Running orchestrations at or below `min_priority`, lowest priority first then oldest first
    pub fn pressure_candidates(&self, min_priority: u8, limit: usize) -> Vec<OrchestrationId> {
        let mut candidates: Vec<&PipelineCoordinationContext> = self
            .contexts
            .values()
            .filter(|ctx| ctx.status == OrchestrationState::Running)
            .filter(|ctx| ctx.priority().get() >= min_priority)
            .collect();

        candidates.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then(a.metadata.timestamps.created_at.cmp(&b.metadata.timestamps.created_at))
        });

        candidates
            .into_iter()
            .take(limit)
            .map(|ctx| ctx.orchestration_id)
            .collect()
    }

    /// Current priority of an orchestration
    pub fn priority_of(&self, id: OrchestrationId) -> Option<Priority> {
        self.contexts.get(&id).map(PipelineCoordinationContext::priority)
    }

    pub fn stats(&self) -> RegistryStats {
        self.contexts
            .values()
            .fold(RegistryStats::default(), |mut stats, ctx| {
                stats.total += 1;
                match ctx.status {
                    OrchestrationState::Pending => stats.pending += 1,
                    OrchestrationState::Running => stats.running += 1,
                    OrchestrationState::Suspended => stats.suspended += 1,
                    OrchestrationState::Completed => stats.completed += 1,
                    OrchestrationState::Failed => stats.failed += 1,
                }
                stats
            })
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn clear(&mut self) {
        self.contexts.clear();
    }
}
