//! # Coordination-Type Executors
//!
//! Drives an admitted orchestration's member pipelines with one of four
//! strategies. Each run carries the epoch it was admitted under; progress and
//! terminal transitions are applied only while that epoch is still current
//! and the orchestration is still running, so a suspended or re-admitted
//! orchestration is never touched by a stale run.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::engine::EngineShared;
use crate::constants::{events, scoring};
use crate::logging::log_orchestration_operation;
use crate::models::{CoordinationType, FailureInfo, OrchestrationId, Priority, StatusDetail};
use crate::state_machine::{OrchestrationEvent, OrchestrationState, OrchestrationStateMachine};

/// Snapshot of what one run has to do
#[derive(Debug, Clone)]
pub(crate) struct ExecutionPlan {
    pub orchestration_id: OrchestrationId,
    pub epoch: u64,
    pub coordination_type: CoordinationType,
    pub members: Vec<String>,
    /// Members already processed by earlier runs
    pub start_stage: usize,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq)]
enum RunOutcome {
    Finished,
    Failed { pipeline_id: String, reason: String },
    /// Suspended, cancelled, re-admitted or removed while running
    Interrupted,
}

/// Start a run on the runtime
pub(crate) fn spawn_execution(
    shared: Arc<EngineShared>,
    orchestration_id: OrchestrationId,
    epoch: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move { run_orchestration(&shared, orchestration_id, epoch).await })
}

async fn run_orchestration(shared: &EngineShared, orchestration_id: OrchestrationId, epoch: u64) {
    let Some(plan) = shared.execution_plan(orchestration_id, epoch) else {
        debug!(orchestration_id = %orchestration_id, epoch, "COORDINATION: Run superseded before start");
        return;
    };

    info!(
        orchestration_id = %orchestration_id,
        coordination_type = %plan.coordination_type,
        members = plan.members.len(),
        start_stage = plan.start_stage,
        "▶️ COORDINATION: Starting run"
    );

    let outcome = match plan.coordination_type {
        CoordinationType::Sequential => run_in_order(shared, &plan, &plan.members, |_| true).await,
        CoordinationType::Conditional => {
            let run_all = plan.priority.get() <= scoring::PRIORITY_BONUS_CUTOFF;
            run_in_order(shared, &plan, &plan.members, move |index| {
                run_all || index % 2 == 0
            })
            .await
        }
        CoordinationType::PriorityWeighted => {
            let ordered = shared.member_ordering().order(&plan.members);
            run_in_order(shared, &plan, &ordered, |_| true).await
        }
        CoordinationType::Parallel => run_parallel(shared, &plan).await,
    };

    match outcome {
        RunOutcome::Finished => shared.complete_run(orchestration_id, epoch),
        RunOutcome::Failed {
            pipeline_id,
            reason,
        } => shared.fail_run(orchestration_id, epoch, Some(pipeline_id), reason),
        RunOutcome::Interrupted => {
            debug!(orchestration_id = %orchestration_id, epoch, "COORDINATION: Run interrupted");
        }
    }
}

/// One member at a time, resuming at the plan's start stage. Members for
/// which `should_run` is false are logged and skipped, not retried.
async fn run_in_order<F>(
    shared: &EngineShared,
    plan: &ExecutionPlan,
    members: &[String],
    should_run: F,
) -> RunOutcome
where
    F: Fn(usize) -> bool,
{
    let id = plan.orchestration_id;

    for (index, member) in members.iter().enumerate().skip(plan.start_stage) {
        if !shared.is_current_run(id, plan.epoch) {
            return RunOutcome::Interrupted;
        }

        if !should_run(index) {
            info!(orchestration_id = %id, pipeline_id = %member, stage = index, "⏭️ COORDINATION: Skipping member");
            if !shared.advance_stage(id, plan.epoch, false) {
                return RunOutcome::Interrupted;
            }
            continue;
        }

        let started = Instant::now();
        match shared.pipeline_executor.execute_pipeline(member).await {
            Ok(()) => {
                debug!(
                    orchestration_id = %id,
                    pipeline_id = %member,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "COORDINATION: Member completed"
                );
                if !shared.advance_stage(id, plan.epoch, true) {
                    return RunOutcome::Interrupted;
                }
            }
            Err(err) => {
                return RunOutcome::Failed {
                    pipeline_id: member.clone(),
                    reason: err.reason(),
                }
            }
        }
    }

    RunOutcome::Finished
}

/// All members at once; any failure fails the whole orchestration
async fn run_parallel(shared: &EngineShared, plan: &ExecutionPlan) -> RunOutcome {
    let id = plan.orchestration_id;
    let epoch = plan.epoch;

    let runs = plan.members.iter().map(|member| async move {
        let started = Instant::now();
        let result = shared.pipeline_executor.execute_pipeline(member).await;
        if result.is_ok() {
            debug!(
                orchestration_id = %id,
                pipeline_id = %member,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "COORDINATION: Parallel member completed"
            );
            shared.advance_stage(id, epoch, true);
        }
        (member, result)
    });
    let results = join_all(runs).await;

    if !shared.is_current_run(id, epoch) {
        return RunOutcome::Interrupted;
    }

    match results
        .into_iter()
        .find_map(|(member, result)| result.err().map(|err| (member, err)))
    {
        Some((member, err)) => RunOutcome::Failed {
            pipeline_id: member.clone(),
            reason: err.reason(),
        },
        None => RunOutcome::Finished,
    }
}

impl EngineShared {
    /// Snapshot the run inputs if `epoch` is still the current running epoch
    pub(crate) fn execution_plan(&self, id: OrchestrationId, epoch: u64) -> Option<ExecutionPlan> {
        let registry = self.registry.read();
        let ctx = registry.get(id)?;
        if ctx.status != OrchestrationState::Running || ctx.run_epoch != epoch {
            return None;
        }
        Some(ExecutionPlan {
            orchestration_id: id,
            epoch,
            coordination_type: ctx.coordination_type,
            members: ctx.member_pipelines.clone(),
            start_stage: ctx.current_stage.min(ctx.total_stages),
            priority: ctx.priority(),
        })
    }

    pub(crate) fn is_current_run(&self, id: OrchestrationId, epoch: u64) -> bool {
        self.registry
            .read()
            .get(id)
            .map(|ctx| ctx.status == OrchestrationState::Running && ctx.run_epoch == epoch)
            .unwrap_or(false)
    }

    /// Advance the stage counter for a processed member; false when the run is stale
    pub(crate) fn advance_stage(&self, id: OrchestrationId, epoch: u64, member_completed: bool) -> bool {
        let mut registry = self.registry.write();
        let Some(ctx) = registry.get_mut(id) else {
            return false;
        };
        if ctx.status != OrchestrationState::Running || ctx.run_epoch != epoch {
            return false;
        }
        ctx.current_stage = (ctx.current_stage + 1).min(ctx.total_stages);
        if member_completed {
            ctx.completed_members += 1;
        }
        true
    }

    /// Finish a run, applying completion criteria
    pub(crate) fn complete_run(&self, id: OrchestrationId, epoch: u64) {
        let shortfall = {
            let registry = self.registry.read();
            registry.get(id).and_then(|ctx| {
                let required = ctx.completion_criteria.min_completed_members?;
                (ctx.completed_members < required).then(|| {
                    format!(
                        "completion criteria not met: {} of {} required members completed",
                        ctx.completed_members, required
                    )
                })
            })
        };
        if let Some(reason) = shortfall {
            self.fail_run(id, epoch, None, reason);
            return;
        }
        self.finish_run(id, epoch, OrchestrationEvent::Complete, None);
    }

    /// Fail a run with the failing member and reason recorded in metadata
    pub(crate) fn fail_run(
        &self,
        id: OrchestrationId,
        epoch: u64,
        pipeline_id: Option<String>,
        reason: String,
    ) {
        self.finish_run(id, epoch, OrchestrationEvent::Fail(reason), pipeline_id);
    }

    fn finish_run(
        &self,
        id: OrchestrationId,
        epoch: u64,
        event: OrchestrationEvent,
        pipeline_id: Option<String>,
    ) {
        let now = Utc::now();
        let mut registry = self.registry.write();
        let Some(ctx) = registry.get_mut(id) else {
            return;
        };
        if ctx.run_epoch != epoch {
            debug!(orchestration_id = %id, epoch, "COORDINATION: Ignoring stale run result");
            return;
        }

        let target = match OrchestrationStateMachine::determine_target_state(ctx.status, &event) {
            Ok(target) => target,
            Err(err) => {
                debug!(orchestration_id = %id, error = %err, "COORDINATION: Run result no longer applicable");
                return;
            }
        };
        ctx.status = target;
        ctx.metadata.timestamps.finished_at = Some(now);

        let (operation, details) = match &event {
            OrchestrationEvent::Fail(reason) => {
                ctx.metadata.detail = StatusDetail::Failed(FailureInfo {
                    pipeline_id: pipeline_id.clone(),
                    reason: reason.clone(),
                    failed_at: now,
                });
                warn!(
                    orchestration_id = %id,
                    pipeline_id = pipeline_id.as_deref().unwrap_or("-"),
                    reason = %reason,
                    "❌ COORDINATION: Orchestration failed"
                );
                (events::ORCHESTRATION_FAILED, Some(reason.clone()))
            }
            _ => {
                ctx.metadata.detail = StatusDetail::Completed {
                    completed_members: ctx.completed_members,
                    completed_at: now,
                };
                info!(
                    orchestration_id = %id,
                    completed_members = ctx.completed_members,
                    "✅ COORDINATION: Orchestration completed"
                );
                (events::ORCHESTRATION_COMPLETED, None)
            }
        };

        {
            let mut ledger = self.ledger.lock();
            let mut workloads = self.workloads.write();
            Self::release_allocation(ctx, &mut ledger, &mut workloads, now);
        }
        self.queue.lock().remove(id);

        log_orchestration_operation(
            operation,
            Some(id.to_string().as_str()),
            Some(ctx.name.as_str()),
            &target.to_string(),
            details.as_deref(),
        );
    }
}
