//! Coordination strategies, suspension, resume, cancellation and failure handling.

use std::sync::Arc;
use std::time::Duration;

use pipeline_conductor::error::OrchestrationError;
use pipeline_conductor::models::{
    CompletionCriteria, CoordinationType, ExecutorTier, OrchestrationId, OrchestrationOptions,
    StatusDetail, SuspensionKind,
};
use pipeline_conductor::orchestration::{OrchestrationEngine, WeightedOrdering};
use pipeline_conductor::state_machine::OrchestrationState;
use pipeline_conductor::store::InMemoryStore;
use pipeline_conductor::test_utils::{
    config_with_budget, executor_records, wait_until, ScriptedPipelineExecutor,
};

const WAIT: Duration = Duration::from_secs(2);

fn engine_with(executor: Arc<ScriptedPipelineExecutor>) -> OrchestrationEngine {
    let engine = OrchestrationEngine::new(
        config_with_budget(10, 8192, 400.0),
        Arc::new(InMemoryStore::new()),
        executor,
    )
    .expect("valid config");
    for record in executor_records("exec", 10, ExecutorTier::Specialist, &[]) {
        engine.register_executor(&record);
    }
    engine
}

async fn create(
    engine: &OrchestrationEngine,
    members: &[&str],
    coordination_type: CoordinationType,
    options: OrchestrationOptions,
) -> OrchestrationId {
    engine
        .create_pipeline_orchestration(
            "batch",
            "",
            members.iter().map(|m| m.to_string()).collect(),
            coordination_type,
            options,
        )
        .await
        .expect("orchestration created")
}

async fn wait_for_status(engine: &OrchestrationEngine, id: OrchestrationId, status: OrchestrationState) -> bool {
    wait_until(WAIT, || {
        engine
            .get_orchestration_status(id)
            .map(|ctx| ctx.status == status)
            .unwrap_or(false)
    })
    .await
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn test_sequential_runs_members_in_order_and_releases() {
    let executor = Arc::new(ScriptedPipelineExecutor::new());
    let engine = engine_with(executor.clone());
    let id = create(&engine, &["extract", "transform", "load"], CoordinationType::Sequential, Default::default()).await;

    engine.allocate_resources_for_orchestration(id).await.unwrap();
    assert!(wait_for_status(&engine, id, OrchestrationState::Completed).await);

    assert_eq!(executor.calls(), strings(&["extract", "transform", "load"]));
    let ctx = engine.get_orchestration_status(id).unwrap();
    assert_eq!(ctx.current_stage, 3);
    assert!(matches!(ctx.metadata.detail, StatusDetail::Completed { completed_members: 3, .. }));
    assert!(ctx.metadata.timestamps.finished_at.is_some());
    assert!(engine.get_allocation(id).is_none());
    assert!(ctx.allocations.iter().all(|a| a.released_at.is_some()));

    let metrics = engine.get_system_metrics();
    assert_eq!(metrics.held_capacity.executors, 0);
    assert!(metrics.executor_utilization.iter().all(|(_, u)| *u == 0.0));
}

#[tokio::test]
async fn test_parallel_runs_every_member() {
    let executor = Arc::new(ScriptedPipelineExecutor::new());
    let engine = engine_with(executor.clone());
    let id = create(&engine, &["a", "b", "c"], CoordinationType::Parallel, Default::default()).await;

    engine.allocate_resources_for_orchestration(id).await.unwrap();
    assert!(wait_for_status(&engine, id, OrchestrationState::Completed).await);

    let mut calls = executor.calls();
    calls.sort();
    assert_eq!(calls, strings(&["a", "b", "c"]));
    assert_eq!(engine.get_orchestration_status(id).unwrap().completed_members, 3);
}

#[tokio::test]
async fn test_conditional_subset_depends_on_priority() {
    let executor = Arc::new(ScriptedPipelineExecutor::new());
    let engine = engine_with(executor.clone());
    let id = create(&engine, &["a", "b", "c", "d"], CoordinationType::Conditional, Default::default()).await;

    engine.allocate_resources_for_orchestration(id).await.unwrap();
    assert!(wait_for_status(&engine, id, OrchestrationState::Completed).await);
    assert_eq!(executor.calls(), strings(&["a", "c"]));

    let executor = Arc::new(ScriptedPipelineExecutor::new());
    let engine = engine_with(executor.clone());
    let id = create(
        &engine,
        &["a", "b", "c", "d"],
        CoordinationType::Conditional,
        OrchestrationOptions { priority: Some(2), ..Default::default() },
    )
    .await;

    engine.allocate_resources_for_orchestration(id).await.unwrap();
    assert!(wait_for_status(&engine, id, OrchestrationState::Completed).await);
    assert_eq!(executor.calls(), strings(&["a", "b", "c", "d"]));
}

#[tokio::test]
async fn test_priority_weighted_uses_injected_ordering() {
    let executor = Arc::new(ScriptedPipelineExecutor::new());
    let engine = engine_with(executor.clone()).with_member_ordering(Arc::new(
        WeightedOrdering::default()
            .with_weight("review", 10)
            .with_weight("draft", 5),
    ));
    let id = create(&engine, &["intake", "draft", "review"], CoordinationType::PriorityWeighted, Default::default()).await;

    engine.allocate_resources_for_orchestration(id).await.unwrap();
    assert!(wait_for_status(&engine, id, OrchestrationState::Completed).await);
    assert_eq!(executor.calls(), strings(&["review", "draft", "intake"]));
}

#[tokio::test]
async fn test_failure_records_member_and_stops() {
    let executor = Arc::new(ScriptedPipelineExecutor::new().fail_pipeline("transform"));
    let engine = engine_with(executor.clone());
    let id = create(&engine, &["extract", "transform", "load"], CoordinationType::Sequential, Default::default()).await;

    engine.allocate_resources_for_orchestration(id).await.unwrap();
    assert!(wait_for_status(&engine, id, OrchestrationState::Failed).await);

    assert_eq!(executor.calls(), strings(&["extract", "transform"]));
    let ctx = engine.get_orchestration_status(id).unwrap();
    match ctx.metadata.detail {
        StatusDetail::Failed(info) => {
            assert_eq!(info.pipeline_id.as_deref(), Some("transform"));
            assert!(info.reason.contains("scripted failure"));
        }
        other => panic!("expected failure detail, got {other:?}"),
    }
    assert!(engine.get_allocation(id).is_none());
}

#[tokio::test]
async fn test_parallel_failure_fails_orchestration() {
    let executor = Arc::new(ScriptedPipelineExecutor::new().fail_pipeline("b"));
    let engine = engine_with(executor.clone());
    let id = create(&engine, &["a", "b"], CoordinationType::Parallel, Default::default()).await;

    engine.allocate_resources_for_orchestration(id).await.unwrap();
    assert!(wait_for_status(&engine, id, OrchestrationState::Failed).await);
    assert_eq!(executor.calls().len(), 2);
}

#[tokio::test]
async fn test_unmet_completion_criteria_fails() {
    let executor = Arc::new(ScriptedPipelineExecutor::new());
    let engine = engine_with(executor.clone());
    let id = create(
        &engine,
        &["a", "b", "c", "d"],
        CoordinationType::Conditional,
        OrchestrationOptions {
            completion_criteria: CompletionCriteria {
                min_completed_members: Some(4),
                description: Some("all members".into()),
            },
            ..Default::default()
        },
    )
    .await;

    engine.allocate_resources_for_orchestration(id).await.unwrap();
    assert!(wait_for_status(&engine, id, OrchestrationState::Failed).await);
    let ctx = engine.get_orchestration_status(id).unwrap();
    match ctx.metadata.detail {
        StatusDetail::Failed(info) => {
            assert!(info.pipeline_id.is_none());
            assert!(info.reason.contains("2 of 4"));
        }
        other => panic!("expected failure detail, got {other:?}"),
    }
}

#[tokio::test]
async fn test_suspend_releases_and_resume_continues() {
    let executor = Arc::new(ScriptedPipelineExecutor::gated());
    let engine = engine_with(executor.clone());
    let id = create(&engine, &["p1", "p2", "p3"], CoordinationType::Sequential, Default::default()).await;

    let allocation = engine.allocate_resources_for_orchestration(id).await.unwrap();
    assert!(wait_until(WAIT, || executor.calls().len() == 1).await);

    engine
        .suspend_orchestration(id, "operator", Some("maintenance".into()))
        .await
        .unwrap();

    let ctx = engine.get_orchestration_status(id).unwrap();
    assert_eq!(ctx.status, OrchestrationState::Suspended);
    match &ctx.metadata.detail {
        StatusDetail::Suspended(info) => {
            assert_eq!(info.kind, SuspensionKind::Requested);
            assert_eq!(info.suspended_by, "operator");
            assert_eq!(info.reason.as_deref(), Some("maintenance"));
        }
        other => panic!("expected suspension detail, got {other:?}"),
    }
    assert!(engine.get_allocation(id).is_none());
    assert_eq!(engine.queued_priority(id), None);
    for executor_id in &allocation.executor_ids {
        assert_eq!(engine.get_executor_workload(executor_id).unwrap().current_work_items, 0);
    }

    // the stale in-flight call must not advance the suspended orchestration
    executor.release(1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.get_orchestration_status(id).unwrap().current_stage, 0);

    engine.resume_orchestration(id, "operator").await.unwrap();
    assert!(matches!(
        engine.get_orchestration_status(id).unwrap().metadata.detail,
        StatusDetail::Resumed { .. }
    ));
    executor.release(10);
    assert!(wait_for_status(&engine, id, OrchestrationState::Completed).await);

    let ctx = engine.get_orchestration_status(id).unwrap();
    assert_eq!(ctx.allocations.len(), 2);
    assert!(ctx.allocations.iter().all(|a| a.released_at.is_some()));
    assert_eq!(executor.calls(), strings(&["p1", "p1", "p2", "p3"]));
}

#[tokio::test]
async fn test_suspend_requires_running() {
    let engine = engine_with(Arc::new(ScriptedPipelineExecutor::new()));
    let id = create(&engine, &["p1"], CoordinationType::Sequential, Default::default()).await;

    let err = engine.suspend_orchestration(id, "operator", None).await.unwrap_err();
    assert!(matches!(err, OrchestrationError::InvalidStateTransition { .. }));

    let err = engine.resume_orchestration(id, "operator").await.unwrap_err();
    assert!(matches!(err, OrchestrationError::InvalidStateTransition { .. }));

    let missing = OrchestrationId::new_v4();
    let err = engine.suspend_orchestration(missing, "operator", None).await.unwrap_err();
    assert!(matches!(err, OrchestrationError::OrchestrationNotFound { .. }));
}

#[tokio::test]
async fn test_denied_resume_is_queued() {
    let executor = Arc::new(ScriptedPipelineExecutor::gated());
    let engine = engine_with(executor.clone());
    let id = create(&engine, &["p1"], CoordinationType::Sequential, Default::default()).await;

    engine.allocate_resources_for_orchestration(id).await.unwrap();
    engine.suspend_orchestration(id, "operator", None).await.unwrap();

    for record in executor_records("exec", 10, ExecutorTier::Specialist, &[]) {
        engine.unregister_executor(&record.executor_id).unwrap();
    }
    let err = engine.resume_orchestration(id, "operator").await.unwrap_err();
    assert!(err.is_admission_denied());
    assert_eq!(engine.get_orchestration_status(id).unwrap().status, OrchestrationState::Suspended);
    assert!(engine.queued_priority(id).is_some());
    executor.release(10);
}

#[tokio::test]
async fn test_allocate_does_not_revive_operator_suspensions() {
    let executor = Arc::new(ScriptedPipelineExecutor::gated());
    let engine = engine_with(executor.clone());

    let suspended = create(&engine, &["p1"], CoordinationType::Sequential, Default::default()).await;
    engine.allocate_resources_for_orchestration(suspended).await.unwrap();
    engine.suspend_orchestration(suspended, "operator", None).await.unwrap();

    let cancelled = create(&engine, &["p1"], CoordinationType::Sequential, Default::default()).await;
    engine.cancel_orchestration(cancelled, "operator").await.unwrap();

    for id in [suspended, cancelled] {
        let err = engine.allocate_resources_for_orchestration(id).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidStateTransition { .. }));
        assert_eq!(engine.get_orchestration_status(id).unwrap().status, OrchestrationState::Suspended);
        assert_eq!(engine.queued_priority(id), None);
        assert!(engine.get_allocation(id).is_none());
    }

    engine.run_rebalancing_cycle();
    assert_eq!(
        engine.get_orchestration_status(cancelled).unwrap().status,
        OrchestrationState::Suspended
    );
    executor.release(10);
}

#[tokio::test]
async fn test_denied_resume_is_admitted_once_capacity_returns() {
    let executor = Arc::new(ScriptedPipelineExecutor::gated());
    let engine = engine_with(executor.clone());
    let id = create(&engine, &["p1"], CoordinationType::Sequential, Default::default()).await;

    engine.allocate_resources_for_orchestration(id).await.unwrap();
    engine.suspend_orchestration(id, "operator", None).await.unwrap();
    let records = executor_records("exec", 10, ExecutorTier::Specialist, &[]);
    for record in &records {
        engine.unregister_executor(&record.executor_id).unwrap();
    }
    assert!(engine.resume_orchestration(id, "operator").await.unwrap_err().is_admission_denied());

    for record in &records {
        engine.register_executor(record);
    }
    engine.allocate_resources_for_orchestration(id).await.unwrap();
    let ctx = engine.get_orchestration_status(id).unwrap();
    assert_eq!(ctx.status, OrchestrationState::Running);
    assert!(matches!(ctx.metadata.detail, StatusDetail::Resumed { .. }));
    assert_eq!(engine.queued_priority(id), None);
    executor.release(10);
}

#[tokio::test]
async fn test_cancel_pending_and_running() {
    let executor = Arc::new(ScriptedPipelineExecutor::gated());
    let engine = engine_with(executor.clone());

    let pending = create(&engine, &["p1"], CoordinationType::Sequential, Default::default()).await;
    engine.cancel_orchestration(pending, "operator").await.unwrap();
    let ctx = engine.get_orchestration_status(pending).unwrap();
    assert_eq!(ctx.status, OrchestrationState::Suspended);
    assert!(matches!(
        ctx.metadata.detail,
        StatusDetail::Suspended(ref info) if info.kind == SuspensionKind::Cancelled
    ));
    assert_eq!(engine.queued_priority(pending), None);

    let running = create(&engine, &["p1", "p2"], CoordinationType::Sequential, Default::default()).await;
    engine.allocate_resources_for_orchestration(running).await.unwrap();
    engine.cancel_orchestration(running, "operator").await.unwrap();
    assert!(engine.get_allocation(running).is_none());

    executor.release(10);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        engine.get_orchestration_status(running).unwrap().status,
        OrchestrationState::Suspended
    );
}

#[tokio::test]
async fn test_terminal_orchestrations_reject_events() {
    let engine = engine_with(Arc::new(ScriptedPipelineExecutor::new()));
    let id = create(&engine, &["p1"], CoordinationType::Sequential, Default::default()).await;
    engine.allocate_resources_for_orchestration(id).await.unwrap();
    assert!(wait_for_status(&engine, id, OrchestrationState::Completed).await);

    assert!(engine.cancel_orchestration(id, "operator").await.is_err());
    assert!(engine.resume_orchestration(id, "operator").await.is_err());
    assert!(engine.allocate_resources_for_orchestration(id).await.is_err());
}
