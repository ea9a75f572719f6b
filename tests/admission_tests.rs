//! Admission, capacity accounting and priority queue behaviour through the public engine API.

use chrono::{Duration, Utc};
use std::sync::Arc;

use pipeline_conductor::config::{EngineConfig, ResourceConstraints};
use pipeline_conductor::error::{DenialReason, OrchestrationError};
use pipeline_conductor::models::{
    CoordinationType, ExecutorTier, OrchestrationId, OrchestrationOptions, Priority,
    ResourceOverrides,
};
use pipeline_conductor::orchestration::OrchestrationEngine;
use pipeline_conductor::state_machine::OrchestrationState;
use pipeline_conductor::store::InMemoryStore;
use pipeline_conductor::test_utils::{config_with_budget, executor_records, ScriptedPipelineExecutor};

fn engine_with(config: EngineConfig) -> (OrchestrationEngine, Arc<ScriptedPipelineExecutor>) {
    let executor = Arc::new(ScriptedPipelineExecutor::gated());
    let engine = OrchestrationEngine::new(config, Arc::new(InMemoryStore::new()), executor.clone())
        .expect("valid config");
    (engine, executor)
}

async fn create(
    engine: &OrchestrationEngine,
    name: &str,
    members: &[&str],
    coordination_type: CoordinationType,
    options: OrchestrationOptions,
) -> OrchestrationId {
    engine
        .create_pipeline_orchestration(
            name,
            "",
            members.iter().map(|m| m.to_string()).collect(),
            coordination_type,
            options,
        )
        .await
        .expect("orchestration created")
}

#[tokio::test]
async fn test_reserved_capacity_denies_and_keeps_queue_position() {
    let config = EngineConfig {
        resources: ResourceConstraints {
            max_concurrent_executors: 4,
            reserved_capacity: 0.5,
            max_work_items_per_executor: 1,
            ..Default::default()
        },
        ..Default::default()
    };
    let (engine, _executor) = engine_with(config);
    for record in executor_records("exec", 2, ExecutorTier::Coordinator, &[]) {
        engine.register_executor(&record);
    }
    assert_eq!(engine.get_system_metrics().available_capacity.executors, 1);

    let first = create(&engine, "first", &["p1"], CoordinationType::Sequential, Default::default()).await;
    let _second = create(&engine, "second", &["p1"], CoordinationType::Sequential, Default::default()).await;

    let err = engine
        .allocate_resources_for_orchestration(first)
        .await
        .unwrap_err();
    match err {
        OrchestrationError::AdmissionDenied {
            reason, required, available,
        } => {
            assert_eq!(reason, DenialReason::InsufficientCapacity);
            assert_eq!(required.executors, 2);
            assert_eq!(available.executors, 1);
        }
        other => panic!("expected admission denial, got {other:?}"),
    }

    assert_eq!(engine.queued_priority(first), Priority::new(3));
    assert_eq!(
        engine.get_orchestration_status(first).unwrap().status,
        OrchestrationState::Pending
    );
    assert!(engine.get_allocation(first).is_none());
}

#[tokio::test]
async fn test_held_capacity_never_exceeds_ceiling() {
    let (engine, executor) = engine_with(config_with_budget(4, 4096, 200.0));
    for record in executor_records("exec", 6, ExecutorTier::Specialist, &[]) {
        engine.register_executor(&record);
    }

    let mut admitted = 0;
    let mut denied = 0;
    for n in 0..5 {
        let id = create(&engine, &format!("batch-{n}"), &["p1"], CoordinationType::Sequential, Default::default()).await;
        match engine.allocate_resources_for_orchestration(id).await {
            Ok(allocation) => {
                admitted += 1;
                assert_eq!(allocation.executor_ids.len(), 2);
                assert_eq!(allocation.work_items_per_executor, 4);
            }
            Err(err) => {
                assert!(err.is_admission_denied(), "unexpected error {err:?}");
                denied += 1;
            }
        }

        let metrics = engine.get_system_metrics();
        assert!(metrics.held_capacity.executors <= 4);
        assert!(metrics.held_capacity.executors <= metrics.capacity_ceiling.executors);
        assert!(metrics.held_capacity.memory_mb <= 4096);
        assert!(metrics.held_capacity.cpu_percent <= 200.0);
    }

    assert_eq!(admitted, 2);
    assert_eq!(denied, 3);
    assert_eq!(engine.get_system_metrics().active_allocations, 2);
    executor.release(100);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_grant_that_saturates_executors_stays_within_ceiling() {
    let (engine, executor) = engine_with(config_with_budget(10, 4096, 200.0));
    for record in executor_records("coord", 3, ExecutorTier::Coordinator, &[]) {
        engine.register_executor(&record);
    }
    assert_eq!(engine.get_system_metrics().available_capacity.executors, 3);

    let id = create(&engine, "small", &["p1"], CoordinationType::Sequential, Default::default()).await;
    let allocation = engine.allocate_resources_for_orchestration(id).await.unwrap();
    assert_eq!(allocation.executor_ids.len(), 2);

    // 4 work items on a 3-slot coordinator leaves both granted executors unhealthy
    let metrics = engine.get_system_metrics();
    assert_eq!(metrics.health_counts.unhealthy, 2);
    assert_eq!(metrics.held_capacity.executors, 2);
    assert!(metrics.held_capacity.executors <= metrics.capacity_ceiling.executors);
    assert_eq!(metrics.available_capacity.executors, 1);

    executor.release(10);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_concurrency_limit_denial() {
    let mut config = config_with_budget(10, 8192, 400.0);
    config.resources.max_concurrent_pipelines = 1;
    let (engine, _executor) = engine_with(config);
    for record in executor_records("exec", 4, ExecutorTier::Specialist, &[]) {
        engine.register_executor(&record);
    }

    let first = create(&engine, "first", &["p1"], CoordinationType::Sequential, Default::default()).await;
    let second = create(&engine, "second", &["p1"], CoordinationType::Sequential, Default::default()).await;

    engine.allocate_resources_for_orchestration(first).await.unwrap();
    let err = engine
        .allocate_resources_for_orchestration(second)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::AdmissionDenied { reason: DenialReason::ConcurrencyLimit, .. }
    ));
}

#[tokio::test]
async fn test_missing_capability_denial() {
    let (engine, _executor) = engine_with(config_with_budget(10, 8192, 400.0));
    for record in executor_records("exec", 3, ExecutorTier::Manager, &["sql"]) {
        engine.register_executor(&record);
    }

    let id = create(
        &engine,
        "gpu-job",
        &["train"],
        CoordinationType::Sequential,
        OrchestrationOptions {
            required_capabilities: vec!["gpu".into()],
            ..Default::default()
        },
    )
    .await;

    let err = engine.allocate_resources_for_orchestration(id).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::AdmissionDenied { reason: DenialReason::MissingCapability(ref tag), .. } if tag == "gpu"
    ));
}

#[tokio::test]
async fn test_capability_holder_is_selected() {
    let (engine, _executor) = engine_with(config_with_budget(10, 8192, 400.0));
    for record in executor_records("plain", 3, ExecutorTier::Specialist, &[]) {
        engine.register_executor(&record);
    }
    for record in executor_records("gpu", 1, ExecutorTier::Coordinator, &["gpu"]) {
        engine.register_executor(&record);
    }

    let id = create(
        &engine,
        "gpu-job",
        &["train"],
        CoordinationType::Sequential,
        OrchestrationOptions {
            required_capabilities: vec!["gpu".into()],
            ..Default::default()
        },
    )
    .await;

    let allocation = engine.allocate_resources_for_orchestration(id).await.unwrap();
    assert!(allocation.executor_ids.contains(&"gpu-1".to_string()));
    assert_eq!(allocation.executor_ids.len(), 2);
}

#[tokio::test]
async fn test_resource_overrides_replace_computed_requirement() {
    let (engine, _executor) = engine_with(config_with_budget(10, 1000, 400.0));
    for record in executor_records("exec", 4, ExecutorTier::Specialist, &[]) {
        engine.register_executor(&record);
    }

    let id = create(
        &engine,
        "big",
        &["p1"],
        CoordinationType::Sequential,
        OrchestrationOptions {
            resource_overrides: Some(ResourceOverrides {
                memory_mb: Some(2048),
                ..Default::default()
            }),
            ..Default::default()
        },
    )
    .await;

    let err = engine.allocate_resources_for_orchestration(id).await.unwrap_err();
    match err {
        OrchestrationError::AdmissionDenied { required, .. } => {
            assert_eq!(required.memory_mb, 2048);
            assert_eq!(required.executors, 2);
        }
        other => panic!("expected admission denial, got {other:?}"),
    }
}

#[tokio::test]
async fn test_parallel_requirement_scales_with_members() {
    let (engine, _executor) = engine_with(config_with_budget(10, 8192, 400.0));
    for record in executor_records("exec", 10, ExecutorTier::Specialist, &[]) {
        engine.register_executor(&record);
    }

    let id = create(&engine, "fanout", &["a", "b", "c"], CoordinationType::Parallel, Default::default()).await;
    let allocation = engine.allocate_resources_for_orchestration(id).await.unwrap();
    assert_eq!(allocation.executor_ids.len(), 6);
    assert_eq!(allocation.memory_mb, 768);
    assert_eq!(allocation.work_items_per_executor, 12);
}

#[tokio::test]
async fn test_dependencies_gate_admission() {
    let (engine, executor) = engine_with(config_with_budget(10, 8192, 400.0));
    for record in executor_records("exec", 6, ExecutorTier::Specialist, &[]) {
        engine.register_executor(&record);
    }

    let upstream = create(&engine, "upstream", &["load"], CoordinationType::Sequential, Default::default()).await;
    let downstream = create(
        &engine,
        "downstream",
        &["report"],
        CoordinationType::Sequential,
        OrchestrationOptions {
            dependencies: vec![upstream],
            ..Default::default()
        },
    )
    .await;

    let err = engine
        .allocate_resources_for_orchestration(downstream)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::AdmissionDenied { reason: DenialReason::DependenciesPending, .. }
    ));

    engine.allocate_resources_for_orchestration(upstream).await.unwrap();
    executor.release(1);
    let done = pipeline_conductor::test_utils::wait_until(std::time::Duration::from_secs(2), || {
        engine.get_orchestration_status(upstream).map(|ctx| ctx.status) == Some(OrchestrationState::Completed)
    })
    .await;
    assert!(done, "upstream should complete");

    assert!(engine.allocate_resources_for_orchestration(downstream).await.is_ok());
}

#[tokio::test]
async fn test_deadline_promotes_to_first_bucket() {
    let (engine, _executor) = engine_with(EngineConfig::default());
    let id = create(
        &engine,
        "urgent",
        &["p1"],
        CoordinationType::Sequential,
        OrchestrationOptions {
            deadline: Some(Utc::now() + Duration::hours(3)),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(engine.queued_priority(id), Priority::new(3));

    let report = engine.run_rebalancing_cycle();
    assert_eq!(report.priority_changes.len(), 1);
    assert_eq!(report.priority_changes[0].to, Priority::HIGHEST);

    // no executors, so it stays queued in its new bucket
    assert_eq!(engine.queued_priority(id), Some(Priority::HIGHEST));
    let lengths = engine.get_system_metrics().queue_lengths;
    assert_eq!(lengths.get(&1), Some(&1));
    assert_eq!(lengths.get(&3), Some(&0));
}

#[tokio::test]
async fn test_admission_pass_prefers_urgent_buckets() {
    let (engine, _executor) = engine_with(config_with_budget(20, 8192, 400.0));
    for record in executor_records("exec", 20, ExecutorTier::Specialist, &[]) {
        engine.register_executor(&record);
    }

    let low = create(
        &engine,
        "low",
        &["p1"],
        CoordinationType::Sequential,
        OrchestrationOptions { priority: Some(4), ..Default::default() },
    )
    .await;
    let high = create(
        &engine,
        "high",
        &["p1"],
        CoordinationType::Sequential,
        OrchestrationOptions { priority: Some(2), ..Default::default() },
    )
    .await;

    let report = engine.run_rebalancing_cycle();
    assert_eq!(report.admitted, vec![high]);
    assert_eq!(engine.queued_priority(low), Priority::new(4));

    let report = engine.run_rebalancing_cycle();
    assert_eq!(report.admitted, vec![low]);
}

#[tokio::test]
async fn test_admission_pass_caps_per_bucket() {
    let (engine, _executor) = engine_with(config_with_budget(40, 16384, 800.0));
    for record in executor_records("exec", 40, ExecutorTier::Specialist, &[]) {
        engine.register_executor(&record);
    }
    for n in 0..5 {
        create(&engine, &format!("batch-{n}"), &["p1"], CoordinationType::Sequential, Default::default()).await;
    }

    let report = engine.run_rebalancing_cycle();
    assert_eq!(report.admitted.len(), 3);
    assert_eq!(engine.get_system_metrics().queue_lengths.get(&3), Some(&2));
}
