//! # Test Utilities
//!
//! Fixtures and a scripted pipeline executor shared by unit and integration
//! tests. The environment helper checks for existing variables before falling
//! back to test defaults so the same tests work locally and in CI.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::env;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::config::{EngineConfig, ResourceConstraints};
use crate::models::{ExecutorRecord, ExecutorTier};
use crate::orchestration::{PipelineExecutionError, PipelineExecutor};

/// Set CONDUCTOR_ENV to `test` unless the caller already chose one
pub fn setup_test_environment() {
    if env::var("CONDUCTOR_ENV").is_err() {
        env::set_var("CONDUCTOR_ENV", "test");
    }
}

/// `count` executors named `{prefix}-{n}` sharing one tier and capability set
pub fn executor_records(
    prefix: &str,
    count: usize,
    tier: ExecutorTier,
    capabilities: &[&str],
) -> Vec<ExecutorRecord> {
    (1..=count)
        .map(|n| {
            ExecutorRecord::new(
                format!("{prefix}-{n}"),
                tier,
                capabilities.iter().map(|c| c.to_string()).collect(),
            )
        })
        .collect()
}

/// Engine configuration with the given global budget and no reserved capacity
pub fn config_with_budget(executors: usize, memory_mb: u64, cpu_percent: f64) -> EngineConfig {
    EngineConfig {
        resources: ResourceConstraints {
            max_concurrent_executors: executors,
            max_memory_mb: memory_mb,
            max_cpu_percent: cpu_percent,
            reserved_capacity: 0.0,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(timeout, poll).await.is_ok()
}

/// Await `future` with a timeout, returning None when it does not finish
pub async fn within<T>(timeout: Duration, future: impl Future<Output = T>) -> Option<T> {
    tokio::time::timeout(timeout, future).await.ok()
}

/// Pipeline executor with scripted failures, an optional gate and a call log
#[derive(Debug, Default)]
pub struct ScriptedPipelineExecutor {
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedPipelineExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call blocks until `release` hands out a permit
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn fail_pipeline(self, pipeline_id: impl Into<String>) -> Self {
        self.failing.lock().insert(pipeline_id.into());
        self
    }

    /// Let `count` blocked or future calls proceed
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Pipeline ids in the order their calls started
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PipelineExecutor for ScriptedPipelineExecutor {
    async fn execute_pipeline(&self, pipeline_id: &str) -> Result<(), PipelineExecutionError> {
        self.calls.lock().push(pipeline_id.to_string());

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| PipelineExecutionError::Unavailable(e.to_string()))?;
            permit.forget();
        }

        if self.failing.lock().contains(pipeline_id) {
            return Err(PipelineExecutionError::failed(pipeline_id, "scripted failure"));
        }
        Ok(())
    }

    fn executor_name(&self) -> &'static str {
        "scripted"
    }
}
