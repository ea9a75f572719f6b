//! # Background Control Loops
//!
//! Owns the three periodic loops (resource monitoring, priority rebalancing
//! with admission, load balancing). Each loop runs its cycle to completion
//! before sleeping again; a failed cycle is logged and the loop carries on.
//! Stopping cancels one token that every loop listens on.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::engine::EngineShared;
use crate::error::{OrchestrationError, OrchestrationResult};

/// Handle over the running control loops
#[derive(Debug)]
pub struct LoopCoordinator {
    /// Unique identifier for this coordinator instance
    id: Uuid,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl LoopCoordinator {
    /// Spawn all three loops on the current runtime
    pub(crate) fn start(shared: Arc<EngineShared>) -> Self {
        let id = Uuid::new_v4();
        let shutdown = CancellationToken::new();
        let scheduling = shared.config.scheduling.clone();

        info!(coordinator_id = %id, "🚀 COORDINATOR: Starting background control loops");

        let handles = vec![
            spawn_loop(
                "resource_monitor",
                scheduling.monitor_interval(),
                shutdown.child_token(),
                Arc::clone(&shared),
                |shared| async move { shared.run_monitoring_cycle().await.map(|_| ()) },
            ),
            spawn_loop(
                "priority_rebalancer",
                scheduling.rebalance_interval(),
                shutdown.child_token(),
                Arc::clone(&shared),
                |shared| async move {
                    shared.run_rebalancing_cycle();
                    Ok::<(), OrchestrationError>(())
                },
            ),
            spawn_loop(
                "load_balancer",
                scheduling.load_balance_interval(),
                shutdown.child_token(),
                shared,
                |shared| async move {
                    shared.run_load_balancing_cycle().await;
                    Ok::<(), OrchestrationError>(())
                },
            ),
        ];

        info!(coordinator_id = %id, "✅ COORDINATOR: Background control loops started");

        Self {
            id,
            shutdown,
            handles,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Cancel every loop and wait for them to exit
    #[instrument(skip(self), fields(coordinator_id = %self.id))]
    pub async fn stop(self) {
        info!("🛑 COORDINATOR: Stopping background control loops");
        self.shutdown.cancel();
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(error = %err, "COORDINATOR: Control loop ended abnormally");
            }
        }
        info!("✅ COORDINATOR: Background control loops stopped");
    }
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    interval: Duration,
    shutdown: CancellationToken,
    shared: Arc<EngineShared>,
    cycle: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<EngineShared>) -> Fut + Send + 'static,
    Fut: Future<Output = OrchestrationResult<()>> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = cycle(Arc::clone(&shared)).await {
                        error!(loop_name = name, error = %e, "COORDINATOR: Cycle failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!(loop_name = name, "COORDINATOR: Loop shutting down");
                    break;
                }
            }
        }
    })
}
