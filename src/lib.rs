#![allow(clippy::doc_markdown)] // Allow technical terms in docs without backticks
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Pipeline Conductor
//!
//! Orchestration and resource-allocation engine for multi-stage data pipelines
//! running on a shared pool of task executors.
//!
//! ## Overview
//!
//! Callers declare an orchestration: a named group of member pipelines with a
//! coordination type, a priority and optional deadline, business value,
//! capability requirements and dependencies. The engine decides when it may
//! run, which executors it runs on and how much of the global budget it
//! holds, then drives its members through the injected `PipelineExecutor`.
//!
//! Three background loops keep the pool balanced: a resource monitor that
//! resyncs executors and moves work off overloaded ones, a priority rebalancer
//! that ages and escalates queued work before admitting it, and a load
//! balancer that refreshes executor performance figures.
//!
//! ## Module Organization
//!
//! - [`orchestration`] - Engine facade, scheduler, strategies and control loops
//! - [`models`] - Executors, orchestrations, allocations and work items
//! - [`state_machine`] - Orchestration lifecycle transitions
//! - [`store`] - Persistence store seam and the in-memory implementation
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging setup and helpers
//! - [`error`] - Engine error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pipeline_conductor::config::ConfigManager;
//! use pipeline_conductor::orchestration::{NoopPipelineExecutor, OrchestrationEngine};
//! use pipeline_conductor::store::InMemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let engine = OrchestrationEngine::new(
//!     manager.config().clone(),
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(NoopPipelineExecutor),
//! )?;
//! engine.start().await?;
//! println!("{:?}", engine.get_system_metrics());
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod state_machine;
pub mod store;
pub mod test_utils;

pub use config::{ConfigManager, EngineConfig};
pub use error::{DenialReason, OrchestrationError, OrchestrationResult};
pub use models::{
    CoordinationType, ExecutorRecord, ExecutorTier, OrchestrationId, OrchestrationOptions,
    PipelineCoordinationContext, Priority, ResourceAllocation,
};
pub use orchestration::{OrchestrationEngine, PipelineExecutor, SystemMetrics};
pub use state_machine::OrchestrationState;
pub use store::{InMemoryStore, PersistenceStore};
