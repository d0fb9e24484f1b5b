//! Evaluation phase of the modgraph engine.
//!
//! Provides the [`executor::ModuleExecutor`] seam through which module
//! bodies run, the [`scheduler::Scheduler`] that evaluates instances in
//! dependency order on a bounded worker pool, and the [`engine::Engine`]
//! facade tying expansion, resolution, and evaluation together.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod engine;
pub mod executor;
pub mod report;
pub mod scheduler;

pub use engine::Engine;
pub use scheduler::evaluate;
