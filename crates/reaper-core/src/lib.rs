//! `reaper-core` decides which container images a registry can drop
//! without touching anything a running workload still uses.
//!
//! ```text
//! ActiveSource(s) ──► ActiveImageSet ─┐
//!                                     ├─► planner::plan ──► DeletionPlan ──► Executor
//! InventorySnapshot ──► Repository[] ─┘
//! ```
//!
//! Planning is pure; collection and execution are the only parts doing I/O.

pub mod active;
pub mod config;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod model;
pub mod planner;
pub mod reference;

pub use active::{ActiveImageSet, ActiveSource, FileActiveSource};
pub use error::{ReaperError, Result};
pub use executor::{ExecutionReport, Executor, HttpRegistry, Registry};
pub use model::{Digest, ImageRecord, Repository};
pub use planner::{plan, DeletionPlan, RepositoryPlan, RetentionPolicy};
