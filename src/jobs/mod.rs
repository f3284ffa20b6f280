//! # Job Lifecycle
//!
//! Typed transform parameters, the concurrent job registry, the per-job
//! runner state machine and the [`JobService`] facade collaborators call.
//!
//! A job moves Pending → Processing → Completed | Failed and never leaves a
//! terminal state.

pub mod params;
pub mod registry;
pub mod runner;
pub mod service;
pub mod types;

pub use params::{Action, TransformParams, TransformRequest};
pub use registry::JobRegistry;
pub use runner::JobRunner;
pub use service::{JobService, StagedInput};
pub use types::{JobId, JobRecord, JobSnapshot, JobStatus};
