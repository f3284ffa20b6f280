//! # clipshop
//!
//! Asynchronous video transform jobs: trim, crop, resize, retime and per-frame
//! effects, with progress a caller can poll while the work runs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use clipshop::{
//!     config::Config,
//!     jobs::{JobService, TransformRequest},
//!     video::FfmpegBackend,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let backend = Arc::new(FfmpegBackend::new(config.encoder.clone()));
//! let service = JobService::new(config, backend)?;
//!
//! let staged = service.stage_file("holiday.mp4").await?;
//! let request = TransformRequest {
//!     action: "brighten".to_string(),
//!     end_time: 5.0,
//!     brightness_factor: 1.5,
//!     ..TransformRequest::default()
//! };
//! let id = service.submit(staged, &request).await?;
//!
//! let job = service.wait_for(id, Duration::from_millis(250)).await?;
//! println!("{} finished as {}", id, job.status);
//! let output = service.get_output_path(id)?;
//! # let _ = output;
//! service.release_job(id)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`video`] - Frame type, decode source, encode sink and media backends
//! - [`pipeline`] - Frame window, crop/resize geometry and batch dispatch
//! - [`effects`] - Effect registry with per-frame and whole-batch transforms
//! - [`jobs`] - Transform parameters, job registry, runner and service
//! - [`config`] - Configuration management
//!
//! ## Custom Effects
//!
//! Unknown action names pass frames through unchanged. Register a factory to
//! give a name meaning:
//!
//! ```rust,no_run
//! use clipshop::effects::{EffectRegistry, EffectStage, FrameEffect};
//! use clipshop::error::Result;
//! use clipshop::video::Frame;
//!
//! struct Posterize;
//!
//! impl FrameEffect for Posterize {
//!     fn name(&self) -> &str {
//!         "posterize"
//!     }
//!
//!     fn apply(&self, frame: &mut Frame) -> Result<()> {
//!         for channel in frame.as_image_mut().iter_mut() {
//!             *channel &= 0xC0;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = EffectRegistry::new();
//! registry.register("posterize", |_| Some(EffectStage::PerFrame(Box::new(Posterize))));
//! ```

pub mod config;
pub mod effects;
pub mod error;
pub mod jobs;
pub mod pipeline;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    effects::EffectRegistry,
    error::{EngineError, Result},
    jobs::{JobId, JobService, JobSnapshot, JobStatus, TransformParams, TransformRequest},
};
