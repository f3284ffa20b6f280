//! # Frame Pipeline
//!
//! The per-job data path between decoder and encoder:
//! window selection, crop/resize, then batched effect dispatch.
//! Reversed clips pass through a disk spool.

pub mod batch;
pub mod geometry;
pub mod spool;
pub mod window;

pub use batch::{BatchProcessor, BatchStats};
pub use geometry::{CropBox, GeometryPlan};
pub use spool::FrameSpool;
pub use window::{FrameWindow, WindowItem, WindowedFrames};
