//! # Video I/O Module
//!
//! Frame type, source metadata, and the decode/encode adapters the job runner
//! drives.

pub mod backend;
pub mod sink;
pub mod source;
pub mod synthetic;
pub mod types;

pub use backend::{FfmpegBackend, MediaBackend};
pub use sink::{EncodedVideo, FfmpegSink, OutputSink, SinkSpec};
pub use source::{FfmpegSource, VideoSource};
pub use synthetic::{SyntheticBackend, SyntheticClip};
pub use types::{Frame, OutputFormat, VideoMetadata};
